//! Calendar-date helpers evaluated in the user's configured timezone.
//!
//! Daily records are keyed by `YYYY-MM-DD` in the timezone from settings,
//! never in UTC or the host's local zone.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;

/// Format of daily record keys.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Timezones offered to users, with display names.
pub const SUPPORTED_TIMEZONES: &[(&str, &str)] = &[
    ("UTC", "UTC"),
    ("America/New_York", "New York (EST/EDT)"),
    ("America/Los_Angeles", "Los Angeles (PST/PDT)"),
    ("America/Chicago", "Chicago (CST/CDT)"),
    ("America/Denver", "Denver (MST/MDT)"),
    ("America/Phoenix", "Phoenix (MST)"),
    ("America/Anchorage", "Alaska (AKST/AKDT)"),
    ("Pacific/Honolulu", "Hawaii (HST)"),
    ("America/Toronto", "Toronto (EST/EDT)"),
    ("America/Vancouver", "Vancouver (PST/PDT)"),
    ("America/Winnipeg", "Winnipeg (CST/CDT)"),
    ("America/Edmonton", "Edmonton (MST/MDT)"),
    ("Europe/London", "London (GMT/BST)"),
    ("Europe/Paris", "Paris (CET/CEST)"),
    ("Europe/Berlin", "Berlin (CET/CEST)"),
    ("Europe/Amsterdam", "Amsterdam (CET/CEST)"),
    ("Europe/Madrid", "Madrid (CET/CEST)"),
    ("Europe/Rome", "Rome (CET/CEST)"),
    ("Europe/Stockholm", "Stockholm (CET/CEST)"),
    ("Europe/Zurich", "Zurich (CET/CEST)"),
    ("Europe/Moscow", "Moscow (MSK)"),
    ("Europe/Istanbul", "Istanbul (TRT)"),
    ("Asia/Dubai", "Dubai (GST)"),
    ("Asia/Kolkata", "India (IST)"),
    ("Asia/Shanghai", "Shanghai (CST)"),
    ("Asia/Tokyo", "Tokyo (JST)"),
    ("Asia/Seoul", "Seoul (KST)"),
    ("Asia/Singapore", "Singapore (SGT)"),
    ("Asia/Hong_Kong", "Hong Kong (HKT)"),
    ("Australia/Sydney", "Sydney (AEST/AEDT)"),
    ("Australia/Melbourne", "Melbourne (AEST/AEDT)"),
];

/// Parses an IANA timezone name.
pub fn parse(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}

/// Parses an IANA timezone name, falling back to UTC.
///
/// Settings are validated on update, so this only falls back for data
/// written by something else (an older client or a hand-edited file).
pub fn resolve(name: &str) -> Tz {
    parse(name).unwrap_or_else(|| {
        tracing::warn!("Unknown timezone '{}', bucketing in UTC", name);
        Tz::UTC
    })
}

/// Returns the display name for a timezone, or the name itself.
pub fn display_name(name: &str) -> &str {
    SUPPORTED_TIMEZONES
        .iter()
        .find(|(tz, _)| *tz == name)
        .map(|(_, label)| *label)
        .unwrap_or(name)
}

/// Calendar date of `at` in `tz`.
pub fn local_date(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Daily record key for `at` in `tz`.
pub fn date_key(at: DateTime<Utc>, tz: Tz) -> String {
    local_date(at, tz).format(DATE_KEY_FORMAT).to_string()
}

/// Key of the day before `now` in `tz`.
pub fn yesterday_key(now: DateTime<Utc>, tz: Tz) -> String {
    let today = local_date(now, tz);
    today
        .pred_opt()
        .unwrap_or(today)
        .format(DATE_KEY_FORMAT)
        .to_string()
}

/// Longest history [`history_range`] will build.
pub const MAX_HISTORY_DAYS: u32 = 3660;

/// Key of the day `days` before `now` in `tz`, or `None` past the
/// representable calendar.
pub fn days_ago_key(days: u64, now: DateTime<Utc>, tz: Tz) -> Option<String> {
    local_date(now, tz)
        .checked_sub_days(Days::new(days))
        .map(|date| date.format(DATE_KEY_FORMAT).to_string())
}

/// Keys for the `days` days preceding today, most recent first, capped at
/// [`MAX_HISTORY_DAYS`].
///
/// Today is excluded; callers show it separately.
pub fn history_range(days: u32, now: DateTime<Utc>, tz: Tz) -> Vec<String> {
    (1..=u64::from(days.min(MAX_HISTORY_DAYS)))
        .map_while(|n| days_ago_key(n, now, tz))
        .collect()
}

/// Grouping label for a timestamp: "Today", "Yesterday", "Jan 5" or "Jan 5, 2024".
pub fn date_label(at: DateTime<Utc>, now: DateTime<Utc>, tz: Tz) -> String {
    let date = local_date(at, tz);
    let today = local_date(now, tz);

    if date == today {
        return "Today".to_string();
    }
    if Some(date) == today.pred_opt() {
        return "Yesterday".to_string();
    }
    if date.year() != today.year() {
        return date.format("%b %-d, %Y").to_string();
    }
    date.format("%b %-d").to_string()
}
