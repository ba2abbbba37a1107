use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timezone;

/// User preferences synchronized with the rest of the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Work session length in minutes
    pub work_duration: u32,
    /// Short break length in minutes
    pub short_break_duration: u32,
    /// Long break length in minutes
    pub long_break_duration: u32,
    /// Work sessions before a long break
    pub long_break_interval: u32,
    pub sound_enabled: bool,
    pub theme: String,
    /// IANA timezone used to bucket daily records
    pub timezone: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_duration: 25,
            short_break_duration: 5,
            long_break_duration: 15,
            long_break_interval: 4,
            sound_enabled: true,
            theme: "dark".to_string(),
            timezone: "America/Los_Angeles".to_string(),
        }
    }
}

/// Errors for settings that break an invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("{0} must be a positive number of minutes")]
    NonPositiveDuration(&'static str),

    #[error("Long break interval must be at least 2, got {0}")]
    IntervalTooShort(u32),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, minutes) in [
            ("Work duration", self.work_duration),
            ("Short break duration", self.short_break_duration),
            ("Long break duration", self.long_break_duration),
        ] {
            if minutes == 0 {
                return Err(SettingsError::NonPositiveDuration(name));
            }
        }
        if self.long_break_interval < 2 {
            return Err(SettingsError::IntervalTooShort(self.long_break_interval));
        }
        if timezone::parse(&self.timezone).is_none() {
            return Err(SettingsError::UnknownTimezone(self.timezone.clone()));
        }
        Ok(())
    }

    /// Returns a copy where every field that breaks an invariant is replaced
    /// by its default.
    pub fn sanitized(&self) -> Settings {
        let defaults = Settings::default();
        let minutes = |value: u32, default: u32| if value == 0 { default } else { value };
        Settings {
            work_duration: minutes(self.work_duration, defaults.work_duration),
            short_break_duration: minutes(self.short_break_duration, defaults.short_break_duration),
            long_break_duration: minutes(self.long_break_duration, defaults.long_break_duration),
            long_break_interval: if self.long_break_interval < 2 {
                defaults.long_break_interval
            } else {
                self.long_break_interval
            },
            sound_enabled: self.sound_enabled,
            theme: self.theme.clone(),
            timezone: if timezone::parse(&self.timezone).is_some() {
                self.timezone.clone()
            } else {
                defaults.timezone
            },
        }
    }

    /// Returns these settings with `patch` applied.
    pub fn merged(&self, patch: &SettingsPatch) -> Settings {
        Settings {
            work_duration: patch.work_duration.unwrap_or(self.work_duration),
            short_break_duration: patch
                .short_break_duration
                .unwrap_or(self.short_break_duration),
            long_break_duration: patch.long_break_duration.unwrap_or(self.long_break_duration),
            long_break_interval: patch.long_break_interval.unwrap_or(self.long_break_interval),
            sound_enabled: patch.sound_enabled.unwrap_or(self.sound_enabled),
            theme: patch.theme.clone().unwrap_or_else(|| self.theme.clone()),
            timezone: patch
                .timezone
                .clone()
                .unwrap_or_else(|| self.timezone.clone()),
        }
    }

    /// Timer length for a session mode, in seconds.
    pub fn duration_secs(&self, mode: super::TimerMode) -> u64 {
        let minutes = match mode {
            super::TimerMode::Work => self.work_duration,
            super::TimerMode::ShortBreak => self.short_break_duration,
            super::TimerMode::LongBreak => self.long_break_duration,
        };
        u64::from(minutes) * 60
    }
}

/// Partial settings update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub work_duration: Option<u32>,
    pub short_break_duration: Option<u32>,
    pub long_break_duration: Option<u32>,
    pub long_break_interval: Option<u32>,
    pub sound_enabled: Option<bool>,
    pub theme: Option<String>,
    pub timezone: Option<String>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimerMode;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let settings = Settings {
            short_break_duration: 0,
            ..Settings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::NonPositiveDuration("Short break duration"))
        );
    }

    #[test]
    fn test_interval_lower_bound() {
        let mut settings = Settings {
            long_break_interval: 1,
            ..Settings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::IntervalTooShort(1)));
        settings.long_break_interval = 2;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_sanitized_resets_only_invalid_fields() {
        let settings = Settings {
            work_duration: 0,
            short_break_duration: 7,
            long_break_interval: 1,
            timezone: "Mars/Olympus".to_string(),
            theme: "light".to_string(),
            ..Settings::default()
        };
        let fixed = settings.sanitized();
        assert!(fixed.validate().is_ok());
        assert_eq!(fixed.work_duration, 25);
        assert_eq!(fixed.short_break_duration, 7);
        assert_eq!(fixed.long_break_interval, 4);
        assert_eq!(fixed.timezone, "America/Los_Angeles");
        assert_eq!(fixed.theme, "light");
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let settings = Settings {
            timezone: "Nowhere/Special".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_merge_patch() {
        let patch = SettingsPatch {
            work_duration: Some(50),
            timezone: Some("Asia/Shanghai".to_string()),
            ..SettingsPatch::default()
        };
        let merged = Settings::default().merged(&patch);
        assert_eq!(merged.work_duration, 50);
        assert_eq!(merged.timezone, "Asia/Shanghai");
        assert_eq!(merged.short_break_duration, 5);
        assert_eq!(merged.duration_secs(TimerMode::Work), 3000);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"workDuration": 30}"#).unwrap();
        assert_eq!(settings.work_duration, 30);
        assert_eq!(settings.timezone, "America/Los_Angeles");
    }
}
