use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::{CompletedQuest, DailyRecord, EndReason, Quest, Session, Settings};
use crate::timezone;

/// The complete user document: settings plus per-day records.
///
/// Mutating methods take `&mut self`; the data store applies them to a
/// clone and swaps the result in, so readers never see a half-applied
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub daily_records: BTreeMap<String, DailyRecord>,
    /// Time of the last local mutation. Display only; never used to
    /// resolve conflicts.
    pub last_updated: DateTime<Utc>,
}

impl Aggregate {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            settings: Settings::default(),
            daily_records: BTreeMap::new(),
            last_updated: now,
        }
    }

    pub fn timezone(&self) -> Tz {
        timezone::resolve(&self.settings.timezone)
    }

    /// Record key for `at` in the configured timezone.
    pub fn date_key(&self, at: DateTime<Utc>) -> String {
        timezone::date_key(at, self.timezone())
    }

    pub fn record(&self, date: &str) -> Option<&DailyRecord> {
        self.daily_records.get(date)
    }

    /// Returns the record for `date`, creating it if absent.
    pub fn record_mut(&mut self, date: &str, now: DateTime<Utc>) -> &mut DailyRecord {
        let record = self
            .daily_records
            .entry(date.to_string())
            .or_insert_with(|| DailyRecord::new(date, now));
        record.touch(now);
        record
    }

    /// The active quest and the date of the record holding it.
    pub fn active_quest(&self) -> Option<(&str, &Quest)> {
        self.daily_records.iter().rev().find_map(|(date, record)| {
            record
                .active_quest
                .as_ref()
                .filter(|q| q.is_active())
                .map(|q| (date.as_str(), q))
        })
    }

    /// Active quest held by any record other than `today`, latest first.
    pub fn stale_active_quest(&self, today: &str) -> Option<(&str, &Quest)> {
        self.daily_records
            .iter()
            .rev()
            .filter(|(date, _)| date.as_str() != today)
            .find_map(|(date, record)| {
                record
                    .active_quest
                    .as_ref()
                    .filter(|q| q.is_active())
                    .map(|q| (date.as_str(), q))
            })
    }

    /// Empties the active slot of every record. Returns whether anything was cleared.
    pub fn clear_active_quests(&mut self, now: DateTime<Utc>) -> bool {
        let mut cleared = false;
        for record in self.daily_records.values_mut() {
            if record.active_quest.take().is_some() {
                record.touch(now);
                cleared = true;
            }
        }
        cleared
    }

    /// Removes and returns the active quest held by `date`.
    pub fn take_active_quest(&mut self, date: &str, now: DateTime<Utc>) -> Option<Quest> {
        let record = self.daily_records.get_mut(date)?;
        let quest = record.active_quest.take()?;
        record.touch(now);
        Some(quest)
    }

    /// Sets today's active quest, or clears it when `title` is blank.
    pub fn set_active_quest(&mut self, title: &str, now: DateTime<Utc>) {
        let title = title.trim();
        let today = self.date_key(now);

        if title.is_empty() {
            if let Some(record) = self.daily_records.get_mut(&today) {
                record.active_quest = None;
                record.touch(now);
            }
            return;
        }

        self.clear_active_quests(now);
        self.record_mut(&today, now).active_quest = Some(Quest::active(title, now));
    }

    /// Files a completed quest under the day it was completed.
    pub fn add_completed_quest(&mut self, quest: CompletedQuest, now: DateTime<Utc>) {
        let date = self.date_key(quest.completed_at);
        let quest_id = quest.id.clone();

        // Completing frees the in-progress slot, wherever it lives.
        for record in self.daily_records.values_mut() {
            let occupied = record
                .active_quest
                .as_ref()
                .is_some_and(|q| q.id == quest_id || q.is_active());
            if occupied {
                record.active_quest = None;
                record.touch(now);
            }
        }

        self.record_mut(&date, now)
            .completed_quests
            .push(quest.into_quest());
    }

    /// Deletes a completed quest from whichever day holds it.
    pub fn delete_quest(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        let mut removed = false;
        for record in self.daily_records.values_mut() {
            let before = record.completed_quests.len();
            record.completed_quests.retain(|q| q.id != id);
            if record.completed_quests.len() != before {
                record.touch(now);
                removed = true;
            }
        }
        removed
    }

    /// Files a session under the day it started.
    pub fn record_session(&mut self, session: Session, now: DateTime<Utc>) {
        let date = self.date_key(session.started_at);
        self.record_mut(&date, now).sessions.push(session);
    }

    /// Ends the session with `id`. Returns false if no such session exists.
    pub fn end_session(
        &mut self,
        id: &str,
        ended_at: DateTime<Utc>,
        reason: Option<EndReason>,
        now: DateTime<Utc>,
    ) -> bool {
        for record in self.daily_records.values_mut() {
            if let Some(session) = record.sessions.iter_mut().find(|s| s.id == id) {
                session.finish(ended_at, reason);
                record.touch(now);
                return true;
            }
        }
        false
    }

    pub fn increment_pomodoro_count(&mut self, now: DateTime<Utc>) {
        let today = self.date_key(now);
        self.record_mut(&today, now).pomodoro_count += 1;
    }

    pub fn pomodoro_count(&self, date: &str) -> u32 {
        self.record(date).map(|r| r.pomodoro_count).unwrap_or(0)
    }

    /// All completed quests, newest first.
    pub fn completed_quests(&self) -> Vec<CompletedQuest> {
        let mut quests: Vec<CompletedQuest> = self
            .daily_records
            .values()
            .flat_map(|r| r.completed_quests.iter().map(Quest::as_completed))
            .collect();
        quests.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        quests
    }

    /// All sessions ordered by start time.
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .daily_records
            .values()
            .flat_map(|r| r.sessions.iter().cloned())
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }
}

impl Default for Aggregate {
    fn default() -> Self {
        Self::empty(Utc::now())
    }
}
