use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Quest, Session};

/// Everything that happened on one calendar day in the user's timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    /// `YYYY-MM-DD`, same as the key this record is stored under
    pub date: String,
    /// Completed work sessions
    #[serde(default)]
    pub pomodoro_count: u32,
    /// In-progress quest, at most one across all records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_quest: Option<Quest>,
    #[serde(default)]
    pub completed_quests: Vec<Quest>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyRecord {
    pub fn new(date: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            date: date.into(),
            pomodoro_count: 0,
            active_quest: None,
            completed_quests: Vec::new(),
            sessions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// True when the record carries no data worth keeping.
    pub fn is_empty(&self) -> bool {
        self.pomodoro_count == 0
            && self.active_quest.is_none()
            && self.completed_quests.is_empty()
            && self.sessions.is_empty()
    }
}
