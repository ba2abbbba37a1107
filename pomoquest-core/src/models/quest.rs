use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved quest id for the single in-progress task slot.
pub const ACTIVE_QUEST_ID: &str = "current";

/// A task the user works on during pomodoros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Quest {
    /// Creates the in-progress quest occupying the active slot.
    pub fn active(title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ACTIVE_QUEST_ID.to_string(),
            title: title.into(),
            completed: false,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.id == ACTIVE_QUEST_ID && !self.completed
    }

    /// Flattened view used by history listings.
    pub fn as_completed(&self) -> CompletedQuest {
        CompletedQuest {
            id: self.id.clone(),
            title: self.title.clone(),
            completed_at: self.completed_at.unwrap_or(self.created_at),
        }
    }
}

/// A finished quest as handed in by callers and returned by history reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedQuest {
    pub id: String,
    pub title: String,
    pub completed_at: DateTime<Utc>,
}

impl CompletedQuest {
    /// Creates a completed quest with a fresh id.
    pub fn new(title: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            completed_at,
        }
    }

    /// The stored form; completed quests are created at completion time.
    pub fn into_quest(self) -> Quest {
        Quest {
            id: self.id,
            title: self.title,
            completed: true,
            created_at: self.completed_at,
            completed_at: Some(self.completed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_quest() {
        let quest = Quest::active("write outline", Utc::now());
        assert_eq!(quest.id, ACTIVE_QUEST_ID);
        assert!(quest.is_active());
        assert!(quest.completed_at.is_none());
    }

    #[test]
    fn test_completed_quest_into_quest() {
        let at = Utc::now();
        let quest = CompletedQuest::new("ship it", at).into_quest();
        assert!(quest.completed);
        assert!(!quest.is_active());
        assert_eq!(quest.created_at, at);
        assert_eq!(quest.completed_at, Some(at));
        assert_eq!(quest.as_completed().completed_at, at);
    }

    #[test]
    fn test_quest_json_uses_camel_case() {
        let quest = Quest::active("read", Utc::now());
        let json = serde_json::to_value(&quest).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("completedAt").is_none());
    }
}
