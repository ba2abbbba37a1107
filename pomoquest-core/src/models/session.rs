use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timer mode a session ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    Work,
    ShortBreak,
    LongBreak,
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerMode::Work => write!(f, "work"),
            TimerMode::ShortBreak => write!(f, "short break"),
            TimerMode::LongBreak => write!(f, "long break"),
        }
    }
}

/// Why a session ended before its timer ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Skipped,
    Reset,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Skipped => write!(f, "skipped"),
            EndReason::Reset => write!(f, "reset"),
        }
    }
}

/// One run of the timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub mode: TimerMode,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

impl Session {
    pub fn start(mode: TimerMode, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at,
            ended_at: None,
            mode,
            completed: false,
            end_reason: None,
        }
    }

    /// Marks the session ended. No reason means the timer ran out.
    pub fn finish(&mut self, ended_at: DateTime<Utc>, reason: Option<EndReason>) {
        self.ended_at = Some(ended_at);
        self.completed = reason.is_none();
        self.end_reason = reason;
    }

    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }
}
