mod aggregate;
mod daily_record;
mod quest;
mod session;
mod settings;

pub use aggregate::Aggregate;
pub use daily_record::DailyRecord;
pub use quest::{CompletedQuest, Quest, ACTIVE_QUEST_ID};
pub use session::{EndReason, Session, TimerMode};
pub use settings::{Settings, SettingsError, SettingsPatch};
