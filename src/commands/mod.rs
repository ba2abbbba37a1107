pub mod config_cmd;
pub mod data;
pub mod quest;
pub mod session;
pub mod settings_cmd;
pub mod sync_cmd;

use clap::ValueEnum;

pub use config_cmd::ConfigCommand;
pub use data::DataCommand;
pub use quest::QuestCommand;
pub use session::SessionCommand;
pub use settings_cmd::SettingsCommand;
pub use sync_cmd::SyncCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
