use clap::{Args, Subcommand};
use pomoquest_core::{timezone, SettingsPatch};

use super::OutputFormat;
use crate::app::App;

#[derive(Args)]
pub struct SettingsCommand {
    #[command(subcommand)]
    pub command: SettingsSubcommand,
}

#[derive(Subcommand)]
pub enum SettingsSubcommand {
    /// Show current settings
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Change one or more settings
    Set {
        /// Work session length in minutes
        #[arg(long)]
        work: Option<u32>,

        /// Short break length in minutes
        #[arg(long)]
        short_break: Option<u32>,

        /// Long break length in minutes
        #[arg(long)]
        long_break: Option<u32>,

        /// Work sessions before a long break
        #[arg(long)]
        interval: Option<u32>,

        /// Play a sound when the timer ends
        #[arg(long)]
        sound: Option<bool>,

        /// Color theme name
        #[arg(long)]
        theme: Option<String>,

        /// IANA timezone used for daily records (e.g., Europe/Berlin)
        #[arg(long)]
        timezone: Option<String>,
    },

    /// List the suggested timezones
    Timezones,
}

impl SettingsCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let store = &app.store;

        match &self.command {
            SettingsSubcommand::Show { format } => {
                let settings = store.settings();
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&settings)?);
                    }
                    OutputFormat::Text => {
                        println!("Work:          {} min", settings.work_duration);
                        println!("Short break:   {} min", settings.short_break_duration);
                        println!("Long break:    {} min", settings.long_break_duration);
                        println!("Long break every {} sessions", settings.long_break_interval);
                        println!(
                            "Sound:         {}",
                            if settings.sound_enabled { "on" } else { "off" }
                        );
                        println!("Theme:         {}", settings.theme);
                        println!(
                            "Timezone:      {}",
                            timezone::display_name(&settings.timezone)
                        );
                    }
                }
            }

            SettingsSubcommand::Set {
                work,
                short_break,
                long_break,
                interval,
                sound,
                theme,
                timezone,
            } => {
                let patch = SettingsPatch {
                    work_duration: *work,
                    short_break_duration: *short_break,
                    long_break_duration: *long_break,
                    long_break_interval: *interval,
                    sound_enabled: *sound,
                    theme: theme.clone(),
                    timezone: timezone.clone(),
                };
                if patch.is_empty() {
                    return Err("Nothing to change; see 'pomoquest settings set --help'".into());
                }
                store.update_settings(&patch)?;
                println!("Settings updated.");
            }

            SettingsSubcommand::Timezones => {
                for (name, label) in timezone::SUPPORTED_TIMEZONES {
                    println!("{:<22} {}", name, label);
                }
            }
        }

        Ok(())
    }
}
