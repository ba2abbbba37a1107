use clap::{Args, Subcommand};
use pomoquest_core::{timezone, CompletedQuest};

use super::OutputFormat;
use crate::app::App;

#[derive(Args)]
pub struct QuestCommand {
    #[command(subcommand)]
    pub command: QuestSubcommand,
}

#[derive(Subcommand)]
pub enum QuestSubcommand {
    /// Show today's active quest and any quest left over from an earlier day
    Show,

    /// Set today's active quest
    Set {
        /// What you are working on
        title: String,
    },

    /// Clear today's active quest
    Clear,

    /// Mark today's active quest as completed
    Complete,

    /// Record a quest that is already done
    Add {
        /// Quest title
        title: String,
    },

    /// Delete a completed quest
    Delete {
        /// Quest ID
        id: String,
    },

    /// List completed quests, newest first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Maximum number of quests to show
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Resolve a quest left active on an earlier day
    Carryover {
        /// Move it to today
        #[arg(long = "move", conflicts_with = "dismiss")]
        move_to_today: bool,

        /// Drop it
        #[arg(long)]
        dismiss: bool,
    },
}

impl QuestCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let store = &app.store;

        match &self.command {
            QuestSubcommand::Show => {
                match store.active_quest() {
                    Some(quest) => println!("Active quest: {}", quest.title),
                    None => println!("No active quest for today."),
                }
                if let Some(left) = store.yesterday_quest() {
                    println!();
                    println!("Unfinished quest from {}: {}", left.date, left.quest.title);
                    println!("Use 'pomoquest quest carryover --move' or '--dismiss'.");
                }
            }

            QuestSubcommand::Set { title } => {
                if title.trim().is_empty() {
                    return Err("Quest title cannot be empty".into());
                }
                store.set_active_quest(title);
                println!("Active quest: {}", title.trim());
            }

            QuestSubcommand::Clear => {
                if store.active_quest().is_none() {
                    println!("No active quest for today.");
                } else {
                    store.set_active_quest("");
                    println!("Cleared today's quest.");
                }
            }

            QuestSubcommand::Complete => match store.complete_active_quest() {
                Some(quest) => println!("Completed: {} ({})", quest.title, quest.id),
                None => return Err("No active quest to complete".into()),
            },

            QuestSubcommand::Add { title } => {
                if title.trim().is_empty() {
                    return Err("Quest title cannot be empty".into());
                }
                let quest = CompletedQuest::new(title.trim(), store.now());
                let id = quest.id.clone();
                store.add_completed_quest(quest);
                println!("Added completed quest: {} ({})", title.trim(), id);
            }

            QuestSubcommand::Delete { id } => {
                if !store.delete_quest(id) {
                    return Err(format!("Quest not found: {}", id).into());
                }
                println!("Deleted quest: {}", id);
            }

            QuestSubcommand::List { format, limit } => {
                let mut quests = store.completed_quests();
                if let Some(limit) = limit {
                    quests.truncate(*limit);
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&quests)?);
                    }
                    OutputFormat::Text => {
                        if quests.is_empty() {
                            println!("No completed quests yet.");
                            return Ok(());
                        }
                        let tz = store.snapshot().timezone();
                        let now = store.now();
                        let mut current_label = String::new();
                        for quest in &quests {
                            let label = timezone::date_label(quest.completed_at, now, tz);
                            if label != current_label {
                                if !current_label.is_empty() {
                                    println!();
                                }
                                println!("{}", label);
                                current_label = label;
                            }
                            println!(
                                "  {}  {}  [{}]",
                                quest.completed_at.with_timezone(&tz).format("%H:%M"),
                                quest.title,
                                quest.id
                            );
                        }
                    }
                }
            }

            QuestSubcommand::Carryover {
                move_to_today,
                dismiss,
            } => {
                let Some(left) = store.yesterday_quest() else {
                    println!("Nothing to carry over.");
                    return Ok(());
                };
                if *move_to_today {
                    store.move_yesterday_quest_to_today();
                    println!("Moved '{}' to today.", left.quest.title);
                } else if *dismiss {
                    store.dismiss_yesterday_quest();
                    println!("Dismissed '{}'.", left.quest.title);
                } else {
                    println!("Unfinished quest from {}: {}", left.date, left.quest.title);
                    println!("Pass --move to continue it today or --dismiss to drop it.");
                }
            }
        }

        Ok(())
    }
}
