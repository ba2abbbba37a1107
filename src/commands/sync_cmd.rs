//! Sync CLI commands for pushing to and pulling from the document server.

use clap::{Args, Subcommand};
use pomoquest_core::{DeferReason, SyncPhase, SyncStatus};

use crate::app::{App, Mode};
use crate::config::Config;

/// Sync with the document server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Push local changes (the default)
    Push,

    /// Replace local data with the server's copy, unless local changes are pending
    Pull,

    /// Show sync configuration and pending changes
    Status,

    /// Forget local changes that were never pushed
    Discard,
}

impl SyncCommand {
    /// Whether the command needs a signed-in connection to the server.
    pub fn needs_server(&self) -> bool {
        matches!(
            self.command,
            None | Some(SyncSubcommand::Push) | Some(SyncSubcommand::Pull)
        )
    }

    pub async fn run(&self, app: &App, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None | Some(SyncSubcommand::Push) => self.push(app, config).await,
            Some(SyncSubcommand::Pull) => self.pull(app, config),
            Some(SyncSubcommand::Status) => {
                self.status(app, config);
                Ok(())
            }
            Some(SyncSubcommand::Discard) => {
                let sync = app.store.sync();
                if !sync.has_pending_changes() {
                    println!("No pending changes.");
                } else {
                    sync.clear_pending();
                    println!("Discarded pending changes. Local data is kept.");
                }
                Ok(())
            }
        }
    }

    async fn push(&self, app: &App, config: &Config) -> Result<(), SyncCommandError> {
        require_online(app, config)?;
        let sync = app.store.sync();

        if !sync.has_pending_changes() {
            println!("Already up to date.");
            return Ok(());
        }

        println!("Pushing to {}...", config.sync.server_url.as_deref().unwrap_or("server"));
        sync.force_write().await;

        let status = sync.status();
        match status.phase {
            SyncPhase::Idle => {
                println!("Sync complete.");
                Ok(())
            }
            phase => Err(SyncCommandError::NotPushed(describe_phase(phase))),
        }
    }

    fn pull(&self, app: &App, config: &Config) -> Result<(), SyncCommandError> {
        require_online(app, config)?;

        if app.store.sync().has_pending_changes() {
            println!("Local changes are pending and take precedence; pushing them instead.");
            return Ok(());
        }
        let records = app.store.daily_records_desc().len();
        println!(
            "Pulled {} daily record{}.",
            records,
            if records == 1 { "" } else { "s" }
        );
        Ok(())
    }

    fn status(&self, app: &App, config: &Config) {
        println!("Sync Configuration");
        println!("==================");
        println!();

        if !config.sync.is_configured() {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"https://sync.example.com\"");
            println!("    api_key: \"...\"");
            println!("    user_id: \"...\"");
            println!();
            println!("Or set environment variables:");
            println!("  POMOQUEST_SYNC_URL, POMOQUEST_API_KEY, POMOQUEST_USER_ID");
        } else {
            println!("Server:    {}", config.sync.server_url.as_deref().unwrap_or(""));
            println!("User:      {}", config.sync.user_id.as_deref().unwrap_or(""));
            println!(
                "Auto-sync: {}",
                if config.sync.auto_sync {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        }
        println!();
        print_status(&app.store.sync().status());
    }
}

fn require_online(app: &App, config: &Config) -> Result<(), SyncCommandError> {
    if app.mode() == Mode::Online && config.sync.is_configured() {
        Ok(())
    } else {
        Err(SyncCommandError::NotConfigured)
    }
}

fn print_status(status: &SyncStatus) {
    println!(
        "Pending changes: {}",
        if status.has_pending { "yes" } else { "no" }
    );
    match status.last_synced_at {
        Some(at) => println!("Last synced:     {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last synced:     never"),
    }
    if status.has_pending {
        println!("State:           {}", describe_phase(status.phase));
    }
}

fn describe_phase(phase: SyncPhase) -> String {
    match phase {
        SyncPhase::Idle => "idle".to_string(),
        SyncPhase::Debounced => "waiting to push".to_string(),
        SyncPhase::Writing { attempt, .. } => format!("pushing (attempt {})", attempt),
        SyncPhase::Retrying { attempt, .. } => format!("retrying after attempt {}", attempt),
        SyncPhase::Deferred(DeferReason::NotAuthenticated) => "waiting for sign-in".to_string(),
        SyncPhase::Deferred(DeferReason::RetriesExhausted) => {
            "push failed, will retry on next change".to_string()
        }
        SyncPhase::Deferred(DeferReason::Throttled) => "throttled by server".to_string(),
        SyncPhase::Deferred(DeferReason::Restored) => "saved from a previous run".to_string(),
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    NotPushed(String),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => write!(
                f,
                "Sync is not configured. Run 'pomoquest sync status' for setup instructions."
            ),
            SyncCommandError::NotPushed(state) => {
                write!(f, "Changes were not pushed ({}); they are kept locally", state)
            }
        }
    }
}

impl std::error::Error for SyncCommandError {}
