use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod commands;
mod config;

use app::{App, Mode};
use commands::{
    ConfigCommand, DataCommand, QuestCommand, SessionCommand, SettingsCommand, SyncCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "pomoquest")]
#[command(version)]
#[command(about = "A pomodoro and quest tracker with cloud sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the active quest and completed quests
    Quest(QuestCommand),

    /// Log and list timer sessions
    Session(SessionCommand),

    /// Show and change timer settings
    Settings(SettingsCommand),

    /// Sync with the document server
    Sync(SyncCommand),

    /// Export and import backups
    Data(DataCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pomoquest=warn,pomoquest_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(execute_command(&cli.command, &config))
}

async fn execute_command(
    command: &Option<Commands>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(command) = command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    // Config commands never touch the data directory.
    if let Commands::Config(cmd) = command {
        return cmd.run(config);
    }

    let app = App::open(config, mode_for(command, config)).await;

    let result = match command {
        Commands::Quest(cmd) => cmd.run(&app).await,
        Commands::Session(cmd) => cmd.run(&app).await,
        Commands::Settings(cmd) => cmd.run(&app).await,
        Commands::Sync(cmd) => cmd
            .run(&app, config)
            .await
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
        Commands::Data(cmd) => cmd.run(&app).await,
        Commands::Config(_) => Ok(()),
    };

    // Push AFTER the command, only if it succeeded
    if result.is_ok() {
        app.finish().await;
    }
    result
}

/// Sync commands always go online; everything else only with auto-sync.
fn mode_for(command: &Commands, config: &Config) -> Mode {
    match command {
        Commands::Sync(cmd) if cmd.needs_server() => Mode::Online,
        _ if config.sync.auto_sync => Mode::Online,
        _ => Mode::Offline,
    }
}
