use chrono::Duration;
use clap::{Args, Subcommand, ValueEnum};
use pomoquest_core::{timezone, EndReason, Session, TimerMode};

use super::OutputFormat;
use crate::app::App;

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Work,
    ShortBreak,
    LongBreak,
}

impl From<ModeArg> for TimerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Work => TimerMode::Work,
            ModeArg::ShortBreak => TimerMode::ShortBreak,
            ModeArg::LongBreak => TimerMode::LongBreak,
        }
    }
}

#[derive(Args)]
pub struct SessionCommand {
    #[command(subcommand)]
    pub command: SessionSubcommand,
}

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Log a session that just ended
    Log {
        /// Timer mode
        #[arg(long, short, value_enum, default_value = "work")]
        mode: ModeArg,

        /// Minutes the session ran (defaults to the configured length)
        #[arg(long)]
        minutes: Option<u32>,

        /// The session was skipped before it finished
        #[arg(long, conflicts_with = "reset")]
        skipped: bool,

        /// The timer was reset before it finished
        #[arg(long)]
        reset: bool,
    },

    /// List sessions of the last few days
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Past days to include besides today
        #[arg(
            long,
            default_value = "0",
            value_parser = clap::value_parser!(u32).range(..=i64::from(timezone::MAX_HISTORY_DAYS))
        )]
        days: u32,
    },
}

impl SessionCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let store = &app.store;

        match &self.command {
            SessionSubcommand::Log {
                mode,
                minutes,
                skipped,
                reset,
            } => {
                let mode = TimerMode::from(*mode);
                let settings = store.settings();
                let minutes = minutes.map(i64::from).unwrap_or_else(|| {
                    i64::try_from(settings.duration_secs(mode) / 60).unwrap_or(0)
                });
                if minutes <= 0 {
                    return Err("Session length must be positive".into());
                }
                let reason = match (skipped, reset) {
                    (true, _) => Some(EndReason::Skipped),
                    (_, true) => Some(EndReason::Reset),
                    _ => None,
                };

                let ended_at = store.now();
                let session = Session::start(mode, ended_at - Duration::minutes(minutes));
                let id = session.id.clone();
                store.record_session(session);
                store.end_session(&id, ended_at, reason);

                if mode == TimerMode::Work && reason.is_none() {
                    store.increment_today_pomodoro_count();
                }

                match reason {
                    Some(reason) => println!("Logged {} session ({} min, {})", mode, minutes, reason),
                    None => println!("Logged {} session ({} min)", mode, minutes),
                }
                println!("Pomodoros today: {}", store.today_pomodoro_count());
            }

            SessionSubcommand::List { format, days } => {
                let snapshot = store.snapshot();
                let tz = snapshot.timezone();
                let now = store.now();

                let mut dates = vec![store.today_key()];
                dates.extend(timezone::history_range(*days, now, tz));

                let sessions: Vec<Session> = store
                    .sessions()
                    .into_iter()
                    .filter(|s| dates.contains(&timezone::date_key(s.started_at, tz)))
                    .collect();

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&sessions)?);
                    }
                    OutputFormat::Text => {
                        for date in &dates {
                            println!("{} - {} pomodoros", date, snapshot.pomodoro_count(date));
                            for session in sessions
                                .iter()
                                .filter(|s| &timezone::date_key(s.started_at, tz) == date)
                            {
                                let status = match (session.ended_at, session.end_reason) {
                                    (None, _) => "running".to_string(),
                                    (Some(_), None) => "completed".to_string(),
                                    (Some(_), Some(reason)) => reason.to_string(),
                                };
                                println!(
                                    "  {}  {:<11} {}",
                                    session.started_at.with_timezone(&tz).format("%H:%M"),
                                    session.mode.to_string(),
                                    status
                                );
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
