//! jackpot-watch — lottery jackpot decision engine.
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! the state store and dispatches one of the CLI commands. Observations come
//! from a JSON feed file written by an external collector; emitted intents
//! are written to stdout as JSON lines for the notifier/automation side.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use jackpot_watch::config::{AppConfig, StorageBackend};
use jackpot_watch::dashboard::{self, routes::DashboardState};
use jackpot_watch::engine::reminder::ReminderDecision;
use jackpot_watch::engine::{Engine, GameResult};
use jackpot_watch::storage::{JsonFileStore, SqliteStore, StateStore};
use jackpot_watch::strategy::NotifyMode;
use jackpot_watch::types::{AutomationIntent, NotificationIntent, Observation};

#[derive(Parser)]
#[command(name = "jackpot-watch")]
#[command(about = "Lottery jackpot EV, threshold and buy-signal engine")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "JACKPOT_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every observation in a feed file once
    Check {
        /// JSON array of {game_id, timestamp, jackpot}
        #[arg(short, long, value_name = "PATH")]
        feed: PathBuf,

        /// Apply the near-draw timing gate instead of reporting everything
        #[arg(long)]
        scheduled: bool,
    },

    /// Poll a feed file and run reminder checks until Ctrl+C
    Run {
        #[arg(short, long, value_name = "PATH")]
        feed: PathBuf,

        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },

    /// Run the buy-signal reminder pass once
    Remind,

    /// Print the weekly check plan for every game
    Schedule,

    /// Serve the read-only JSON dashboard
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Override a game's tracked rollover count
    SetRollover {
        game_id: String,
        rollover_count: u32,
        /// Jackpot at the start of the current cycle
        #[arg(long)]
        cycle_start: Option<Decimal>,
    },

    /// Start a fresh threshold alert scope for one game, or all games
    ResetThresholds { game_id: Option<String> },
}

/// One line of intent output.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Emitted<'a> {
    Notification(&'a NotificationIntent),
    Automation(&'a AutomationIntent),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load(&cli.config.to_string_lossy())?;
    let store = open_store(&cfg).await?;
    let engine = Arc::new(Engine::new(&cfg, store));

    if engine.games().is_empty() {
        warn!("No valid games configured");
    }

    match cli.command {
        Commands::Check { feed, scheduled } => {
            let mode = if scheduled {
                NotifyMode::Scheduled
            } else {
                NotifyMode::Manual
            };
            let observations = engine.pending(read_feed(&feed).await?).await?;
            let results = engine.process_batch(observations, mode, Utc::now()).await;
            emit_results(&results)?;
        }
        Commands::Run {
            feed,
            interval_secs,
        } => {
            if cfg.dashboard.enabled {
                let state = Arc::new(DashboardState::new(engine.clone()));
                dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
            }
            run_loop(&engine, &feed, Duration::from_secs(interval_secs.max(1))).await?;
        }
        Commands::Remind => {
            run_reminders(&engine).await?;
        }
        Commands::Schedule => {
            println!("{}", serde_json::to_string_pretty(&engine.check_plans())?);
        }
        Commands::Serve { port } => {
            let state = Arc::new(DashboardState::new(engine.clone()));
            dashboard::serve_dashboard(state, port.unwrap_or(cfg.dashboard.port)).await?;
        }
        Commands::SetRollover {
            game_id,
            rollover_count,
            cycle_start,
        } => {
            let state = engine
                .set_rollover(&game_id, rollover_count, cycle_start, Utc::now())
                .await?;
            println!("{state}");
        }
        Commands::ResetThresholds { game_id } => {
            let reset = engine.reset_thresholds(game_id.as_deref()).await?;
            info!(games = ?reset, "Thresholds reset");
        }
    }

    Ok(())
}

/// Scheduled loop: every tick, evaluate new feed entries under the timing
/// gate and run the reminder pass.
async fn run_loop(engine: &Engine, feed: &Path, every: Duration) -> Result<()> {
    let mut interval = tokio::time::interval(every);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = every.as_secs(),
        feed = %feed.display(),
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match read_feed(feed).await {
                    Ok(observations) => match engine.pending(observations).await {
                        Ok(pending) if !pending.is_empty() => {
                            let results = engine
                                .process_batch(pending, NotifyMode::Scheduled, Utc::now())
                                .await;
                            if let Err(e) = emit_results(&results) {
                                error!(error = %e, "Failed to write intents");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Failed to filter feed"),
                    },
                    Err(e) => error!(error = %e, "Failed to read feed, continuing to next tick"),
                }
                if let Err(e) = run_reminders(engine).await {
                    error!(error = %e, "Reminder pass failed");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("jackpot-watch shut down cleanly.");
    Ok(())
}

async fn run_reminders(engine: &Engine) -> Result<()> {
    for (game_id, result) in engine.check_reminders(Utc::now()).await {
        match result {
            Ok(ReminderDecision::Sent(intent)) => emit(&Emitted::Notification(&intent))?,
            Ok(_) => {}
            Err(e) => warn!(game_id = %game_id, error = %e, "Reminder check failed"),
        }
    }
    Ok(())
}

async fn read_feed(path: &Path) -> Result<Vec<Observation>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read feed {}", path.display()))?;
    let mut observations: Vec<Observation> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse feed {}", path.display()))?;
    // Feed order is not guaranteed; the tracker expects time order per game
    observations.sort_by_key(|o| o.timestamp);
    Ok(observations)
}

fn emit(item: &Emitted<'_>) -> Result<()> {
    println!("{}", serde_json::to_string(item)?);
    Ok(())
}

/// Write intents to stdout; errors are logged per game and never abort
/// the batch.
fn emit_results(results: &[GameResult]) -> Result<()> {
    for r in results {
        match &r.result {
            Ok(outcome) => {
                for intent in &outcome.notifications {
                    emit(&Emitted::Notification(intent))?;
                }
                if let Some(auto) = &outcome.automation {
                    emit(&Emitted::Automation(auto))?;
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!(game_id = %r.game_id, error = %e, "Observation skipped");
            }
            Err(e) => {
                error!(game_id = %r.game_id, error = %e, "Observation failed");
            }
        }
    }
    Ok(())
}

async fn open_store(cfg: &AppConfig) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match cfg.storage.backend {
        StorageBackend::Json => {
            info!(path = %cfg.storage.path, "Using JSON state file");
            Arc::new(JsonFileStore::new(&cfg.storage.path))
        }
        StorageBackend::Sqlite => Arc::new(SqliteStore::new(&cfg.storage.path).await?),
    };
    Ok(store)
}

/// Initialise the `tracing` subscriber. Logs go to stderr so stdout stays
/// machine-readable.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jackpot_watch=info"));

    let json_logging = std::env::var("JACKPOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
