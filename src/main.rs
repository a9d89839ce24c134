//! HUMAN FLY — crash round engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the game session, and serves it until Ctrl+C, with an optional
//! autopilot playing rounds unattended.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use humanfly::autopilot::{self, AutopilotExit};
use humanfly::config;
use humanfly::dashboard;
use humanfly::engine::{CrashPointSource, GameHandle, RandomCrashPoints, RoundEngine};

const BANNER: &str = r#"
 _   _ _   _ __  __    _    _   _   _____ _  __   __
| | | | | | |  \/  |  / \  | \ | | |  ___| | \ \ / /
| |_| | | | | |\/| | / _ \ |  \| | | |_  | |  \ V /
|  _  | |_| | |  | |/ ___ \| |\  | |  _| | |___| |
|_| |_|\___/|_|  |_/_/   \_\_| \_| |_|   |_____|_|

  Crash round engine v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("HUMANFLY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

    init_logging();
    let cfg = config::AppConfig::load_or_default(&config_path)?;

    println!("{BANNER}");
    info!(
        name = %cfg.game.name,
        initial_balance = %cfg.game.initial_balance,
        tick_interval_ms = cfg.game.tick_interval_ms,
        cooldown_secs = cfg.game.cooldown_secs,
        seeded = cfg.game.seed.is_some(),
        "HUMAN FLY starting up"
    );

    // -- Build the session -----------------------------------------------

    let source: Box<dyn CrashPointSource> = match cfg.game.seed {
        Some(seed) => Box::new(RandomCrashPoints::seeded(seed)),
        None => Box::new(RandomCrashPoints::from_entropy()),
    };
    let engine = RoundEngine::new(cfg.game.engine_config(), cfg.game.initial_balance, source);
    let game = Arc::new(GameHandle::new(engine));

    let server = if cfg.dashboard.enabled {
        Some(dashboard::spawn_dashboard(Arc::clone(&game), cfg.dashboard.port).await?)
    } else {
        None
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let pilot = if cfg.autopilot.enabled {
        info!(
            stake_one = ?cfg.autopilot.stake_one,
            stake_two = %cfg.autopilot.stake_two,
            "Autopilot enabled"
        );
        Some(tokio::spawn(autopilot::run(
            Arc::clone(&game),
            cfg.autopilot.clone(),
            cancel_rx,
        )))
    } else {
        None
    };

    info!("Ready. Press Ctrl+C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received.");

    // -- Teardown ------------------------------------------------------------

    let _ = cancel_tx.send(true);
    if let Some(pilot) = pilot {
        match pilot.await {
            Ok(AutopilotExit::Cancelled) => {}
            Ok(exit) => info!(exit = ?exit, "Autopilot had already stopped"),
            Err(e) => error!(error = %e, "Autopilot task failed"),
        }
    }
    if let Some(server) = server {
        server.abort();
    }
    game.shutdown().await;

    let status = game.status().await;
    info!(
        balance = format!("{:.2}", status.balance),
        rounds = status.totals.rounds_played,
        staked = format!("{:.2}", status.totals.total_staked),
        won = format!("{:.2}", status.totals.total_won),
        net = format!("{:.2}", status.totals.net()),
        "HUMAN FLY shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("humanfly=info"));

    let json_logging = std::env::var("HUMANFLY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
