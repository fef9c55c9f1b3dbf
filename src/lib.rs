pub mod calendar;
pub mod classifier;
pub mod config;
pub mod db;
pub mod history;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod sensing;
mod utils;

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

use calendar::Period;
use config::ConfigStore;
use db::Database;
use monitor::MonitorController;
use sensing::SimulatedSource;

const SIMULATED_TAG_ID: i64 = 1;

/// Run the monitor against the simulated marker until Ctrl-C.
pub async fn run() -> Result<()> {
    // Reads RUST_LOG when set
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("machine uptime monitor starting up...");

    let config_store = ConfigStore::new(config::config_path_from_env())?;
    let config = config_store.get();
    info!("configuration loaded from {}", config_store.path().display());
    match config_store.ensure_file() {
        Ok(true) => info!("wrote default configuration to {}", config_store.path().display()),
        Ok(false) => {}
        Err(err) => log::warn!("could not write default configuration: {err:?}"),
    }

    let database = Database::new(config.database_path.clone())?;
    let controller = MonitorController::new(&config, database)?;

    let seed = Utc::now().timestamp_micros().unsigned_abs();
    let source = SimulatedSource::random(seed, SIMULATED_TAG_ID, config.target_fps);
    controller.start(source).await?;

    match controller.metrics(Period::Today, Utc::now()).await {
        Ok(summary) => info!(
            "today so far: running {:.1}%, idle {:.1}%, error {:.1}%",
            summary.percentages.running, summary.percentages.idle, summary.percentages.error
        ),
        Err(err) => log::warn!("could not summarise today: {err:?}"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutdown requested");
    controller.stop().await?;

    let live = controller.live_view(Utc::now());
    info!("final state {:?} (tag {:?})", live.status, live.last_tag_id);
    Ok(())
}
