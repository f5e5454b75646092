pub mod analysis;
mod commands;
pub mod config;
pub mod db;
pub mod error;
mod server;
pub mod timecode;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::net::TcpListener;

use analysis::{ExternalAnalyzer, JobController};
use config::Config;
use db::Database;

/// Upper bound on how long shutdown waits for a running job to seal its session.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub(crate) db: Database,
    pub(crate) controller: JobController,
}

pub fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

pub async fn run(config: Config) -> Result<()> {
    info!("vlrscout starting up...");

    let sessions_dir = config.sessions_dir();
    std::fs::create_dir_all(&sessions_dir)
        .with_context(|| format!("failed to create {}", sessions_dir.display()))?;

    let db = Database::new(config.database_path())?;
    let recovered = db.recover_interrupted_sessions().await?;
    if !recovered.is_empty() {
        warn!("Marked {} interrupted session(s) as errored", recovered.len());
    }

    let analyzer = ExternalAnalyzer::new(
        config.analyzer.program.clone(),
        config.analyzer.args.clone(),
        sessions_dir,
    );
    let controller = JobController::new(
        db.clone(),
        Arc::new(analyzer),
        config.default_detection_threshold,
    );

    let state = AppState {
        db,
        controller: controller.clone(),
    };

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    server::serve(&config, state, listener, shutdown_signal()).await?;

    info!("Waiting for the running job to wind down");
    if tokio::time::timeout(SHUTDOWN_GRACE, controller.shutdown())
        .await
        .is_err()
    {
        error!("Job did not finish within {SHUTDOWN_GRACE:?}; its session will be recovered on next start");
    }

    info!("vlrscout stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
