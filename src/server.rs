use std::future::Future;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use log::info;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::{commands, config::Config, AppState};

pub fn router(config: &Config, state: AppState) -> Router {
    Router::new()
        .route("/", get(commands::health))
        .route("/analyze", post(commands::start_analysis))
        .route("/stop", post(commands::stop_analysis))
        .route("/status", get(commands::get_status))
        .route("/rounds", get(commands::list_rounds))
        .route("/rounds/legacy", get(commands::list_latest_rounds))
        .route("/sessions", get(commands::list_sessions))
        .route("/sessions/:session_id", get(commands::get_session))
        .route("/sessions/:session_id/rounds", get(commands::get_session_rounds))
        .nest_service("/artifacts", ServeDir::new(config.sessions_dir()))
        .layer(if config.cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .with_state(state)
}

pub async fn serve<F>(config: &Config, state: AppState, listener: TcpListener, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(config, state))
        .with_graceful_shutdown(signal)
        .await
        .context("HTTP server error")
}
