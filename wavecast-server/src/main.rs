//! Wavecast server entry point.

mod cli;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use wavecast_core::session::manager::{spawn_reaper, SessionManager};

use cli::Settings;
use state::AppState;

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/audio/:session_id/stream", get(routes::ws::stream_handler))
        .route("/audio/:session_id/info", get(routes::rest::session_info))
        .route("/audio/:session_id/transcript", get(routes::rest::session_transcript))
        .route("/transcribe", post(routes::rest::transcribe_file))
        .route("/health", get(routes::rest::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wavecast=info".parse().unwrap()),
        )
        .init();

    let settings = Settings::parse();
    info!(
        bind_addr = %settings.bind_addr,
        session_max_age_secs = settings.session_max_age_secs,
        reap_interval_secs = settings.reap_interval_secs,
        "wavecast-server starting"
    );

    let sessions = Arc::new(SessionManager::new(settings.session_max_age()));
    let reaper = spawn_reaper(sessions.clone(), settings.reap_interval());

    let app_state = AppState::new(sessions);
    let app = build_router(app_state.clone());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!(addr = %settings.bind_addr, "listening");

    let grace_period = settings.shutdown_grace_period();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    shutdown_dispatchers(&app_state, grace_period).await;
    info!(?grace_period, "wavecast-server shut down");
    Ok(())
}

/// Cancel and await every live session's dispatcher task, bounded by
/// `grace_period` so a stuck recognizer call can't hang the process on exit.
async fn shutdown_dispatchers(state: &AppState, grace_period: std::time::Duration) {
    let handles: Vec<_> = state.dispatchers.lock().drain().collect();
    if handles.is_empty() {
        return;
    }
    info!(count = handles.len(), "cancelling dispatcher tasks");
    let shutdowns = handles
        .into_iter()
        .map(|(_, handle)| handle.shutdown(grace_period));
    futures_util::future::join_all(shutdowns).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
