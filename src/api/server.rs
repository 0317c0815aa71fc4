use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{info, warn};

use super::{
    services::{
        clear_logs, close_session, count_logs, delete_domain, delete_logs, get_log, health,
        list_logs, list_sessions, navigate_session, storage_cleanup, storage_recommendations,
        storage_status, storage_usage, submit_log,
    },
    state::AppState,
};
use crate::config::Config;
use crate::service::LogService;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/logs",
            post(submit_log).get(list_logs).delete(clear_logs),
        )
        .route("/logs/count", get(count_logs))
        .route("/logs/delete", post(delete_logs))
        .route("/logs/{id}", get(get_log))
        .route("/domains/{domain}", delete(delete_domain))
        .route("/storage/usage", get(storage_usage))
        .route("/storage/status", get(storage_status))
        .route("/storage/recommendations", get(storage_recommendations))
        .route("/storage/cleanup", post(storage_cleanup))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{context_id}/close", post(close_session))
        .route("/sessions/{context_id}/navigate", post(navigate_session))
        .route("/health", get(health))
        .with_state(state)
        // Capture clients may gzip large batches of console output
        .layer(RequestDecompressionLayer::new())
}

/// Open the store, serve until a shutdown signal, then drain and persist.
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    info!(path = %config.server.data_path.display(), "Opening log store");
    let service = Arc::new(
        LogService::from_config(&config)
            .map_err(|e| format!("Failed to open log store: {}", e))?,
    );

    let sweeper = service.spawn_session_sweeper(
        config.sessions.sweep_interval(),
        config.sessions.max_idle_ms(),
    );

    let app = router(AppState::new(config, Arc::clone(&service)));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "logkeep listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    service.shutdown().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
