//! Runner API routes and listener

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::RunnerError;
use crate::server::handlers::{
    deploy_handler, deployments_handler, health_handler, logs_handler, stats_handler,
    stop_handler, stream_logs_handler, version_handler,
};
use crate::server::state::ServerState;

/// Routes of the runner API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route("/deploy", post(deploy_handler))
        .route("/stop/{id}", post(stop_handler))
        .route("/deployments", get(deployments_handler))
        // Observation
        .route("/logs/{id}", get(logs_handler))
        .route("/logs/{id}/stream", get(stream_logs_handler))
        .route("/stats/{id}", get(stats_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and serve in a background task until `shutdown_signal`
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), RunnerError>>, RunnerError> {
    let addr = format!("{}:{}", options.host, options.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RunnerError::ServerError(format!("bind {addr}: {e}")))?;

    // Port 0 resolves here
    match listener.local_addr() {
        Ok(local) => info!("Runner API listening on {}", local),
        Err(_) => info!("Runner API listening on {}", addr),
    }

    let app = router(state);
    Ok(tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| RunnerError::ServerError(e.to_string()))
    }))
}
