//! rampart demo server entry point
//!
//! Reads configuration from the environment, builds the shared state and
//! serves until Ctrl-C.

use std::net::SocketAddr;

use rampart_api::{create_router, init_tracing, ApiConfig, ApiError, ApiResult, AppState, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let config = ApiConfig::from_env()?;
    let addr = config.bind_addr;
    let state = AppState::new(config).await?;
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "Starting rampart server");

    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.shutdown().await;
    served.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
