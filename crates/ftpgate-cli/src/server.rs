//! Server startup and lifecycle

use crate::{AppState, GatewayConfig, routes};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Run the gateway server
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    run_server_with_shutdown(config, std::future::pending()).await
}

/// Run server with graceful shutdown
pub async fn run_server_with_shutdown(
    config: GatewayConfig,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    // Create application state; the backend connects on first request
    let state = Arc::new(AppState::new(config.clone()));
    let app = routes::create_router(Arc::clone(&state));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("ftpgate listening on http://{}", addr);
    info!("Serving ftp://{}:{}", config.ftp_host, config.ftp_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    state.backend.disconnect().await;
    info!("Gateway shutdown complete");

    Ok(())
}
