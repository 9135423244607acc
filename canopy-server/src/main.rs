use std::sync::Arc;

use canopy_collab::RoomRegistry;
use canopy_server::config::init_logging;
use canopy_server::{router, AppState, ServerConfig};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    let registry = Arc::new(RoomRegistry::new(
        config.persistence()?,
        config.registry_config(),
    ));
    registry.start();

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    log::info!("canopy server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(registry.clone())))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.stop().await;
    log::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("shutdown requested");
}
