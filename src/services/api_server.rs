use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{create_router, AppState};
use crate::bridge::Bridge;
use crate::config::AppConfig;
use crate::error::{BridgeError, Result};
use crate::services::CommandSweeper;

/// Start the API server and the background sweeper; returns after a graceful shutdown
pub async fn start_api_server(config: &AppConfig, bridge: Bridge) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| BridgeError::Validation(format!("invalid listen address: {e}")))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = if config.queue.sweep_interval_secs > 0 {
        let sweeper = CommandSweeper::new(
            bridge.clone(),
            Duration::from_secs(config.queue.sweep_interval_secs),
        );
        Some(tokio::spawn(sweeper.run(shutdown_rx)))
    } else {
        None
    };

    let app = create_router(AppState::new(bridge));

    let listener = TcpListener::bind(addr).await?;
    info!("🚀 MT5 bridge listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            warn!("Sweeper task ended abnormally: {}", e);
        }
    }

    info!("MT5 bridge stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
