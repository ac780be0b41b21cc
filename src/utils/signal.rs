//! Shutdown signal handling for the HTTP server loop

use tokio::signal;
use tracing::{info, warn};

/// Wait for a termination signal (SIGTERM, SIGINT, or Ctrl+C)
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                signal::ctrl_c().await.ok();
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down services");
            }
            _ = signal::ctrl_c() => {
                info!("Received interrupt, shutting down services");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down services");
    }
}
