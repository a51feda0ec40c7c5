use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Resolves on the first SIGINT or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to install SIGTERM handler, only SIGINT will stop the service: {e}");
            match ctrl_c.await {
                Ok(()) => info!("Received SIGINT"),
                Err(e) => {
                    error!("Failed to listen for SIGINT: {e}");
                    std::future::pending::<()>().await;
                }
            }
            return;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}
