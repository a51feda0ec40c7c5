use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use common_metrics::{bind, serve, setup_metrics_routes};
use futures::future::ready;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ModerationError;
use crate::moderation::{DecisionEngine, ModerationPolicy};
use crate::pipeline::run_pipeline;
use crate::signals::wait_for_shutdown_signal;

pub async fn index() -> &'static str {
    "comment moderation service"
}

pub fn router(metrics_path: &str) -> Result<Router, ModerationError> {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(|| ready("ok")));

    Ok(setup_metrics_routes(router, metrics_path)?)
}

async fn run_metrics_server(
    config: Config,
    cancel: CancellationToken,
) -> Result<(), ModerationError> {
    let router = router(&config.metrics_path)?;
    let address = config.bind_address();
    let listener = bind(&address)
        .await
        .map_err(|error| ModerationError::BindError {
            address: address.clone(),
            error,
        })?;

    info!("Serving metrics on {}{}", address, config.metrics_path);
    serve(router, listener, cancel.cancelled_owned())
        .await
        .map_err(ModerationError::ServeError)
}

/// Runs the metrics endpoint and the moderation pipeline side by side, and
/// stops both when asked to or when either of them fails.
pub struct ModerationService {
    config: Config,
    engine: Arc<DecisionEngine>,
}

impl ModerationService {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engine: Arc::new(DecisionEngine::default()),
        }
    }

    /// Replace the default random policy
    pub fn with_policy(mut self, policy: Box<dyn ModerationPolicy>) -> Self {
        self.engine = Arc::new(DecisionEngine::new(policy));
        self
    }

    pub fn engine(&self) -> Arc<DecisionEngine> {
        self.engine.clone()
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(self) {
        self.run_with_shutdown(wait_for_shutdown_signal()).await
    }

    /// Run the service with a custom shutdown signal (useful for testing)
    pub async fn run_with_shutdown(self, shutdown: impl Future<Output = ()>) {
        info!("Starting comment moderation service");
        let cancel = CancellationToken::new();

        let metrics_task = tokio::spawn(cancel_on_error(
            cancel.clone(),
            run_metrics_server(self.config.clone(), cancel.clone()),
        ));
        let pipeline_task = tokio::spawn(cancel_on_error(
            cancel.clone(),
            run_pipeline(self.config.clone(), self.engine.clone(), cancel.clone()),
        ));

        tokio::select! {
            _ = shutdown => info!("Shutdown requested"),
            _ = cancel.cancelled() => warn!("A subsystem failed, shutting down"),
        }
        cancel.cancel();

        let timeout = self.config.shutdown_timeout();
        wait_for_task("Metrics server", metrics_task, timeout).await;
        wait_for_task("Pipeline", pipeline_task, timeout).await;

        info!(
            passed = self.engine.passed(),
            failed = self.engine.failed(),
            "Comment moderation service stopped"
        );
    }
}

async fn cancel_on_error<F>(cancel: CancellationToken, task: F) -> Result<(), ModerationError>
where
    F: Future<Output = Result<(), ModerationError>>,
{
    let result = task.await;
    if result.is_err() {
        cancel.cancel();
    }
    result
}

async fn wait_for_task(
    name: &str,
    handle: JoinHandle<Result<(), ModerationError>>,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(()))) => info!("{name} stopped normally"),
        Ok(Ok(Err(e))) => error!("{name} stopped with error: {e:#}"),
        Ok(Err(e)) => error!("{name} task panicked: {e:#}"),
        Err(_) => error!("{name} shutdown timed out after {timeout:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_on_error_cancels_only_on_failure() {
        let cancel = CancellationToken::new();
        cancel_on_error(cancel.clone(), async { Ok(()) })
            .await
            .unwrap();
        assert!(!cancel.is_cancelled());

        let result = cancel_on_error(cancel.clone(), async {
            Err(ModerationError::ServeError(std::io::Error::other("boom")))
        })
        .await;
        assert!(result.is_err());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_for_task_gives_up_after_timeout() {
        let stuck = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });

        let start = std::time::Instant::now();
        wait_for_task("Stuck", stuck, Duration::from_millis(50)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
