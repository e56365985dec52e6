//! Graceful Shutdown Handler
//!
//! Handles OS signals and tears down the service registry.

use super::{CompositeReport, ProgressMonitor, ServiceRegistry};
use std::sync::Arc;
use tokio::signal;

/// Handles graceful shutdown of the process
///
/// ShutdownHandler listens for OS signals (SIGTERM, SIGINT) and stops then
/// terminates every component of the registry.
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::{ServiceRegistry, ShutdownHandler};
/// use std::sync::Arc;
///
/// let registry = Arc::new(registry);
/// let shutdown_handler = ShutdownHandler::new(Arc::clone(&registry));
///
/// tokio::spawn(async move {
///     shutdown_handler.wait_for_shutdown().await;
///     std::process::exit(0);
/// });
/// ```
pub struct ShutdownHandler {
    registry: Arc<ServiceRegistry>,
}

impl ShutdownHandler {
    /// Create a new ShutdownHandler
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Wait for a shutdown signal and perform graceful shutdown
    pub async fn wait_for_shutdown(&self) -> Vec<CompositeReport> {
        shutdown_signal().await;
        self.shutdown().await
    }

    /// Tear down the registry without waiting for a signal
    pub async fn shutdown(&self) -> Vec<CompositeReport> {
        tracing::info!("Starting graceful shutdown...");

        let monitor = ProgressMonitor::single(
            format!("Shut down {}", self.registry.name()),
            self.registry.name(),
        );
        let reports = self.registry.shutdown(&monitor).await;

        let failures: usize = reports.iter().map(|r| r.failures.len()).sum();
        if failures > 0 {
            tracing::warn!("Graceful shutdown complete with {} failed step(s)", failures);
        } else {
            tracing::info!("Graceful shutdown complete");
        }
        reports
    }
}

/// Create a future that completes when a shutdown signal is received
///
/// If a signal handler cannot be installed the corresponding branch never
/// completes.
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         tracing::info!("Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleComponent, LifecycleStatus};
    use crate::testing::RecordingComponent;

    #[tokio::test]
    async fn test_shutdown_tears_down_registry() {
        let component = Arc::new(RecordingComponent::new("api"));
        let registry = Arc::new(
            ServiceRegistry::builder()
                .name("test")
                .register(component.clone(), true)
                .build(),
        );
        registry
            .boot(&Arc::new(ProgressMonitor::single("Boot", "test")))
            .await
            .unwrap();

        let reports = ShutdownHandler::new(Arc::clone(&registry)).shutdown().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(component.status(), LifecycleStatus::Terminated);
    }
}
