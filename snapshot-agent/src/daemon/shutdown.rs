//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! On shutdown every active run is cancelled. A cancelled run stops at its
//! next stage boundary or poll, leaving manifest and snapshot in place for
//! the next startup recovery.

use crate::executor::RunTracker;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shutdown coordinator
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled once shutdown starts
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for shutdown signal (SIGTERM or SIGINT)
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = self.token.cancelled() => {}
        }

        self.token.cancel();
    }

    /// Cancel active runs and wait up to `grace` for them to stop
    pub async fn shutdown(&self, runs: &RunTracker, grace: Duration) {
        info!("Graceful shutdown initiated");
        self.token.cancel();
        runs.cancel_all();

        let deadline = tokio::time::Instant::now() + grace;
        while runs.running_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("{} backup runs still active at shutdown", runs.running_count());
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!("Graceful shutdown complete");
    }
}
