//! Graceful shutdown handling for sonkend.
//!
//! Stops every sampler and closes the state database when the daemon
//! receives SIGTERM or SIGINT.

use sonken_core::{MonitorManager, StateManager};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Manages graceful shutdown of the daemon.
pub struct ShutdownManager {
    manager: Arc<MonitorManager>,
    state: Arc<StateManager>,
    /// Upper bound for in-flight sampler ticks to finish
    graceful_timeout: Duration,
}

impl ShutdownManager {
    pub fn new(manager: Arc<MonitorManager>, state: Arc<StateManager>) -> Self {
        Self { manager, state, graceful_timeout: Duration::from_secs(30) }
    }

    /// Stop all monitoring, then close the state database.
    pub async fn shutdown(&self) {
        info!("Starting graceful shutdown...");

        let active = self.manager.active_project_ids().await;
        if active.is_empty() {
            info!("No projects under monitoring");
        } else {
            info!("Stopping monitoring for {} project(s)...", active.len());
        }

        if tokio::time::timeout(self.graceful_timeout, self.manager.stop_all()).await.is_err() {
            warn!("Samplers did not stop within {:?}", self.graceful_timeout);
        }

        self.state.close().await;
        info!("Graceful shutdown complete");
    }
}

/// Create a token that is cancelled on SIGTERM or SIGINT.
pub fn shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
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
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate => {
                info!("Received SIGTERM");
            }
        }

        trigger.cancel();
    });

    token
}
