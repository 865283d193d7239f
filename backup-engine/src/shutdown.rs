//! Interrupt handling for SIGINT and SIGTERM.
//!
//! Ensures that:
//! - No new file task is dispatched once a signal arrives
//! - Tasks already running are allowed to finish their file
//! - The run ends without persisting a manifest

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token observed by the executor and its worker pool
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the run as if a signal had arrived
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Spawn a task that cancels the token on the first SIGINT/SIGTERM
    pub fn listen(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.wait_for_signal().await;
        })
    }

    /// Wait for shutdown signal (SIGTERM or SIGINT), then cancel
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
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
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), finishing in-flight files...");
            }
            _ = terminate => {
                info!("Received SIGTERM, finishing in-flight files...");
            }
            _ = self.token.cancelled() => {
                return;
            }
        }

        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_token() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        assert!(!coordinator.is_interrupted());

        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });

        coordinator.trigger();
        handle.await.unwrap();
        assert!(coordinator.is_interrupted());
    }

    #[tokio::test]
    async fn test_listener_exits_when_cancelled_elsewhere() {
        let coordinator = ShutdownCoordinator::new();
        let listener = coordinator.listen();

        coordinator.trigger();
        listener.await.unwrap();
    }
}
