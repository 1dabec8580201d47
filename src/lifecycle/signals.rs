//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM or SIGINT
//! - Hand control back so the caller can trigger shutdown
//! - Reset the recovery attempt budget on SIGHUP
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A failed handler registration is logged and that signal is ignored

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::health::ComponentHealthRegistry;

/// Resolve once the process is asked to stop.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }
}

/// Reset the recovery attempt budget on every SIGHUP until shutdown.
pub async fn reset_recovery_on_hangup(
    registry: Arc<ComponentHealthRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGHUP");
                let _ = shutdown.recv().await;
                return;
            }
        };
        loop {
            tokio::select! {
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    tracing::info!("SIGHUP received; resetting recovery attempts");
                    registry.reset_recovery_attempts();
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = registry;
        let _ = shutdown.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::lifecycle::Shutdown;

    #[tokio::test]
    async fn test_hangup_listener_exits_on_shutdown() {
        let registry = Arc::new(ComponentHealthRegistry::with_limits(3, Duration::from_millis(100)));
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(reset_recovery_on_hangup(registry, shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
