//! Recovery probes.
//!
//! # Responsibilities
//! - Check whether a degraded component is reachable again
//! - Perform the component-specific step that completes recovery (e.g. store reset)
//!
//! # Design Decisions
//! - Probes carry no timeout of their own; the registry bounds every call
//! - A probe only reports; the registry turns the result into an `update_status`

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::checkpoint::FailoverCheckpointStore;
use crate::resilience::timeouts::TimeoutError;

/// Why a probe did not confirm recovery.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

impl From<TimeoutError> for ProbeError {
    fn from(err: TimeoutError) -> Self {
        ProbeError::Timeout(err.0)
    }
}

/// A short connectivity check for one component.
#[async_trait]
pub trait RecoveryProbe: Send + Sync {
    async fn probe(&self) -> Result<(), ProbeError>;
}

/// Succeeds when a TCP connection to `address` can be opened.
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    address: String,
}

impl TcpConnectProbe {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl RecoveryProbe for TcpConnectProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        match TcpStream::connect(&self.address).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::debug!(address = %self.address, error = %e, "Connectivity probe failed");
                Err(ProbeError::Failed(format!("connect {}: {}", self.address, e)))
            }
        }
    }
}

/// Confirms the durable checkpoint backend and routes the failover store back to it.
pub struct CheckpointStoreProbe {
    store: Arc<FailoverCheckpointStore>,
}

impl CheckpointStoreProbe {
    pub fn new(store: Arc<FailoverCheckpointStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecoveryProbe for CheckpointStoreProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        self.store
            .probe_durable()
            .await
            .map_err(|e| ProbeError::Failed(e.to_string()))?;
        // Only reached once the durable read succeeded.
        self.store.reset();
        Ok(())
    }
}

/// Adapts an async closure into a probe, for externally supplied clients.
pub struct FnProbe<F>(F);

impl<F, Fut> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> RecoveryProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProbeError>> + Send,
{
    async fn probe(&self) -> Result<(), ProbeError> {
        (self.0)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::VolatileCheckpointStore;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(TcpConnectProbe::new(addr.to_string()).probe().await.is_ok());

        drop(listener);
        assert!(TcpConnectProbe::new(addr.to_string()).probe().await.is_err());
    }

    #[tokio::test]
    async fn test_store_probe_resets_failover() {
        let durable = Arc::new(VolatileCheckpointStore::with_limits(10, 24));
        let store = Arc::new(FailoverCheckpointStore::with_threshold(
            durable,
            Arc::new(VolatileCheckpointStore::with_limits(10, 24)),
            3,
            true,
        ));
        assert!(!store.is_degraded());

        CheckpointStoreProbe::new(store.clone()).probe().await.unwrap();
        assert!(!store.is_degraded());
        assert_eq!(store.status().failure_count, 0);
    }

    #[tokio::test]
    async fn test_fn_probe() {
        let probe = FnProbe::new(|| async { Err::<(), _>(ProbeError::Failed("worker pool empty".into())) });
        let err = probe.probe().await.unwrap_err();
        assert_eq!(err.to_string(), "worker pool empty");
    }
}
