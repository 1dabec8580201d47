//! Scheduled store maintenance.
//!
//! Each run applies the age rule to every volatile thread and prunes the durable
//! store by the configured retention policy.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::checkpoint::{CheckpointStore, CleanupReport, PruneReport, VolatileCheckpointStore};
use crate::config::MaintenanceConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub volatile: CleanupReport,
    /// `None` when pruning failed; see `durable_error`.
    pub durable: Option<PruneReport>,
    pub durable_error: Option<String>,
}

pub struct MaintenanceJob {
    volatile: Arc<VolatileCheckpointStore>,
    durable: Arc<dyn CheckpointStore>,
    config: MaintenanceConfig,
}

impl MaintenanceJob {
    pub fn new(
        volatile: Arc<VolatileCheckpointStore>,
        durable: Arc<dyn CheckpointStore>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            volatile,
            durable,
            config,
        }
    }

    pub async fn run_once(&self) -> MaintenanceReport {
        let volatile = self.volatile.cleanup_all();

        let policy = self.config.retention_policy();
        let (durable, durable_error) = match self.durable.prune(&policy).await {
            Ok(report) => (Some(report), None),
            Err(e) => {
                tracing::warn!(error = %e, "Durable checkpoint pruning failed");
                (None, Some(e.to_string()))
            }
        };

        tracing::info!(
            volatile_removed = volatile.checkpoints_removed,
            durable_removed = durable.as_ref().map(|r| r.checkpoints_removed),
            dry_run = policy.dry_run,
            "Checkpoint maintenance finished"
        );

        MaintenanceReport {
            volatile,
            durable,
            durable_error,
        }
    }

    /// Run every `interval_secs` until shutdown. Returns immediately when disabled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Checkpoint maintenance disabled");
            return;
        }

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Checkpoint maintenance shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointConfig, FileCheckpointStore};
    use crate::lifecycle::Shutdown;
    use futures_util::TryStreamExt;
    use serde_json::json;

    async fn seed(store: &dyn CheckpointStore, thread: &str, count: usize) {
        for step in 0..count {
            store
                .put(
                    &CheckpointConfig::thread(thread),
                    json!({ "step": step }),
                    Default::default(),
                    Default::default(),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_once_prunes_durable_store() {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(FileCheckpointStore::open(dir.path()).await.unwrap());
        seed(durable.as_ref(), "t1", 5).await;

        let job = MaintenanceJob::new(
            Arc::new(VolatileCheckpointStore::with_limits(10, 24)),
            durable.clone(),
            MaintenanceConfig {
                max_per_thread: 2,
                ..MaintenanceConfig::default()
            },
        );
        let report = job.run_once().await;
        let pruned = report.durable.unwrap();
        assert_eq!(pruned.checkpoints_removed, 3);
        assert!(report.durable_error.is_none());

        let remaining: Vec<_> = durable
            .list(&CheckpointConfig::thread("t1"), Default::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_job_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(FileCheckpointStore::open(dir.path()).await.unwrap());
        let job = MaintenanceJob::new(
            Arc::new(VolatileCheckpointStore::with_limits(10, 24)),
            durable,
            MaintenanceConfig {
                enabled: false,
                ..MaintenanceConfig::default()
            },
        );
        let shutdown = Shutdown::new();
        time::timeout(Duration::from_secs(1), job.run(shutdown.subscribe()))
            .await
            .unwrap();
    }
}
