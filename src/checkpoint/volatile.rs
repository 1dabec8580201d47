//! In-process checkpoint backend used while the durable store is unhealthy.
//!
//! # Responsibilities
//! - Keep per-thread checkpoint history in memory
//! - Bound memory with count and age eviction
//! - Answer the full checkpoint contract, lineage included
//!
//! # Design Decisions
//! - One mutex per store; correctness over throughput
//! - Pending writes are not kept (they fold into the next `put`)
//! - Contents are lost on restart, and history written before failover is not rebuilt

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::checkpoint::store::{
    CheckpointStore, CheckpointStream, PruneReport, RetentionPolicy, StoreError, StoreResult,
};
use crate::checkpoint::types::{
    BackendKind, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointData, CheckpointId,
    CheckpointMetadata, CheckpointTuple, ListOptions, PendingWrite, PutReceipt,
};
use crate::config::VolatileConfig;
use crate::observability::metrics;

/// Result of a `cleanup_all` sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub checkpoints_removed: usize,
    pub threads_removed: usize,
}

/// Point-in-time size of the volatile store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolatileStats {
    pub threads: usize,
    pub checkpoints: usize,
    pub max_per_thread: usize,
    pub max_age_hours: u64,
}

/// Memory-only checkpoint backend.
#[derive(Debug)]
pub struct VolatileCheckpointStore {
    /// thread_id -> checkpoints, oldest first.
    threads: Mutex<HashMap<String, Vec<Checkpoint>>>,
    max_per_thread: usize,
    max_age_hours: u64,
}

impl VolatileCheckpointStore {
    pub fn new(config: &VolatileConfig) -> Self {
        Self::with_limits(config.max_per_thread, config.max_age_hours)
    }

    pub fn with_limits(max_per_thread: usize, max_age_hours: u64) -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            max_per_thread: max_per_thread.max(1),
            max_age_hours,
        }
    }

    /// `None` when the configured age is past what the clock can represent.
    fn max_age(&self) -> Option<TimeDelta> {
        i64::try_from(self.max_age_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
    }

    /// Store a checkpoint as if the clock read `now`.
    pub(crate) fn insert_at(
        &self,
        config: &CheckpointConfig,
        payload: Value,
        metadata: CheckpointMetadata,
        versions: ChannelVersions,
        now: DateTime<Utc>,
    ) -> StoreResult<PutReceipt> {
        let thread_id = config.validate()?;
        let cutoff = age_cutoff(now, self.max_age());

        let mut threads = self.threads.lock();
        let history = threads.entry(thread_id.to_string()).or_default();

        let parent = history.last().map(|c| c.checkpoint_id);
        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            checkpoint_id: CheckpointId::next_after(parent),
            parent_checkpoint_id: parent,
            payload,
            metadata,
            versions,
            created_at: now,
        };
        let receipt = PutReceipt {
            config: checkpoint.config(),
            parent: checkpoint.parent_config(),
            backend: BackendKind::Volatile,
        };
        history.push(checkpoint);

        let evicted = evict(history, self.max_per_thread, cutoff);
        let checkpoints: usize = threads.values().map(Vec::len).sum();
        drop(threads);

        metrics::record_volatile_size(checkpoints);
        if evicted > 0 {
            tracing::debug!(thread_id, evicted, "Evicted volatile checkpoints");
        }
        Ok(receipt)
    }

    /// Apply the age rule to every thread and drop threads left empty.
    pub fn cleanup_all(&self) -> CleanupReport {
        self.cleanup_all_at(Utc::now())
    }

    /// `cleanup_all` as if the clock read `now`.
    pub fn cleanup_all_at(&self, now: DateTime<Utc>) -> CleanupReport {
        let cutoff = age_cutoff(now, self.max_age());
        let mut report = CleanupReport::default();

        let mut threads = self.threads.lock();
        threads.retain(|_, history| {
            let before = history.len();
            if let Some(cutoff) = cutoff {
                history.retain(|c| c.created_at >= cutoff);
            }
            report.checkpoints_removed += before - history.len();
            if history.is_empty() {
                report.threads_removed += 1;
                false
            } else {
                true
            }
        });
        let checkpoints: usize = threads.values().map(Vec::len).sum();
        drop(threads);

        metrics::record_volatile_size(checkpoints);
        if report.checkpoints_removed > 0 {
            tracing::info!(
                checkpoints_removed = report.checkpoints_removed,
                threads_removed = report.threads_removed,
                "Volatile checkpoint cleanup"
            );
        }
        report
    }

    pub fn stats(&self) -> VolatileStats {
        let threads = self.threads.lock();
        VolatileStats {
            threads: threads.len(),
            checkpoints: threads.values().map(Vec::len).sum(),
            max_per_thread: self.max_per_thread,
            max_age_hours: self.max_age_hours,
        }
    }

    /// Threads currently held in memory.
    pub fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn find(&self, config: &CheckpointConfig) -> StoreResult<Option<Checkpoint>> {
        let thread_id = config.validate()?;
        let threads = self.threads.lock();
        let Some(history) = threads.get(thread_id) else {
            return Ok(None);
        };
        let found = match config.checkpoint_id {
            Some(id) => history.iter().find(|c| c.checkpoint_id == id),
            None => history.last(),
        };
        Ok(found.cloned())
    }
}

/// Oldest creation time still kept, or `None` when nothing is old enough to expire.
fn age_cutoff(now: DateTime<Utc>, max_age: Option<TimeDelta>) -> Option<DateTime<Utc>> {
    max_age.and_then(|age| now.checked_sub_signed(age))
}

/// Drop checkpoints beyond the newest `max_per_thread` and any older than `cutoff`.
fn evict(
    history: &mut Vec<Checkpoint>,
    max_per_thread: usize,
    cutoff: Option<DateTime<Utc>>,
) -> usize {
    let before = history.len();
    if history.len() > max_per_thread {
        let excess = history.len() - max_per_thread;
        history.drain(..excess);
    }
    if let Some(cutoff) = cutoff {
        history.retain(|c| c.created_at >= cutoff);
    }
    before - history.len()
}

#[async_trait]
impl CheckpointStore for VolatileCheckpointStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Volatile
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        payload: Value,
        metadata: CheckpointMetadata,
        versions: ChannelVersions,
    ) -> StoreResult<PutReceipt> {
        self.insert_at(config, payload, metadata, versions, Utc::now())
    }

    async fn get(&self, config: &CheckpointConfig) -> StoreResult<Option<CheckpointData>> {
        Ok(self.find(config)?.map(|c| c.to_data()))
    }

    fn supports_lineage(&self) -> bool {
        true
    }

    async fn get_with_lineage(
        &self,
        config: &CheckpointConfig,
    ) -> StoreResult<Option<CheckpointTuple>> {
        Ok(self.find(config)?.map(Checkpoint::into_tuple))
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        options: ListOptions,
    ) -> StoreResult<CheckpointStream> {
        let thread_id = config.validate()?;
        let page: Vec<StoreResult<CheckpointTuple>> = {
            let threads = self.threads.lock();
            threads
                .get(thread_id)
                .map(|history| {
                    history
                        .iter()
                        .rev()
                        .filter(|c| options.admits(&c.checkpoint_id))
                        .take(options.take())
                        .map(|c| Ok(c.to_tuple()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(stream::iter(page).boxed())
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<PendingWrite>,
        task_id: &str,
    ) -> StoreResult<()> {
        config.validate()?;
        if config.checkpoint_id.is_none() {
            return Err(StoreError::Configuration(
                "put_writes requires a checkpoint_id".to_string(),
            ));
        }
        tracing::trace!(task_id, writes = writes.len(), "Volatile store ignores pending writes");
        Ok(())
    }

    async fn prune(&self, policy: &RetentionPolicy) -> StoreResult<PruneReport> {
        let retention = TimeDelta::try_days(i64::from(policy.retention_days));
        let cutoff = age_cutoff(Utc::now(), retention);
        let mut report = PruneReport {
            dry_run: policy.dry_run,
            ..PruneReport::default()
        };

        let mut threads = self.threads.lock();
        report.threads_scanned = threads.len();
        if policy.dry_run {
            for history in threads.values() {
                let mut kept = history.clone();
                let removed = evict(&mut kept, policy.max_per_thread.max(1), cutoff);
                report.checkpoints_removed += removed;
                if kept.is_empty() {
                    report.threads_removed += 1;
                }
            }
            return Ok(report);
        }

        threads.retain(|_, history| {
            report.checkpoints_removed += evict(history, policy.max_per_thread.max(1), cutoff);
            if history.is_empty() {
                report.threads_removed += 1;
                false
            } else {
                true
            }
        });
        let checkpoints: usize = threads.values().map(Vec::len).sum();
        drop(threads);

        metrics::record_volatile_size(checkpoints);
        Ok(report)
    }
}
