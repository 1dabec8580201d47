//! The checkpoint store contract shared by the durable and volatile backends.
//!
//! # Responsibilities
//! - Persist immutable checkpoints per thread with a parent link
//! - Resolve exact or newest checkpoints
//! - Stream history newest-first
//!
//! # Design Decisions
//! - Backends only report failures; falling back is the wrapper's job
//! - A missing thread/checkpoint is `Ok(None)`, never an error
//! - Concurrent `put`s on one thread must be serialized by the caller

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::checkpoint::types::{
    BackendKind, ChannelVersions, CheckpointConfig, CheckpointData, CheckpointMetadata,
    CheckpointTuple, ListOptions, PendingWrite, PutReceipt,
};

/// Errors raised by checkpoint backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend reachable in principle but the call failed (retryable).
    #[error("checkpoint backend failure: {0}")]
    Transient(String),

    /// Filesystem or socket error from the backend.
    #[error("checkpoint backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be decoded.
    #[error("corrupt checkpoint record {location}: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    /// Caller bug, e.g. a call without thread_id.
    #[error("invalid checkpoint call: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Whether this error says something about backend health.
    ///
    /// Configuration errors are the caller's fault and never count as failures.
    pub fn is_backend_failure(&self) -> bool {
        !matches!(self, StoreError::Configuration(_))
    }
}

/// Result type for checkpoint operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Lazy, newest-first stream of checkpoints.
pub type CheckpointStream = BoxStream<'static, StoreResult<CheckpointTuple>>;

/// Retention rules applied by `prune`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Drop checkpoints older than this many days.
    pub retention_days: u32,
    /// Keep at most this many newest checkpoints per thread.
    pub max_per_thread: usize,
    /// Report what would be removed without removing it.
    pub dry_run: bool,
}

/// Outcome of a `prune` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub threads_scanned: usize,
    pub checkpoints_removed: usize,
    pub threads_removed: usize,
    pub dry_run: bool,
}

/// Operation set implemented by every checkpoint backend.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Which kind of backend this is.
    fn kind(&self) -> BackendKind;

    /// Store a new checkpoint as the newest of `config.thread_id`.
    async fn put(
        &self,
        config: &CheckpointConfig,
        payload: Value,
        metadata: CheckpointMetadata,
        versions: ChannelVersions,
    ) -> StoreResult<PutReceipt>;

    /// Exact checkpoint if `config.checkpoint_id` is set, else the thread's newest.
    async fn get(&self, config: &CheckpointConfig) -> StoreResult<Option<CheckpointData>>;

    /// Whether `get_with_lineage` returns real parent links.
    fn supports_lineage(&self) -> bool {
        false
    }

    /// Like `get`, plus the parent's address.
    async fn get_with_lineage(
        &self,
        config: &CheckpointConfig,
    ) -> StoreResult<Option<CheckpointTuple>> {
        let data = self.get(config).await?;
        Ok(data.map(|data| without_lineage(config, data)))
    }

    /// Newest-first history of a thread.
    async fn list(
        &self,
        config: &CheckpointConfig,
        options: ListOptions,
    ) -> StoreResult<CheckpointStream>;

    /// Record pending writes for an in-flight checkpoint task.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<PendingWrite>,
        task_id: &str,
    ) -> StoreResult<()>;

    /// Next version token for a channel.
    fn next_version(&self, current: Option<&str>, _channel: &str) -> String {
        next_version(current)
    }

    /// Apply retention rules. Backends without retention report nothing removed.
    async fn prune(&self, policy: &RetentionPolicy) -> StoreResult<PruneReport> {
        Ok(PruneReport {
            dry_run: policy.dry_run,
            ..PruneReport::default()
        })
    }
}

/// Wrap a plain `get` result as a tuple with no parent link.
pub fn without_lineage(config: &CheckpointConfig, data: CheckpointData) -> CheckpointTuple {
    CheckpointTuple {
        config: config.clone(),
        payload: data.payload,
        metadata: data.metadata,
        parent_config: None,
    }
}

/// "1" when `current` is absent or unparseable, otherwise `current + 1`.
pub fn next_version(current: Option<&str>) -> String {
    current
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(1, |v| v.saturating_add(1))
        .to_string()
}
