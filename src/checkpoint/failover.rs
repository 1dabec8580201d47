//! Durable-to-volatile failover for the checkpoint store.
//!
//! # States
//! - Durable: every call tries the durable backend first
//! - Volatile: every call goes to the in-memory backend only
//!
//! # State Transitions
//! ```text
//! Durable → Volatile: consecutive durable failures >= failure_threshold
//! Volatile → Durable: explicit reset() after durable health is confirmed externally
//! ```
//!
//! # Design Decisions
//! - Sticky: no per-call re-probing while Volatile (avoids paying failure latency per call)
//! - A failed durable `put` is replayed on volatile before returning, so writes are never dropped
//! - Checkpoints written while Volatile are not migrated back on reset
//! - A put that lands in memory below the threshold stays readable: latest reads of that
//!   thread come from memory until the next durable put, and exact ids missing durably are
//!   looked up in memory
//! - Configuration errors never count as failures

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::checkpoint::store::{
    without_lineage, CheckpointStore, CheckpointStream, PruneReport, RetentionPolicy, StoreError,
    StoreResult,
};
use crate::checkpoint::types::{
    BackendKind, ChannelVersions, CheckpointConfig, CheckpointData, CheckpointMetadata,
    CheckpointTuple, ListOptions, PendingWrite, PutReceipt,
};
use crate::checkpoint::volatile::{VolatileCheckpointStore, VolatileStats};
use crate::config::StoreConfig;
use crate::observability::metrics;

/// Thread used by the no-op durable read in `probe_durable`.
pub const PROBE_THREAD_ID: &str = "health-probe";

/// Backend currently receiving traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveBackend {
    Durable,
    Volatile,
}

/// Snapshot reported to the health registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailoverStatus {
    pub is_degraded: bool,
    pub active_backend: ActiveBackend,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub fallback_enabled: bool,
    pub degraded_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub fallback_stats: VolatileStats,
}

#[derive(Debug)]
struct Routing {
    active: ActiveBackend,
    failure_count: u32,
    degraded_since: Option<DateTime<Utc>>,
    last_error: Option<String>,
    /// Threads whose newest checkpoint went to the volatile store.
    spilled: HashSet<String>,
}

/// Checkpoint store that fails over from a durable backend to a volatile one.
pub struct FailoverCheckpointStore {
    durable: Arc<dyn CheckpointStore>,
    volatile: Arc<VolatileCheckpointStore>,
    routing: Mutex<Routing>,
    failure_threshold: u32,
    fallback_enabled: bool,
    status_tx: watch::Sender<FailoverStatus>,
}

impl FailoverCheckpointStore {
    pub fn new(
        durable: Arc<dyn CheckpointStore>,
        volatile: Arc<VolatileCheckpointStore>,
        config: &StoreConfig,
    ) -> Self {
        Self::with_threshold(durable, volatile, config.failure_threshold, config.fallback_enabled)
    }

    pub fn with_threshold(
        durable: Arc<dyn CheckpointStore>,
        volatile: Arc<VolatileCheckpointStore>,
        failure_threshold: u32,
        fallback_enabled: bool,
    ) -> Self {
        let routing = Routing {
            active: ActiveBackend::Durable,
            failure_count: 0,
            degraded_since: None,
            last_error: None,
            spilled: HashSet::new(),
        };
        let failure_threshold = failure_threshold.max(1);
        let initial = FailoverStatus {
            is_degraded: false,
            active_backend: ActiveBackend::Durable,
            failure_count: 0,
            failure_threshold,
            fallback_enabled,
            degraded_since: None,
            last_error: None,
            fallback_stats: volatile.stats(),
        };
        let (status_tx, _) = watch::channel(initial);

        Self {
            durable,
            volatile,
            routing: Mutex::new(routing),
            failure_threshold,
            fallback_enabled,
            status_tx,
        }
    }

    /// Current routing and counters.
    pub fn status(&self) -> FailoverStatus {
        let routing = self.routing.lock();
        self.snapshot(&routing)
    }

    /// Receive a new [`FailoverStatus`] whenever routing or the failure count changes.
    pub fn subscribe(&self) -> watch::Receiver<FailoverStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_degraded(&self) -> bool {
        self.routing.lock().active == ActiveBackend::Volatile
    }

    /// The in-memory backend (for maintenance and inspection).
    pub fn fallback(&self) -> &Arc<VolatileCheckpointStore> {
        &self.volatile
    }

    /// The durable backend.
    pub fn durable(&self) -> &Arc<dyn CheckpointStore> {
        &self.durable
    }

    /// A no-op read against the durable backend, bypassing routing.
    ///
    /// Carries no timeout of its own; callers bound it.
    pub async fn probe_durable(&self) -> StoreResult<()> {
        self.durable
            .get(&CheckpointConfig::thread(PROBE_THREAD_ID))
            .await
            .map(|_| ())
    }

    /// Route back to the durable backend after its health was confirmed.
    ///
    /// Returns whether routing changed. Checkpoints written while degraded stay in
    /// the volatile store only.
    pub fn reset(&self) -> bool {
        let mut routing = self.routing.lock();
        let was_degraded = routing.active == ActiveBackend::Volatile;
        routing.active = ActiveBackend::Durable;
        routing.failure_count = 0;
        routing.degraded_since = None;
        routing.last_error = None;
        routing.spilled.clear();

        if was_degraded {
            let stranded = self.volatile.stats().threads;
            tracing::info!(
                stranded_threads = stranded,
                "Checkpoint store reset to durable backend; volatile checkpoints are not migrated"
            );
            metrics::record_store_degraded(false);
        }
        self.publish(&routing);
        was_degraded
    }

    fn snapshot(&self, routing: &Routing) -> FailoverStatus {
        FailoverStatus {
            is_degraded: routing.active == ActiveBackend::Volatile,
            active_backend: routing.active,
            failure_count: routing.failure_count,
            failure_threshold: self.failure_threshold,
            fallback_enabled: self.fallback_enabled,
            degraded_since: routing.degraded_since,
            last_error: routing.last_error.clone(),
            fallback_stats: self.volatile.stats(),
        }
    }

    fn publish(&self, routing: &Routing) {
        self.status_tx.send_replace(self.snapshot(routing));
    }

    /// The durable backend if calls should try it, `None` while degraded.
    fn durable_route(&self) -> Option<&dyn CheckpointStore> {
        match self.routing.lock().active {
            ActiveBackend::Durable => Some(self.durable.as_ref()),
            ActiveBackend::Volatile => None,
        }
    }

    fn is_spilled(&self, thread_id: &str) -> bool {
        self.routing.lock().spilled.contains(thread_id)
    }

    fn mark_spilled(&self, thread_id: &str, spilled: bool) {
        let mut routing = self.routing.lock();
        if spilled {
            routing.spilled.insert(thread_id.to_string());
        } else {
            routing.spilled.remove(thread_id);
        }
    }

    fn record_success(&self) {
        let mut routing = self.routing.lock();
        if routing.active == ActiveBackend::Durable && routing.failure_count > 0 {
            routing.failure_count = 0;
            routing.last_error = None;
            self.publish(&routing);
        }
    }

    /// Count a durable failure and decide whether the caller may fall back.
    ///
    /// Returns the error back when it must propagate.
    fn on_durable_failure(&self, op: &'static str, err: StoreError) -> StoreResult<()> {
        if !err.is_backend_failure() {
            return Err(err);
        }
        metrics::record_store_failure(op);

        let mut routing = self.routing.lock();
        routing.failure_count = routing.failure_count.saturating_add(1);
        routing.last_error = Some(err.to_string());

        let crossed = routing.failure_count >= self.failure_threshold;
        if crossed && self.fallback_enabled && routing.active == ActiveBackend::Durable {
            routing.active = ActiveBackend::Volatile;
            routing.degraded_since = Some(Utc::now());
            tracing::error!(
                op,
                failure_count = routing.failure_count,
                threshold = self.failure_threshold,
                error = %err,
                "Durable checkpoint backend failing; switching to volatile backend"
            );
            metrics::record_store_degraded(true);
        } else {
            tracing::warn!(
                op,
                failure_count = routing.failure_count,
                threshold = self.failure_threshold,
                error = %err,
                "Durable checkpoint backend call failed"
            );
        }
        self.publish(&routing);
        drop(routing);

        if self.fallback_enabled {
            metrics::record_store_fallback(op);
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[async_trait]
impl CheckpointStore for FailoverCheckpointStore {
    fn kind(&self) -> BackendKind {
        match self.routing.lock().active {
            ActiveBackend::Durable => BackendKind::Durable,
            ActiveBackend::Volatile => BackendKind::Volatile,
        }
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        payload: Value,
        metadata: CheckpointMetadata,
        versions: ChannelVersions,
    ) -> StoreResult<PutReceipt> {
        let thread_id = config.validate()?;
        if let Some(durable) = self.durable_route() {
            match durable
                .put(config, payload.clone(), metadata.clone(), versions.clone())
                .await
            {
                Ok(receipt) => {
                    self.record_success();
                    self.mark_spilled(thread_id, false);
                    return Ok(receipt);
                }
                Err(err) => {
                    if let Err(err) = self.on_durable_failure("put", err) {
                        if err.is_backend_failure() {
                            // Keep the payload even when the caller gets the error.
                            self.volatile.put(config, payload, metadata, versions).await?;
                        }
                        return Err(err);
                    }
                }
            }
        }
        let receipt = self.volatile.put(config, payload, metadata, versions).await?;
        self.mark_spilled(thread_id, true);
        Ok(receipt)
    }

    async fn get(&self, config: &CheckpointConfig) -> StoreResult<Option<CheckpointData>> {
        let thread_id = config.validate()?;
        if let Some(durable) = self.durable_route() {
            if config.checkpoint_id.is_none() && self.is_spilled(thread_id) {
                if let Some(found) = self.volatile.get(config).await? {
                    return Ok(Some(found));
                }
            }
            match durable.get(config).await {
                Ok(Some(found)) => {
                    self.record_success();
                    return Ok(Some(found));
                }
                Ok(None) => {
                    self.record_success();
                    // An exact id may have been written to the volatile store.
                    if config.checkpoint_id.is_none() {
                        return Ok(None);
                    }
                }
                Err(err) => self.on_durable_failure("get", err)?,
            }
        }
        self.volatile.get(config).await
    }

    fn supports_lineage(&self) -> bool {
        true
    }

    async fn get_with_lineage(
        &self,
        config: &CheckpointConfig,
    ) -> StoreResult<Option<CheckpointTuple>> {
        let thread_id = config.validate()?;
        if let Some(durable) = self.durable_route() {
            if config.checkpoint_id.is_none() && self.is_spilled(thread_id) {
                if let Some(found) = self.volatile.get_with_lineage(config).await? {
                    return Ok(Some(found));
                }
            }
            let result = if durable.supports_lineage() {
                durable.get_with_lineage(config).await
            } else {
                durable
                    .get(config)
                    .await
                    .map(|found| found.map(|data| without_lineage(config, data)))
            };
            match result {
                Ok(Some(found)) => {
                    self.record_success();
                    return Ok(Some(found));
                }
                Ok(None) => {
                    self.record_success();
                    if config.checkpoint_id.is_none() {
                        return Ok(None);
                    }
                }
                Err(err) => self.on_durable_failure("get_with_lineage", err)?,
            }
        }
        self.volatile.get_with_lineage(config).await
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        options: ListOptions,
    ) -> StoreResult<CheckpointStream> {
        config.validate()?;
        if let Some(durable) = self.durable_route() {
            match durable.list(config, options).await {
                Ok(stream) => {
                    self.record_success();
                    return Ok(stream);
                }
                Err(err) => self.on_durable_failure("list", err)?,
            }
        }
        self.volatile.list(config, options).await
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<PendingWrite>,
        task_id: &str,
    ) -> StoreResult<()> {
        config.validate()?;
        if let Some(durable) = self.durable_route() {
            match durable.put_writes(config, writes.clone(), task_id).await {
                Ok(()) => {
                    self.record_success();
                    return Ok(());
                }
                Err(err) => self.on_durable_failure("put_writes", err)?,
            }
        }
        self.volatile.put_writes(config, writes, task_id).await
    }

    async fn prune(&self, policy: &RetentionPolicy) -> StoreResult<PruneReport> {
        if let Some(durable) = self.durable_route() {
            match durable.prune(policy).await {
                Ok(report) => {
                    self.record_success();
                    return Ok(report);
                }
                Err(err) => self.on_durable_failure("prune", err)?,
            }
        }
        self.volatile.prune(policy).await
    }
}
