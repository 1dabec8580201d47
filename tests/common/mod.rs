//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use degraded_mode::checkpoint::{
    BackendKind, ChannelVersions, CheckpointConfig, CheckpointData, CheckpointMetadata,
    CheckpointStore, CheckpointStream, CheckpointTuple, ListOptions, PendingWrite, PutReceipt,
    StoreError, StoreResult, VolatileCheckpointStore,
};

/// A durable-looking backend whose failures are scripted per call.
///
/// Calls are numbered from 1 across every operation. A scripted call fails with
/// `StoreError::Transient` without touching the inner store.
pub struct ScriptedStore {
    pub inner: VolatileCheckpointStore,
    calls: AtomicUsize,
    failing_calls: Mutex<HashSet<usize>>,
    fail_all: AtomicBool,
    lineage: bool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: VolatileCheckpointStore::with_limits(1_000, 24),
            calls: AtomicUsize::new(0),
            failing_calls: Mutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
            lineage: true,
        }
    }

    /// Fail the given 1-based call numbers.
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        let store = Self::new();
        store.failing_calls.lock().extend(calls);
        store
    }

    pub fn without_lineage(mut self) -> Self {
        self.lineage = false;
        self
    }

    pub fn set_down(&self, down: bool) {
        self.fail_all.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> StoreResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_all.load(Ordering::SeqCst) || self.failing_calls.lock().contains(&call) {
            return Err(StoreError::Transient(format!("scripted failure on call {}", call)));
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for ScriptedStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        payload: Value,
        metadata: CheckpointMetadata,
        versions: ChannelVersions,
    ) -> StoreResult<PutReceipt> {
        self.enter()?;
        let mut receipt = self.inner.put(config, payload, metadata, versions).await?;
        receipt.backend = BackendKind::Durable;
        Ok(receipt)
    }

    async fn get(&self, config: &CheckpointConfig) -> StoreResult<Option<CheckpointData>> {
        self.enter()?;
        self.inner.get(config).await
    }

    fn supports_lineage(&self) -> bool {
        self.lineage
    }

    async fn get_with_lineage(
        &self,
        config: &CheckpointConfig,
    ) -> StoreResult<Option<CheckpointTuple>> {
        self.enter()?;
        self.inner.get_with_lineage(config).await
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        options: ListOptions,
    ) -> StoreResult<CheckpointStream> {
        self.enter()?;
        self.inner.list(config, options).await
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<PendingWrite>,
        task_id: &str,
    ) -> StoreResult<()> {
        self.enter()?;
        self.inner.put_writes(config, writes, task_id).await
    }
}

pub fn meta(step: u64) -> CheckpointMetadata {
    let mut metadata = CheckpointMetadata::new();
    metadata.insert("step".into(), json!(step));
    metadata.insert("source".into(), json!("loop"));
    metadata
}

pub fn payload(step: u64) -> Value {
    json!({ "messages": [format!("turn {}", step)], "step": step })
}
