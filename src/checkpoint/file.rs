//! File-backed durable checkpoint backend.
//!
//! # Layout
//! ```text
//! <root>/<thread_id>/<checkpoint_id>.json          one checkpoint (with parent_checkpoint_id)
//! <root>/<thread_id>/<checkpoint_id>.writes.json   pending writes for that checkpoint
//! ```
//!
//! # Design Decisions
//! - Checkpoint ids sort chronologically, so a directory listing is the history
//! - Writes go to a uniquely named temp file and are renamed into place
//! - Writers to one thread directory are serialized, so read-modify-write cycles never interleave
//! - Every I/O failure surfaces as a backend failure for the failover wrapper to count

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::checkpoint::store::{
    CheckpointStore, CheckpointStream, PruneReport, RetentionPolicy, StoreError, StoreResult,
};
use crate::checkpoint::types::{
    BackendKind, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointData, CheckpointId,
    CheckpointMetadata, CheckpointTuple, ListOptions, PendingWrite, PendingWriteRecord, PutReceipt,
};

const CHECKPOINT_EXT: &str = ".json";
const WRITES_EXT: &str = ".writes.json";

/// Durable checkpoint store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
    /// Per-thread writer locks, dropped again once nobody holds them.
    write_locks: Arc<DashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::info!(root = %root.display(), "File checkpoint store opened");
        Ok(Self {
            root,
            write_locks: Arc::new(DashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn thread_dir(&self, config: &CheckpointConfig) -> StoreResult<PathBuf> {
        let thread_id = config.validate()?;
        validate_thread_id(thread_id)?;
        Ok(self.root.join(thread_id))
    }

    fn thread_lock(&self, dir: &Path) -> Arc<AsyncMutex<()>> {
        // Clone out of the map so no shard guard is held across an await.
        self.write_locks.entry(dir.to_path_buf()).or_default().clone()
    }

    fn release_thread_lock(&self, dir: &Path, lock: Arc<AsyncMutex<()>>) {
        drop(lock);
        self.write_locks
            .remove_if(dir, |_, held| Arc::strong_count(held) == 1);
    }

    /// Checkpoint ids of a thread, oldest first. A missing thread is empty.
    async fn checkpoint_ids(&self, dir: &Path) -> StoreResult<Vec<CheckpointId>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Unknown thread is fine; a vanished root is not.
                fs::metadata(&self.root).await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(WRITES_EXT) {
                continue;
            }
            let Some(stem) = name.strip_suffix(CHECKPOINT_EXT) else { continue };
            match stem.parse::<CheckpointId>() {
                Ok(id) => ids.push(id),
                Err(_) => tracing::warn!(file = %name, "Ignoring unrecognised file in checkpoint directory"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn load(&self, dir: &Path, id: CheckpointId) -> StoreResult<Option<Checkpoint>> {
        match fs::read(checkpoint_path(dir, id)).await {
            Ok(bytes) => decode(&bytes, dir, id).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, config: &CheckpointConfig) -> StoreResult<Option<Checkpoint>> {
        let dir = self.thread_dir(config)?;
        let id = match config.checkpoint_id {
            Some(id) => id,
            None => match self.checkpoint_ids(&dir).await?.last() {
                Some(id) => *id,
                None => return Ok(None),
            },
        };
        self.load(&dir, id).await
    }

    /// Threads that have at least one directory on disk.
    pub async fn thread_ids(&self) -> StoreResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Pending writes recorded for one checkpoint.
    pub async fn pending_writes(&self, config: &CheckpointConfig) -> StoreResult<Vec<PendingWriteRecord>> {
        let dir = self.thread_dir(config)?;
        let id = require_checkpoint_id(config)?;
        read_writes(&dir, id).await
    }

    /// Writes the next checkpoint of a thread. Callers hold the thread lock.
    async fn append_checkpoint(
        &self,
        dir: &Path,
        config: &CheckpointConfig,
        payload: Value,
        metadata: CheckpointMetadata,
        versions: ChannelVersions,
    ) -> StoreResult<PutReceipt> {
        fs::create_dir_all(dir).await?;

        let parent = self.checkpoint_ids(dir).await?.last().copied();
        let checkpoint = Checkpoint {
            thread_id: config.thread_id.clone(),
            checkpoint_id: CheckpointId::next_after(parent),
            parent_checkpoint_id: parent,
            payload,
            metadata,
            versions,
            created_at: Utc::now(),
        };

        let path = checkpoint_path(dir, checkpoint.checkpoint_id);
        write_atomic(&path, &encode(&checkpoint, &path)?).await?;

        tracing::debug!(
            thread_id = %checkpoint.thread_id,
            checkpoint_id = %checkpoint.checkpoint_id,
            "Checkpoint persisted"
        );
        Ok(PutReceipt {
            config: checkpoint.config(),
            parent: checkpoint.parent_config(),
            backend: BackendKind::Durable,
        })
    }

    async fn prune_thread(
        &self,
        dir: &Path,
        policy: &RetentionPolicy,
        report: &mut PruneReport,
    ) -> StoreResult<()> {
        // Out-of-range retention means nothing is old enough to go.
        let cutoff = TimeDelta::try_days(i64::from(policy.retention_days))
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let ids = self.checkpoint_ids(dir).await?;
        let keep_from = ids.len().saturating_sub(policy.max_per_thread.max(1));

        let mut doomed = Vec::new();
        for (index, id) in ids.iter().enumerate() {
            if index < keep_from {
                doomed.push(*id);
                continue;
            }
            match self.load(dir, *id).await {
                Ok(Some(checkpoint)) if cutoff.is_some_and(|c| checkpoint.created_at < c) => {
                    doomed.push(*id)
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, checkpoint_id = %id, "Skipping unreadable checkpoint during prune"),
            }
        }

        report.checkpoints_removed += doomed.len();
        let emptied = doomed.len() == ids.len();
        if emptied {
            report.threads_removed += 1;
        }
        if policy.dry_run {
            return Ok(());
        }

        for id in doomed {
            remove_if_exists(&checkpoint_path(dir, id)).await?;
            remove_if_exists(&writes_path(dir, id)).await?;
        }
        if emptied {
            // Fails if something unexpected is still inside; leave it then.
            if let Err(e) = fs::remove_dir(dir).await {
                tracing::debug!(error = %e, dir = %dir.display(), "Thread directory not removed");
            }
        }
        Ok(())
    }
}

fn validate_thread_id(thread_id: &str) -> StoreResult<()> {
    let path_safe = !thread_id.starts_with('.')
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !path_safe {
        return Err(StoreError::Configuration(format!(
            "thread_id '{}' is not usable as a storage key",
            thread_id
        )));
    }
    Ok(())
}

fn require_checkpoint_id(config: &CheckpointConfig) -> StoreResult<CheckpointId> {
    config.checkpoint_id.ok_or_else(|| {
        StoreError::Configuration("put_writes requires a checkpoint_id".to_string())
    })
}

fn checkpoint_path(dir: &Path, id: CheckpointId) -> PathBuf {
    dir.join(format!("{}{}", id, CHECKPOINT_EXT))
}

fn writes_path(dir: &Path, id: CheckpointId) -> PathBuf {
    dir.join(format!("{}{}", id, WRITES_EXT))
}

fn decode(bytes: &[u8], dir: &Path, id: CheckpointId) -> StoreResult<Checkpoint> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        location: checkpoint_path(dir, id).display().to_string(),
        source,
    })
}

async fn read_writes(dir: &Path, id: CheckpointId) -> StoreResult<Vec<PendingWriteRecord>> {
    let path = writes_path(dir, id);
    match fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            location: path.display().to_string(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn append_writes(
    dir: &Path,
    id: CheckpointId,
    writes: Vec<PendingWrite>,
    task_id: &str,
) -> StoreResult<()> {
    let mut records = read_writes(dir, id).await?;
    records.extend(writes.into_iter().map(|w| PendingWriteRecord {
        task_id: task_id.to_string(),
        channel: w.channel,
        value: w.value,
    }));

    fs::create_dir_all(dir).await?;
    let path = writes_path(dir, id);
    write_atomic(&path, &encode(&records, &path)?).await
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("checkpoint");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", name, Uuid::now_v7().simple()));
    if let Err(e) = fs::write(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn encode<T: serde::Serialize>(value: &T, location: &Path) -> StoreResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|source| StoreError::Corrupt {
        location: location.display().to_string(),
        source,
    })
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
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
        let dir = self.thread_dir(config)?;
        let lock = self.thread_lock(&dir);
        let result = {
            let _guard = lock.lock().await;
            self.append_checkpoint(&dir, config, payload, metadata, versions).await
        };
        self.release_thread_lock(&dir, lock);
        result
    }

    async fn get(&self, config: &CheckpointConfig) -> StoreResult<Option<CheckpointData>> {
        Ok(self.find(config).await?.map(|c| c.to_data()))
    }

    fn supports_lineage(&self) -> bool {
        true
    }

    async fn get_with_lineage(
        &self,
        config: &CheckpointConfig,
    ) -> StoreResult<Option<CheckpointTuple>> {
        Ok(self.find(config).await?.map(Checkpoint::into_tuple))
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        options: ListOptions,
    ) -> StoreResult<CheckpointStream> {
        let dir = self.thread_dir(config)?;
        let ids: Vec<CheckpointId> = self
            .checkpoint_ids(&dir)
            .await?
            .into_iter()
            .rev()
            .filter(|id| options.admits(id))
            .take(options.take())
            .collect();

        let stream = stream::iter(ids).then(move |id| {
            let dir = dir.clone();
            async move {
                let bytes = fs::read(checkpoint_path(&dir, id)).await?;
                decode(&bytes, &dir, id).map(Checkpoint::into_tuple)
            }
        });
        Ok(stream.boxed())
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<PendingWrite>,
        task_id: &str,
    ) -> StoreResult<()> {
        let dir = self.thread_dir(config)?;
        let id = require_checkpoint_id(config)?;

        let lock = self.thread_lock(&dir);
        let result = {
            let _guard = lock.lock().await;
            append_writes(&dir, id, writes, task_id).await
        };
        self.release_thread_lock(&dir, lock);
        result
    }

    async fn prune(&self, policy: &RetentionPolicy) -> StoreResult<PruneReport> {
        let mut report = PruneReport {
            dry_run: policy.dry_run,
            ..PruneReport::default()
        };
        for thread_id in self.thread_ids().await? {
            report.threads_scanned += 1;
            let dir = self.root.join(&thread_id);
            let lock = self.thread_lock(&dir);
            let result = {
                let _guard = lock.lock().await;
                self.prune_thread(&dir, policy, &mut report).await
            };
            self.release_thread_lock(&dir, lock);
            result?;
        }
        tracing::info!(
            threads_scanned = report.threads_scanned,
            checkpoints_removed = report.checkpoints_removed,
            threads_removed = report.threads_removed,
            dry_run = report.dry_run,
            "Durable checkpoint prune finished"
        );
        Ok(report)
    }
}
