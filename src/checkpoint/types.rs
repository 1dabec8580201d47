//! Checkpoint addressing and record types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::checkpoint::store::StoreError;

/// Free-form metadata attached to a checkpoint (step, source, writer...).
pub type CheckpointMetadata = serde_json::Map<String, Value>;

/// Channel name -> version token, as persisted.
pub type ChannelVersions = BTreeMap<String, String>;

/// Identifier of a single checkpoint.
///
/// Ids are UUIDv7, so their natural ordering is chronological. Within one thread
/// every new id is strictly greater than the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(Uuid);

impl CheckpointId {
    /// Mint the next id for a thread whose newest checkpoint is `previous`.
    pub fn next_after(previous: Option<CheckpointId>) -> Self {
        let candidate = Uuid::now_v7();
        match previous {
            // Clock did not advance (or went backwards): stay strictly ordered.
            Some(prev) if candidate <= prev.0 => {
                Self(Uuid::from_u128(prev.0.as_u128().wrapping_add(1)))
            }
            _ => Self(candidate),
        }
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for CheckpointId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Address of a checkpoint call: a thread, and optionally one checkpoint in it.
///
/// Without a `checkpoint_id`, reads resolve to the thread's newest checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
}

impl CheckpointConfig {
    /// Address the newest checkpoint of a thread.
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_id: None,
        }
    }

    /// Address one exact checkpoint.
    pub fn at(thread_id: impl Into<String>, checkpoint_id: CheckpointId) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_id: Some(checkpoint_id),
        }
    }

    /// Reject calls that carry no thread id.
    pub fn validate(&self) -> Result<&str, StoreError> {
        if self.thread_id.trim().is_empty() {
            return Err(StoreError::Configuration(
                "checkpoint config is missing thread_id".to_string(),
            ));
        }
        Ok(&self.thread_id)
    }
}

/// Which backend served (or produced) a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Durable,
    Volatile,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Durable => write!(f, "durable"),
            BackendKind::Volatile => write!(f, "volatile"),
        }
    }
}

/// A stored checkpoint. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub checkpoint_id: CheckpointId,
    /// Previous checkpoint of the same thread; `None` for the first one.
    pub parent_checkpoint_id: Option<CheckpointId>,
    pub payload: Value,
    #[serde(default)]
    pub metadata: CheckpointMetadata,
    #[serde(default)]
    pub versions: ChannelVersions,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn config(&self) -> CheckpointConfig {
        CheckpointConfig::at(self.thread_id.clone(), self.checkpoint_id)
    }

    pub fn parent_config(&self) -> Option<CheckpointConfig> {
        self.parent_checkpoint_id
            .map(|parent| CheckpointConfig::at(self.thread_id.clone(), parent))
    }

    pub fn to_data(&self) -> CheckpointData {
        CheckpointData {
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn to_tuple(&self) -> CheckpointTuple {
        CheckpointTuple {
            config: self.config(),
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            parent_config: self.parent_config(),
        }
    }

    pub fn into_tuple(self) -> CheckpointTuple {
        let config = self.config();
        let parent_config = self.parent_config();
        CheckpointTuple {
            config,
            payload: self.payload,
            metadata: self.metadata,
            parent_config,
        }
    }
}

/// Result of a plain `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub payload: Value,
    pub metadata: CheckpointMetadata,
}

/// Result of `get_with_lineage` and `list`: a checkpoint plus a handle to walk history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointTuple {
    pub config: CheckpointConfig,
    pub payload: Value,
    pub metadata: CheckpointMetadata,
    pub parent_config: Option<CheckpointConfig>,
}

/// Returned by `put`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutReceipt {
    /// Address of the checkpoint just written.
    pub config: CheckpointConfig,
    /// The thread's previous checkpoint, if any.
    pub parent: Option<CheckpointConfig>,
    /// Backend that accepted the write.
    pub backend: BackendKind,
}

/// A side-channel write produced by a task while a checkpoint is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub channel: String,
    pub value: Value,
}

/// Persisted form of a [`PendingWrite`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWriteRecord {
    pub task_id: String,
    pub channel: String,
    pub value: Value,
}

/// Options for `list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Keep only the newest N matching checkpoints.
    pub limit: Option<usize>,
    /// Only checkpoints strictly older than this id.
    pub before: Option<CheckpointId>,
}

impl ListOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            before: None,
        }
    }

    pub fn admits(&self, id: &CheckpointId) -> bool {
        self.before.map_or(true, |before| *id < before)
    }

    pub fn take(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let mut previous = None;
        for _ in 0..1000 {
            let next = CheckpointId::next_after(previous);
            if let Some(prev) = previous {
                assert!(next > prev);
            }
            previous = Some(next);
        }
    }

    #[test]
    fn test_id_bumped_past_future_parent() {
        let future = CheckpointId(Uuid::from_u128(u128::MAX - 10));
        let next = CheckpointId::next_after(Some(future));
        assert!(next > future);
    }

    #[test]
    fn test_id_string_roundtrip() {
        let id = CheckpointId::next_after(None);
        let parsed: CheckpointId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_missing_thread_is_configuration_error() {
        let err = CheckpointConfig::thread("  ").validate().unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
        assert_eq!(CheckpointConfig::thread("t1").validate().unwrap(), "t1");
    }

    #[test]
    fn test_list_options_before() {
        let a = CheckpointId::next_after(None);
        let b = CheckpointId::next_after(Some(a));
        let opts = ListOptions {
            limit: None,
            before: Some(b),
        };
        assert!(opts.admits(&a));
        assert!(!opts.admits(&b));
    }
}
