//! Checkpoint persistence subsystem.
//!
//! # Data Flow
//! ```text
//! Query orchestration step:
//!     → failover.rs (route by ActiveBackend)
//!         Durable  → file.rs (persistent, lineage on disk)
//!         on failure / while degraded
//!         Volatile → volatile.rs (in-process, count/age eviction)
//!
//! Health:
//!     failover.rs status() / subscribe()
//!     → recovery orchestrator → health registry ("store" component)
//! ```
//!
//! # Design Decisions
//! - One async contract (store.rs) for every backend
//! - Addressing is a typed `CheckpointConfig`, not a nested map
//! - Version tokens are numeric internally and strings at the boundary

pub mod failover;
pub mod file;
pub mod store;
pub mod types;
pub mod volatile;

pub use failover::{ActiveBackend, FailoverCheckpointStore, FailoverStatus};
pub use file::FileCheckpointStore;
pub use store::{
    next_version, CheckpointStore, CheckpointStream, PruneReport, RetentionPolicy, StoreError,
    StoreResult,
};
pub use types::{
    BackendKind, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointData, CheckpointId,
    CheckpointMetadata, CheckpointTuple, ListOptions, PendingWrite, PendingWriteRecord, PutReceipt,
};
pub use volatile::{CleanupReport, VolatileCheckpointStore, VolatileStats};
