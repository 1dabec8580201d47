//! Resilience and degraded-mode coordination for the query backend.
//!
//! Tracks the health of external dependencies, keeps conversation checkpoints
//! writable when the durable store fails, and drives bounded recovery.

// Storage
pub mod checkpoint;

// Health and recovery
pub mod health;
pub mod recovery;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use checkpoint::{CheckpointStore, FailoverCheckpointStore};
pub use config::ResilienceConfig;
pub use health::ComponentHealthRegistry;
pub use lifecycle::{ResilienceService, Shutdown};
