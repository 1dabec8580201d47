//! Component health subsystem.
//!
//! # Data Flow
//! ```text
//! Callers (store wrapper, service clients):
//!     → update_status(component, status, reason, fallback)
//!     → registry.rs (replace state, recompute level, publish snapshot)
//!
//! Readers (status endpoint, feature gating):
//!     → status() / is_feature_available()
//!     → lock-free snapshot load
//!
//! Recovery (recovery/orchestrator.rs):
//!     → attempt_recovery()
//!     → probe.rs (one probe per target, bounded by timeout)
//!     → update_status() per result
//! ```
//!
//! # Design Decisions
//! - Component names are plain strings; the well-known ones live in features.rs
//! - Level derivation is a pure function of component states (level.rs)
//! - Unknown features and components fail open

pub mod component;
pub mod features;
pub mod level;
pub mod probe;
pub mod registry;

pub use component::{ComponentState, ComponentStatus, ComponentUpdate};
pub use level::DegradationLevel;
pub use probe::{CheckpointStoreProbe, FnProbe, ProbeError, RecoveryProbe, TcpConnectProbe};
pub use registry::{
    ComponentHealthRegistry, ProbeFailure, RecoveryCounters, RecoveryOutcome, RecoveryReport,
    SystemStatus,
};
