//! Recovery and maintenance subsystem.
//!
//! # Data Flow
//! ```text
//! Failover store status (watch channel) / periodic tick:
//!     → orchestrator.rs sync_store_health()
//!     → registry update_status("store", ...)
//!
//! Periodic tick while degraded (auto_recover):
//!     → registry attempt_recovery()
//!     → probes (store probe resets the failover store on success)
//!     → failed pass: backoff before the next automatic pass
//!
//! Maintenance tick:
//!     → maintenance.rs run_once()
//!     → volatile cleanup_all() + durable prune()
//! ```
//!
//! # Design Decisions
//! - The orchestrator owns no health state; the registry does
//! - Exhausted recovery stays exhausted until an operator resets the counter
//! - Maintenance failures are logged and retried on the next tick

pub mod maintenance;
pub mod orchestrator;

pub use maintenance::{MaintenanceJob, MaintenanceReport};
pub use orchestrator::RecoveryOrchestrator;
