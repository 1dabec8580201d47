//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Open stores → Build registry → Register components
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Background loops exit → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reset the recovery attempt budget
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then stores, then the registry
//! - Fail fast: a durable store that cannot be opened aborts startup

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{reset_recovery_on_hangup, wait_for_shutdown_signal};
pub use startup::{ResilienceService, StartupError};
