//! Resilience primitives shared by the store wrapper and the recovery loop.
//!
//! # Data Flow
//! ```text
//! Recovery probe:
//!     → timeouts.rs (bound the probe)
//!
//! Failed recovery pass:
//!     → backoff.rs (delay before the next scheduled pass)
//! ```
//!
//! # Design Decisions
//! - Every probe has a deadline; a hung dependency counts as a failed probe
//! - Backoff is capped and jittered below the cap

pub mod backoff;
pub mod timeouts;

pub use backoff::recovery_backoff;
pub use timeouts::{with_timeout, TimeoutError};
