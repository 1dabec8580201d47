//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → sections handed to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ResilienceConfig;
pub use schema::{ComponentConfig, LogFormat, ObservabilityConfig};
pub use schema::{MaintenanceConfig, RecoveryConfig, StoreConfig, VolatileConfig};
pub use validation::{MAX_RETENTION_DAYS, MAX_VOLATILE_AGE_HOURS};
