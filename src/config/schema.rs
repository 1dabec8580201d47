//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the resilience service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::checkpoint::RetentionPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Durable checkpoint store and failover settings.
    pub store: StoreConfig,

    /// In-memory fallback store limits.
    pub volatile: VolatileConfig,

    /// Recovery orchestration settings.
    pub recovery: RecoveryConfig,

    /// Scheduled cleanup and pruning.
    pub maintenance: MaintenanceConfig,

    /// External dependencies tracked by the health registry.
    /// The checkpoint store is always tracked and must not be listed here.
    pub components: Vec<ComponentConfig>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig::default(),
            store: StoreConfig::default(),
            volatile: VolatileConfig::default(),
            recovery: RecoveryConfig::default(),
            maintenance: MaintenanceConfig::default(),
            components: default_components(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Durable store and failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the file-backed durable store.
    pub path: String,

    /// Consecutive durable failures before switching to the volatile store.
    pub failure_threshold: u32,

    /// Serve from the volatile store when the durable one fails.
    /// When false, durable errors are returned to the caller.
    pub fallback_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "./data/checkpoints".to_string(),
            failure_threshold: 3,
            fallback_enabled: true,
        }
    }
}

/// Volatile store limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VolatileConfig {
    /// Newest checkpoints kept per thread.
    pub max_per_thread: usize,

    /// Checkpoints older than this are evicted.
    pub max_age_hours: u64,
}

impl Default for VolatileConfig {
    fn default() -> Self {
        Self {
            max_per_thread: 100,
            max_age_hours: 24,
        }
    }
}

/// Recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Recovery passes allowed before the counter must be reset.
    pub max_attempts: u32,

    /// Per-probe timeout in milliseconds.
    pub probe_timeout_ms: u64,

    /// Interval between scheduled health syncs in seconds.
    pub interval_secs: u64,

    /// Run a recovery pass automatically while degraded.
    pub auto_recover: bool,

    /// Base delay after a failed automatic pass in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum delay after failed automatic passes in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            probe_timeout_ms: 2_000,
            interval_secs: 30,
            auto_recover: true,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
        }
    }
}

/// Maintenance job configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Enable the scheduled maintenance job.
    pub enabled: bool,

    /// Interval between runs in seconds.
    pub interval_secs: u64,

    /// Durable checkpoints older than this many days are pruned.
    pub retention_days: u32,

    /// Newest durable checkpoints kept per thread.
    pub max_per_thread: usize,

    /// Report what pruning would remove without removing it.
    pub dry_run: bool,
}

impl MaintenanceConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            retention_days: self.retention_days,
            max_per_thread: self.max_per_thread,
            dry_run: self.dry_run,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3_600,
            retention_days: 30,
            max_per_thread: 1_000,
            dry_run: false,
        }
    }
}

/// A tracked external dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComponentConfig {
    /// Unique component name (e.g., "cache").
    pub name: String,

    /// What users lose while this component is down.
    #[serde(default)]
    pub impact_description: String,

    /// Optional "host:port" checked with a TCP connect during recovery.
    #[serde(default)]
    pub probe_address: Option<String>,
}

fn default_components() -> Vec<ComponentConfig> {
    [
        ("cache", "Query caching and real-time updates disabled"),
        ("knowledge_graph", "Schema relationship hints unavailable"),
        ("workers", "Queries run inline instead of in the background"),
    ]
    .into_iter()
    .map(|(name, impact)| ComponentConfig {
        name: name.to_string(),
        impact_description: impact.to_string(),
        probe_address: None,
    })
    .collect()
}
