//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the durable and volatile checkpoint stores
//! - Wrap them in the failover store
//! - Build the health registry and register every component with its probe
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Every component starts OPERATIONAL; the first sync or failure corrects it

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::checkpoint::{
    CheckpointStore, FailoverCheckpointStore, FileCheckpointStore, StoreError,
    VolatileCheckpointStore,
};
use crate::config::{load_config, ConfigError, ResilienceConfig};
use crate::health::features::STORE;
use crate::health::{
    CheckpointStoreProbe, ComponentHealthRegistry, ComponentStatus, TcpConnectProbe,
};
use crate::recovery::{MaintenanceJob, RecoveryOrchestrator};

const STORE_IMPACT: &str = "Sessions are kept in memory only and are lost on restart";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open checkpoint store at {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: StoreError,
    },
}

/// Every long-lived object of the service, wired together.
pub struct ResilienceService {
    pub config: ResilienceConfig,
    pub registry: Arc<ComponentHealthRegistry>,
    pub volatile: Arc<VolatileCheckpointStore>,
    pub durable: Arc<FileCheckpointStore>,
    pub store: Arc<FailoverCheckpointStore>,
}

impl ResilienceService {
    /// Load configuration from `path` and build the service.
    pub async fn from_path(path: &Path) -> Result<Self, StartupError> {
        let config = load_config(path)?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Self::build(config).await
    }

    pub async fn build(config: ResilienceConfig) -> Result<Self, StartupError> {
        let volatile = Arc::new(VolatileCheckpointStore::new(&config.volatile));

        let durable = FileCheckpointStore::open(&config.store.path)
            .await
            .map_err(|source| StartupError::Store {
                path: config.store.path.clone(),
                source,
            })?;
        let durable = Arc::new(durable);

        let store = Arc::new(FailoverCheckpointStore::new(
            durable.clone() as Arc<dyn CheckpointStore>,
            volatile.clone(),
            &config.store,
        ));

        let registry = Arc::new(ComponentHealthRegistry::new(&config.recovery));
        registry.register(STORE, ComponentStatus::Operational, STORE_IMPACT);
        registry.register_probe(STORE, Arc::new(CheckpointStoreProbe::new(store.clone())));

        for component in &config.components {
            registry.register(
                &component.name,
                ComponentStatus::Operational,
                &component.impact_description,
            );
            if let Some(address) = &component.probe_address {
                registry.register_probe(&component.name, Arc::new(TcpConnectProbe::new(address)));
            }
        }

        tracing::info!(
            components = config.components.len() + 1,
            failure_threshold = config.store.failure_threshold,
            fallback_enabled = config.store.fallback_enabled,
            "Resilience service initialized"
        );

        Ok(Self {
            config,
            registry,
            volatile,
            durable,
            store,
        })
    }

    pub fn orchestrator(&self) -> RecoveryOrchestrator {
        RecoveryOrchestrator::new(
            self.registry.clone(),
            self.store.clone(),
            self.config.recovery.clone(),
        )
    }

    pub fn maintenance(&self) -> MaintenanceJob {
        MaintenanceJob::new(
            self.volatile.clone(),
            self.durable.clone() as Arc<dyn CheckpointStore>,
            self.config.maintenance.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComponentConfig;
    use crate::health::DegradationLevel;

    #[tokio::test]
    async fn test_build_registers_store_and_components() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ResilienceConfig::default();
        config.store.path = dir.path().join("checkpoints").display().to_string();
        config.components = vec![ComponentConfig {
            name: "cache".to_string(),
            impact_description: "No caching".to_string(),
            probe_address: Some("127.0.0.1:1".to_string()),
        }];

        let service = ResilienceService::build(config).await.unwrap();
        let status = service.registry.status();
        assert_eq!(status.degradation_level, DegradationLevel::Normal);
        assert_eq!(status.operational_components, vec!["cache", "store"]);
        assert_eq!(service.registry.component("cache").unwrap().impact_description, "No caching");
        assert!(!service.store.is_degraded());
    }
}
