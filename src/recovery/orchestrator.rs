//! Recovery orchestration.
//!
//! # Responsibilities
//! - Mirror the failover store's routing state into the registry as component `store`
//! - Run recovery passes on demand and on a schedule while degraded
//! - Back off between failed automatic passes
//!
//! # Design Decisions
//! - A store that keeps failing without fallback is reported UNAVAILABLE
//! - Automatic passes stop once the attempt budget is used up; on-demand passes still report it
//! - Stopping is logged once at ERROR; the daemon resumes after SIGHUP or a restart

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::checkpoint::{FailoverCheckpointStore, FailoverStatus};
use crate::config::RecoveryConfig;
use crate::health::features::STORE;
use crate::health::{ComponentHealthRegistry, ComponentUpdate, RecoveryOutcome};
use crate::resilience::recovery_backoff;

const STORE_RECOVERY_ACTIONS: [&str; 3] = [
    "Check disk space and permissions on the checkpoint directory",
    "Verify the durable store is reachable",
    "Sessions created now are kept in memory and lost on restart",
];

/// Drives store health sync and recovery passes.
pub struct RecoveryOrchestrator {
    registry: Arc<ComponentHealthRegistry>,
    store: Arc<FailoverCheckpointStore>,
    config: RecoveryConfig,
}

impl RecoveryOrchestrator {
    pub fn new(
        registry: Arc<ComponentHealthRegistry>,
        store: Arc<FailoverCheckpointStore>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Report the failover store's current state into the registry.
    pub fn sync_store_health(&self) {
        let update = store_update(&self.store.status());
        let current = self.registry.component(STORE);
        let unchanged = current.as_ref().is_some_and(|c| {
            c.status == update.status
                && c.fallback_active == update.fallback_active
                && c.degradation_reason == update.reason
        });
        if !unchanged {
            self.registry.update_status(update);
        }
    }

    /// Run one recovery pass now, for `component` or every non-operational one.
    pub async fn trigger(&self, component: Option<&str>) -> RecoveryOutcome {
        self.sync_store_health();
        let outcome = self.registry.attempt_recovery(component).await;
        self.sync_store_health();
        outcome
    }

    /// Run until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut store_rx = self.store.subscribe();
        let mut failed_passes: u32 = 0;
        let mut next_pass_at = Instant::now();
        let mut budget_spent = false;

        tracing::info!(
            interval_secs = self.config.interval_secs,
            auto_recover = self.config.auto_recover,
            "Recovery orchestrator started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync_store_health();
                    if !self.should_auto_recover(next_pass_at, &mut budget_spent) {
                        continue;
                    }
                    match self.trigger(None).await {
                        RecoveryOutcome::Completed(report) if report.is_success() => {
                            failed_passes = 0;
                        }
                        RecoveryOutcome::Completed(_) => {
                            failed_passes = failed_passes.saturating_add(1);
                            let delay = recovery_backoff(failed_passes, &self.config);
                            next_pass_at = Instant::now() + delay;
                            tracing::debug!(
                                failed_passes,
                                delay_ms = delay.as_millis() as u64,
                                "Next automatic recovery pass delayed"
                            );
                        }
                        RecoveryOutcome::Exhausted { .. } | RecoveryOutcome::InProgress => {}
                    }
                }
                changed = store_rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Store status channel closed");
                        break;
                    }
                    self.sync_store_health();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Recovery orchestrator shutting down");
                    break;
                }
            }
        }
    }

    /// `budget_spent` remembers that exhaustion was already reported.
    fn should_auto_recover(&self, next_pass_at: Instant, budget_spent: &mut bool) -> bool {
        if !self.config.auto_recover || !self.registry.is_degraded() {
            return false;
        }
        if Instant::now() < next_pass_at {
            return false;
        }
        let counters = self.registry.recovery_counters();
        if counters.attempts >= counters.max_attempts {
            if !*budget_spent {
                *budget_spent = true;
                tracing::error!(
                    attempts = counters.attempts,
                    max_attempts = counters.max_attempts,
                    level = %self.registry.level(),
                    "Automatic recovery stopped: attempt budget exhausted; send SIGHUP or restart to resume"
                );
            }
            return false;
        }
        *budget_spent = false;
        true
    }
}

fn store_update(status: &FailoverStatus) -> ComponentUpdate {
    let reason = status
        .last_error
        .clone()
        .unwrap_or_else(|| "durable checkpoint backend failing".to_string());

    if status.is_degraded {
        ComponentUpdate::degraded(STORE, reason)
            .with_fallback("volatile")
            .with_recovery_actions(STORE_RECOVERY_ACTIONS)
    } else if !status.fallback_enabled && status.failure_count >= status.failure_threshold {
        ComponentUpdate::unavailable(STORE, reason)
            .with_recovery_actions(STORE_RECOVERY_ACTIONS.iter().take(2).copied())
    } else {
        ComponentUpdate::operational(STORE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{ActiveBackend, VolatileCheckpointStore, VolatileStats};
    use crate::health::{ComponentStatus, FnProbe, ProbeError};
    use crate::lifecycle::Shutdown;

    fn status(is_degraded: bool, failure_count: u32, fallback_enabled: bool) -> FailoverStatus {
        FailoverStatus {
            is_degraded,
            active_backend: if is_degraded {
                ActiveBackend::Volatile
            } else {
                ActiveBackend::Durable
            },
            failure_count,
            failure_threshold: 3,
            fallback_enabled,
            degraded_since: None,
            last_error: Some("disk full".to_string()),
            fallback_stats: VolatileStats::default(),
        }
    }

    #[test]
    fn test_store_update_mapping() {
        let degraded = store_update(&status(true, 3, true));
        assert_eq!(degraded.status, ComponentStatus::Degraded);
        assert!(degraded.fallback_active);
        assert_eq!(degraded.fallback_type.as_deref(), Some("volatile"));
        assert_eq!(degraded.reason.as_deref(), Some("disk full"));
        assert_eq!(degraded.recovery_actions.len(), 3);

        let failing = store_update(&status(false, 3, false));
        assert_eq!(failing.status, ComponentStatus::Unavailable);
        assert!(!failing.fallback_active);

        let flaky = store_update(&status(false, 1, true));
        assert_eq!(flaky.status, ComponentStatus::Operational);
    }

    fn orchestrator() -> RecoveryOrchestrator {
        let store = Arc::new(FailoverCheckpointStore::with_threshold(
            Arc::new(VolatileCheckpointStore::with_limits(10, 24)),
            Arc::new(VolatileCheckpointStore::with_limits(10, 24)),
            3,
            true,
        ));
        let registry = Arc::new(ComponentHealthRegistry::with_limits(3, Duration::from_millis(100)));
        let config = RecoveryConfig {
            interval_secs: 1,
            ..RecoveryConfig::default()
        };
        RecoveryOrchestrator::new(registry, store, config)
    }

    #[test]
    fn test_sync_registers_healthy_store() {
        let orchestrator = orchestrator();
        orchestrator.sync_store_health();
        let store = orchestrator.registry.component(STORE).unwrap();
        assert_eq!(store.status, ComponentStatus::Operational);
    }

    #[tokio::test]
    async fn test_auto_recovery_stops_when_budget_spent() {
        let orchestrator = orchestrator();
        orchestrator.sync_store_health();
        orchestrator
            .registry
            .update_status(ComponentUpdate::degraded("cache", "connection refused"));
        orchestrator.registry.register_probe(
            "cache",
            Arc::new(FnProbe::new(|| async {
                Err::<(), _>(ProbeError::Failed("connection refused".into()))
            })),
        );
        let mut budget_spent = false;
        let now = Instant::now();
        assert!(orchestrator.should_auto_recover(now, &mut budget_spent));

        for _ in 0..3 {
            orchestrator.trigger(None).await;
        }
        assert!(!orchestrator.should_auto_recover(now, &mut budget_spent));
        assert!(budget_spent);
        // Reported once; later ticks stay quiet.
        assert!(!orchestrator.should_auto_recover(now, &mut budget_spent));

        orchestrator.registry.reset_recovery_attempts();
        assert!(orchestrator.should_auto_recover(now, &mut budget_spent));
        assert!(!budget_spent);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(orchestrator().run(shutdown.subscribe()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
        time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
