//! Recovery passes: single-flight, attempt budget, per-probe isolation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use degraded_mode::health::{
    ComponentHealthRegistry, ComponentStatus, ComponentUpdate, FnProbe, ProbeError,
    RecoveryOutcome, RecoveryProbe, RecoveryReport,
};

fn registry() -> Arc<ComponentHealthRegistry> {
    Arc::new(ComponentHealthRegistry::with_limits(3, Duration::from_millis(100)))
}

fn switchable_probe(healthy: Arc<AtomicBool>) -> Arc<dyn RecoveryProbe> {
    Arc::new(FnProbe::new(move || {
        let result = if healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Failed("connection refused".to_string()))
        };
        futures_util::future::ready(result)
    }))
}

fn completed(outcome: RecoveryOutcome) -> RecoveryReport {
    match outcome {
        RecoveryOutcome::Completed(report) => report,
        other => panic!("expected a completed pass, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_requests_collapse_into_one_pass() {
    let registry = registry();
    let probes = Arc::new(AtomicUsize::new(0));
    let counter = probes.clone();
    registry.update_status(ComponentUpdate::unavailable("cache", "timeout"));
    registry.register_probe(
        "cache",
        Arc::new(FnProbe::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<(), ProbeError>(())
            }
        })),
    );

    let (first, second) = tokio::join!(
        registry.attempt_recovery(None),
        registry.attempt_recovery(None)
    );
    let outcomes = [first, second];
    let collapsed = outcomes
        .iter()
        .filter(|o| matches!(o, RecoveryOutcome::InProgress))
        .count();
    assert_eq!(collapsed, 1);
    assert_eq!(probes.load(Ordering::SeqCst), 1);
    assert_eq!(registry.component("cache").unwrap().status, ComponentStatus::Operational);
}

#[tokio::test]
async fn test_attempts_exhaust_until_reset() {
    let registry = registry();
    let healthy = Arc::new(AtomicBool::new(false));
    registry.update_status(ComponentUpdate::degraded("knowledge_graph", "timeout"));
    registry.register_probe("knowledge_graph", switchable_probe(healthy.clone()));

    for attempt in 1..=3 {
        let report = completed(registry.attempt_recovery(None).await);
        assert_eq!(report.attempt, attempt);
        assert_eq!(report.failed.len(), 1);
    }

    match registry.attempt_recovery(None).await {
        RecoveryOutcome::Exhausted { attempts, max_attempts } => {
            assert_eq!(attempts, 4);
            assert_eq!(max_attempts, 3);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    // Exhausted passes probe nothing, even once the dependency is back.
    healthy.store(true, Ordering::SeqCst);
    assert!(matches!(
        registry.attempt_recovery(None).await,
        RecoveryOutcome::Exhausted { .. }
    ));
    assert_eq!(
        registry.component("knowledge_graph").unwrap().status,
        ComponentStatus::Degraded
    );

    registry.reset_recovery_attempts();
    let report = completed(registry.attempt_recovery(None).await);
    assert_eq!(report.recovered, vec!["knowledge_graph".to_string()]);
    assert_eq!(registry.recovery_counters().attempts, 0);
}

#[tokio::test]
async fn test_successful_pass_restores_budget() {
    let registry = registry();
    let healthy = Arc::new(AtomicBool::new(false));
    registry.update_status(ComponentUpdate::degraded("cache", "timeout"));
    registry.register_probe("cache", switchable_probe(healthy.clone()));

    completed(registry.attempt_recovery(None).await);
    completed(registry.attempt_recovery(None).await);
    assert_eq!(registry.recovery_counters().attempts, 2);

    healthy.store(true, Ordering::SeqCst);
    let report = completed(registry.attempt_recovery(None).await);
    assert!(report.is_success());
    assert_eq!(registry.recovery_counters().attempts, 0);
    assert!(!registry.is_degraded());
}

#[tokio::test]
async fn test_probe_failures_are_isolated() {
    let registry = registry();
    registry.register("cache", ComponentStatus::Operational, "");
    registry.register("workers", ComponentStatus::Operational, "");
    registry.register("knowledge_graph", ComponentStatus::Operational, "");
    registry.update_status(
        ComponentUpdate::degraded("cache", "timeout")
            .with_fallback("local")
            .with_recovery_actions(["Check cache host"]),
    );
    registry.update_status(ComponentUpdate::unavailable("workers", "no heartbeat"));
    registry.update_status(ComponentUpdate::degraded("knowledge_graph", "slow"));

    registry.register_probe("cache", switchable_probe(Arc::new(AtomicBool::new(false))));
    registry.register_probe("knowledge_graph", switchable_probe(Arc::new(AtomicBool::new(true))));
    registry.register_probe(
        "workers",
        Arc::new(FnProbe::new(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), ProbeError>(())
        })),
    );

    let report = completed(registry.attempt_recovery(None).await);
    assert_eq!(report.recovered, vec!["knowledge_graph".to_string()]);
    assert_eq!(report.failed.len(), 2);
    let timed_out = report.failed.iter().find(|f| f.component == "workers").unwrap();
    assert!(timed_out.error.contains("timed out"));

    let cache = registry.component("cache").unwrap();
    assert_eq!(cache.status, ComponentStatus::Degraded);
    assert!(cache.fallback_active);
    assert_eq!(cache.fallback_type.as_deref(), Some("local"));
    assert_eq!(cache.recovery_actions, vec!["Check cache host".to_string()]);
    assert!(cache
        .degradation_reason
        .unwrap()
        .starts_with("recovery probe failed:"));

    let workers = registry.component("workers").unwrap();
    assert_eq!(workers.status, ComponentStatus::Unavailable);
    assert_eq!(
        registry.component("knowledge_graph").unwrap().status,
        ComponentStatus::Operational
    );
}

#[tokio::test]
async fn test_components_without_probes_are_skipped() {
    let registry = registry();
    registry.update_status(ComponentUpdate::degraded("workers", "backlog"));

    let report = completed(registry.attempt_recovery(Some("workers")).await);
    assert_eq!(report.skipped, vec!["workers".to_string()]);
    assert!(report.recovered.is_empty());
    assert_eq!(registry.component("workers").unwrap().status, ComponentStatus::Degraded);
}

#[tokio::test]
async fn test_check_all_probes_healthy_components_without_budget() {
    let registry = registry();
    registry.register("cache", ComponentStatus::Operational, "");
    registry.register("workers", ComponentStatus::Operational, "");
    registry.register_probe("cache", switchable_probe(Arc::new(AtomicBool::new(false))));

    let report = completed(registry.check_all().await);
    assert_eq!(report.attempt, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.skipped, vec!["workers".to_string()]);
    assert_eq!(registry.component("cache").unwrap().status, ComponentStatus::Degraded);
    assert_eq!(registry.recovery_counters().attempts, 0);
}
