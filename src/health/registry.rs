//! Component health registry.
//!
//! # Responsibilities
//! - Hold the health state of every named dependency
//! - Derive the system-wide degradation level
//! - Publish immutable status snapshots for readers
//! - Run bounded, single-flight recovery passes
//!
//! # Design Decisions
//! - Built once at startup and shared by `Arc`; no process-global instance
//! - All mutations go through one mutex and never suspend
//! - Readers load an `Arc<SystemStatus>` snapshot without taking the mutex
//! - Probes run outside the mutex, each under its own timeout

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::RecoveryConfig;
use crate::health::component::{ComponentState, ComponentStatus, ComponentUpdate};
use crate::health::features;
use crate::health::level::DegradationLevel;
use crate::health::probe::{ProbeError, RecoveryProbe};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;

/// Snapshot returned by [`ComponentHealthRegistry::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub degradation_level: DegradationLevel,
    pub is_degraded: bool,
    pub degradation_start_time: Option<DateTime<Utc>>,
    pub degraded_components: Vec<ComponentState>,
    pub operational_components: Vec<String>,
    pub message: String,
    pub affected_features: Vec<String>,
    pub recovery_suggestions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Recovery bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryCounters {
    pub attempts: u32,
    pub max_attempts: u32,
    pub in_progress: bool,
}

/// A probe that did not confirm recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeFailure {
    pub component: String,
    pub error: String,
}

/// Result of one completed recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub attempt: u32,
    pub recovered: Vec<String>,
    pub failed: Vec<ProbeFailure>,
    /// Targeted components with no registered probe.
    pub skipped: Vec<String>,
}

impl RecoveryReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What `attempt_recovery` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Another pass was already running; nothing was probed.
    InProgress,
    /// Attempt budget used up; nothing was probed until the counter is reset.
    Exhausted { attempts: u32, max_attempts: u32 },
    Completed(RecoveryReport),
}

#[derive(Debug)]
struct RegistryState {
    components: BTreeMap<String, ComponentState>,
    level: DegradationLevel,
    degradation_start: Option<DateTime<Utc>>,
}

/// Single source of truth for dependency health.
pub struct ComponentHealthRegistry {
    state: Mutex<RegistryState>,
    snapshot: ArcSwap<SystemStatus>,
    probes: DashMap<String, Arc<dyn RecoveryProbe>>,
    recovery_gate: tokio::sync::Mutex<()>,
    attempts: AtomicU32,
    max_attempts: u32,
    probe_timeout: Duration,
}

impl ComponentHealthRegistry {
    pub fn new(config: &RecoveryConfig) -> Self {
        Self::with_limits(config.max_attempts, Duration::from_millis(config.probe_timeout_ms))
    }

    pub fn with_limits(max_attempts: u32, probe_timeout: Duration) -> Self {
        let state = RegistryState {
            components: BTreeMap::new(),
            level: DegradationLevel::Normal,
            degradation_start: None,
        };
        let snapshot = ArcSwap::from_pointee(build_status(&state));
        Self {
            state: Mutex::new(state),
            snapshot,
            probes: DashMap::new(),
            recovery_gate: tokio::sync::Mutex::new(()),
            attempts: AtomicU32::new(0),
            max_attempts,
            probe_timeout,
        }
    }

    /// Add a component. Registering an existing name is a no-op.
    pub fn register(&self, name: &str, initial_status: ComponentStatus, impact_description: &str) {
        let mut state = self.state.lock();
        if state.components.contains_key(name) {
            tracing::debug!(component = name, "Component already registered");
            return;
        }
        state.components.insert(
            name.to_string(),
            ComponentState::new(name, initial_status, impact_description),
        );
        tracing::info!(component = name, status = %initial_status, "Component registered");
        self.refresh(&mut state);
        drop(state);
        metrics::record_component_status(name, initial_status);
    }

    /// Attach the probe used by recovery passes for `name`.
    pub fn register_probe(&self, name: &str, probe: Arc<dyn RecoveryProbe>) {
        self.probes.insert(name.to_string(), probe);
    }

    /// Replace a component's state. Never fails.
    pub fn update_status(&self, update: ComponentUpdate) {
        let mut state = self.state.lock();
        let previous = state.components.get(&update.name);
        let previous_status = previous.map(|c| c.status);
        let impact_description = previous
            .map(|c| c.impact_description.clone())
            .unwrap_or_default();

        let mut next = ComponentState {
            name: update.name,
            status: update.status,
            degradation_reason: update.reason,
            fallback_active: update.fallback_active,
            fallback_type: update.fallback_type,
            last_check: Utc::now(),
            impact_description,
            recovery_actions: update.recovery_actions,
        };
        if next.is_operational() && next.fallback_active {
            tracing::debug!(component = %next.name, "Dropping fallback flag on operational component");
        }
        if next.is_operational() {
            next.fallback_active = false;
            next.fallback_type = None;
        }

        log_transition(previous_status, &next);
        let name = next.name.clone();
        let status = next.status;
        state.components.insert(name.clone(), next);
        self.refresh(&mut state);
        drop(state);

        metrics::record_component_status(&name, status);
    }

    /// Recompute the degradation level from the current states.
    pub fn recompute_level(&self) -> DegradationLevel {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        state.level
    }

    fn refresh(&self, state: &mut RegistryState) {
        let level = DegradationLevel::from_components(state.components.values());
        if level != state.level {
            match (state.level.is_degraded(), level.is_degraded()) {
                (false, true) => {
                    state.degradation_start = Some(Utc::now());
                    tracing::warn!(level = %level, "System entered degraded mode");
                }
                (true, false) => {
                    state.degradation_start = None;
                    tracing::info!(previous = %state.level, "System returned to normal operation");
                }
                _ => tracing::warn!(from = %state.level, to = %level, "Degradation level changed"),
            }
            state.level = level;
            metrics::record_degradation_level(level);
        }
        self.snapshot.store(Arc::new(build_status(state)));
    }

    /// Latest published snapshot.
    pub fn status(&self) -> Arc<SystemStatus> {
        self.snapshot.load_full()
    }

    pub fn level(&self) -> DegradationLevel {
        self.snapshot.load().degradation_level
    }

    pub fn is_degraded(&self) -> bool {
        self.snapshot.load().is_degraded
    }

    pub fn component(&self, name: &str) -> Option<ComponentState> {
        self.state.lock().components.get(name).cloned()
    }

    /// Whether a user-facing feature can be attempted.
    ///
    /// Only an UNAVAILABLE backing component disables a feature. Unknown feature
    /// keys and unregistered components are treated as available.
    pub fn is_feature_available(&self, feature: &str) -> bool {
        let Some(component) = features::component_for_feature(feature) else {
            return true;
        };
        let snapshot = self.snapshot.load();
        !snapshot
            .degraded_components
            .iter()
            .any(|c| c.name == component && c.status == ComponentStatus::Unavailable)
    }

    pub fn recovery_counters(&self) -> RecoveryCounters {
        RecoveryCounters {
            attempts: self.attempts.load(Ordering::SeqCst),
            max_attempts: self.max_attempts,
            in_progress: self.recovery_gate.try_lock().is_err(),
        }
    }

    /// Allow recovery passes again after the attempt budget was used up.
    pub fn reset_recovery_attempts(&self) {
        let previous = self.attempts.swap(0, Ordering::SeqCst);
        tracing::info!(previous_attempts = previous, "Recovery attempt counter reset");
    }

    /// Run one recovery pass for `component`, or for every non-operational component.
    pub async fn attempt_recovery(&self, component: Option<&str>) -> RecoveryOutcome {
        let Ok(_pass) = self.recovery_gate.try_lock() else {
            tracing::info!(component, "Recovery already in progress; request collapsed");
            metrics::record_recovery_attempt("in_progress");
            return RecoveryOutcome::InProgress;
        };

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if attempt > self.max_attempts {
            tracing::warn!(
                attempts = attempt,
                max_attempts = self.max_attempts,
                "Recovery attempts exhausted; counter reset required"
            );
            metrics::record_recovery_attempt("exhausted");
            return RecoveryOutcome::Exhausted {
                attempts: attempt,
                max_attempts: self.max_attempts,
            };
        }

        let (targets, skipped) = self.recovery_targets(component);
        let report = self.run_pass(attempt, targets, skipped).await;

        if report.is_success() {
            self.attempts.store(0, Ordering::SeqCst);
            metrics::record_recovery_attempt("success");
        } else {
            metrics::record_recovery_attempt("failure");
        }
        RecoveryOutcome::Completed(report)
    }

    /// Probe every component that has a probe, healthy or not.
    ///
    /// Shares the single-flight gate with `attempt_recovery` but does not use the
    /// attempt budget. Reported as attempt 0.
    pub async fn check_all(&self) -> RecoveryOutcome {
        let Ok(_pass) = self.recovery_gate.try_lock() else {
            return RecoveryOutcome::InProgress;
        };
        let targets: Vec<(String, Arc<dyn RecoveryProbe>)> = self
            .probes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let skipped = self
            .state
            .lock()
            .components
            .keys()
            .filter(|name| !self.probes.contains_key(name.as_str()))
            .cloned()
            .collect();
        RecoveryOutcome::Completed(self.run_pass(0, targets, skipped).await)
    }

    async fn run_pass(
        &self,
        attempt: u32,
        targets: Vec<(String, Arc<dyn RecoveryProbe>)>,
        skipped: Vec<String>,
    ) -> RecoveryReport {
        for name in &skipped {
            tracing::debug!(component = %name, "No recovery probe registered; skipping");
        }
        tracing::info!(attempt, targets = targets.len(), "Starting probe pass");

        let results = join_all(
            targets
                .into_iter()
                .map(|(name, probe)| self.run_probe(name, probe)),
        )
        .await;

        let mut report = RecoveryReport {
            attempt,
            skipped,
            ..RecoveryReport::default()
        };
        for result in results {
            match result {
                Ok(name) => report.recovered.push(name),
                Err(failure) => report.failed.push(failure),
            }
        }
        report.recovered.sort();

        tracing::info!(
            attempt,
            recovered = report.recovered.len(),
            failed = report.failed.len(),
            "Probe pass finished"
        );
        report
    }

    fn recovery_targets(
        &self,
        component: Option<&str>,
    ) -> (Vec<(String, Arc<dyn RecoveryProbe>)>, Vec<String>) {
        let names: Vec<String> = match component {
            Some(name) => vec![name.to_string()],
            None => self
                .state
                .lock()
                .components
                .values()
                .filter(|c| !c.is_operational())
                .map(|c| c.name.clone())
                .collect(),
        };

        let mut targets = Vec::new();
        let mut skipped = Vec::new();
        for name in names {
            let probe = self.probes.get(&name).map(|p| p.value().clone());
            match probe {
                Some(probe) => targets.push((name, probe)),
                None => skipped.push(name),
            }
        }
        (targets, skipped)
    }

    async fn run_probe(
        &self,
        name: String,
        probe: Arc<dyn RecoveryProbe>,
    ) -> Result<String, ProbeFailure> {
        let started = Instant::now();
        let result = match with_timeout(self.probe_timeout, probe.probe()).await {
            Ok(result) => result,
            Err(timeout) => Err(ProbeError::from(timeout)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                tracing::info!(component = %name, elapsed_ms, "Recovery probe succeeded");
                self.update_status(ComponentUpdate::operational(name.clone()));
                Ok(name)
            }
            Err(e) => {
                tracing::warn!(component = %name, elapsed_ms, error = %e, "Recovery probe failed");
                self.record_probe_failure(&name, &e);
                Err(ProbeFailure {
                    component: name,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Keep the component non-operational, carrying its fallback details forward.
    fn record_probe_failure(&self, name: &str, err: &ProbeError) {
        let previous = self.component(name);
        let status = match previous.as_ref().map(|c| c.status) {
            Some(ComponentStatus::Unavailable) => ComponentStatus::Unavailable,
            _ => ComponentStatus::Degraded,
        };
        let mut update =
            ComponentUpdate::new(name, status).with_reason(format!("recovery probe failed: {}", err));
        if let Some(prev) = previous {
            update.fallback_active = prev.fallback_active;
            update.fallback_type = prev.fallback_type;
            update.recovery_actions = prev.recovery_actions;
        }
        self.update_status(update);
    }
}

fn log_transition(previous: Option<ComponentStatus>, next: &ComponentState) {
    let previous = previous.unwrap_or(ComponentStatus::Operational);
    let reason = next.degradation_reason.as_deref().unwrap_or("unspecified");
    match (previous, next.status) {
        (ComponentStatus::Unavailable, ComponentStatus::Unavailable)
        | (ComponentStatus::Degraded, ComponentStatus::Degraded)
        | (ComponentStatus::Operational, ComponentStatus::Operational) => {
            tracing::debug!(component = %next.name, status = %next.status, "Component status refreshed");
        }
        (_, ComponentStatus::Unavailable) => {
            tracing::error!(
                component = %next.name,
                reason,
                impact = %next.impact_description,
                "Component unavailable"
            );
        }
        (ComponentStatus::Operational, ComponentStatus::Degraded) => {
            tracing::warn!(
                component = %next.name,
                reason,
                fallback = ?next.fallback_type,
                "Component degraded"
            );
        }
        (ComponentStatus::Unavailable, ComponentStatus::Degraded) => {
            tracing::info!(component = %next.name, reason, "Component partially recovered");
        }
        (_, ComponentStatus::Operational) => {
            tracing::info!(component = %next.name, from = %previous, "Component recovered");
        }
    }
}

fn build_status(state: &RegistryState) -> SystemStatus {
    let mut degraded_components = Vec::new();
    let mut operational_components = Vec::new();
    for component in state.components.values() {
        if component.is_operational() {
            operational_components.push(component.name.clone());
        } else {
            degraded_components.push(component.clone());
        }
    }

    let mut affected_features: Vec<String> = Vec::new();
    let mut recovery_suggestions: Vec<String> = Vec::new();
    for component in &degraded_components {
        for feature in features::affected_features(&component.name) {
            push_unique(&mut affected_features, feature);
        }
        for action in &component.recovery_actions {
            push_unique(&mut recovery_suggestions, action);
        }
    }

    SystemStatus {
        degradation_level: state.level,
        is_degraded: state.level.is_degraded(),
        degradation_start_time: state.degradation_start,
        message: status_message(state.level, &degraded_components),
        degraded_components,
        operational_components,
        affected_features,
        recovery_suggestions,
        generated_at: Utc::now(),
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

fn status_message(level: DegradationLevel, degraded: &[ComponentState]) -> String {
    if degraded.is_empty() {
        return "All systems operational".to_string();
    }
    let names: Vec<&str> = degraded.iter().map(|c| c.name.as_str()).collect();
    format!(
        "Running with {} degradation; impaired components: {}",
        level,
        names.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::features::{CACHE, STORE, WORKERS};

    fn registry() -> ComponentHealthRegistry {
        ComponentHealthRegistry::with_limits(3, Duration::from_millis(200))
    }

    #[test]
    fn test_scenario_store_unavailable_is_severe() {
        let registry = registry();
        registry.register(CACHE, ComponentStatus::Operational, "Caching disabled");
        registry.register(STORE, ComponentStatus::Operational, "Sessions not persisted");
        registry.update_status(ComponentUpdate::unavailable(STORE, "disk full"));

        let status = registry.status();
        assert_eq!(status.degradation_level, DegradationLevel::Severe);
        assert!(status.is_degraded);
        assert!(status.degradation_start_time.is_some());
        assert_eq!(status.operational_components, vec![CACHE.to_string()]);
        assert_eq!(status.degraded_components[0].degradation_reason.as_deref(), Some("disk full"));
        for feature in features::affected_features(STORE) {
            assert!(status.affected_features.iter().any(|f| f == feature));
        }
        assert!(status.message.contains(STORE));
        assert!(!registry.is_feature_available("session_persistence"));
        assert!(registry.is_feature_available("query_cache"));
    }

    #[test]
    fn test_unknown_features_and_components_fail_open() {
        let registry = registry();
        assert!(registry.is_feature_available("knowledge_graph"));
        assert!(registry.is_feature_available("no_such_feature"));
    }

    #[test]
    fn test_degraded_component_keeps_feature_available() {
        let registry = registry();
        registry.register(WORKERS, ComponentStatus::Operational, "");
        registry.update_status(ComponentUpdate::degraded(WORKERS, "queue backlog"));
        assert!(registry.is_feature_available("background_jobs"));

        registry.update_status(ComponentUpdate::unavailable(WORKERS, "no workers"));
        assert!(!registry.is_feature_available("background_jobs"));
    }

    #[test]
    fn test_operational_update_clears_fallback() {
        let registry = registry();
        registry.update_status(ComponentUpdate::operational(STORE).with_fallback("volatile"));
        let state = registry.component(STORE).unwrap();
        assert!(!state.fallback_active);
        assert!(state.fallback_type.is_none());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = registry();
        registry.register(CACHE, ComponentStatus::Operational, "first");
        registry.update_status(ComponentUpdate::degraded(CACHE, "slow"));
        registry.register(CACHE, ComponentStatus::Operational, "second");

        let state = registry.component(CACHE).unwrap();
        assert_eq!(state.status, ComponentStatus::Degraded);
        assert_eq!(state.impact_description, "first");
    }

    #[test]
    fn test_level_normal_iff_all_operational() {
        let registry = registry();
        registry.register(CACHE, ComponentStatus::Operational, "");
        registry.register(STORE, ComponentStatus::Operational, "");
        registry.register(WORKERS, ComponentStatus::Operational, "");

        let updates = [
            ComponentUpdate::degraded(CACHE, "slow"),
            ComponentUpdate::unavailable(WORKERS, "gone"),
            ComponentUpdate::operational(CACHE),
            ComponentUpdate::degraded(STORE, "fallback").with_fallback("volatile"),
            ComponentUpdate::operational(WORKERS),
            ComponentUpdate::operational(STORE),
        ];
        for update in updates {
            registry.update_status(update);
            let all_operational = [CACHE, STORE, WORKERS]
                .iter()
                .all(|n| registry.component(n).unwrap().is_operational());
            assert_eq!(registry.level() == DegradationLevel::Normal, all_operational);
        }
        assert!(registry.status().degradation_start_time.is_none());
    }

    #[test]
    fn test_degradation_start_survives_level_changes() {
        let registry = registry();
        registry.register(CACHE, ComponentStatus::Operational, "");
        registry.register(STORE, ComponentStatus::Operational, "");
        registry.register(WORKERS, ComponentStatus::Operational, "");

        registry.update_status(ComponentUpdate::degraded(CACHE, "slow"));
        let started = registry.status().degradation_start_time.unwrap();
        assert_eq!(registry.level(), DegradationLevel::Partial);

        registry.update_status(ComponentUpdate::unavailable(STORE, "disk"));
        assert_eq!(registry.level(), DegradationLevel::Severe);
        assert_eq!(registry.status().degradation_start_time, Some(started));
    }

    #[test]
    fn test_recovery_suggestions_deduplicated() {
        let registry = registry();
        registry.update_status(
            ComponentUpdate::degraded(CACHE, "timeout").with_recovery_actions(["Check network", "Restart cache"]),
        );
        registry.update_status(
            ComponentUpdate::unavailable(WORKERS, "down").with_recovery_actions(["Check network"]),
        );
        let status = registry.status();
        assert_eq!(status.recovery_suggestions, vec!["Check network", "Restart cache"]);
    }
}
