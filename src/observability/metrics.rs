//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define resilience metrics (component health, store failover, recovery)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `resilience_component_status` (gauge): 0=operational, 1=degraded, 2=unavailable, by component
//! - `resilience_degradation_level` (gauge): 0=normal .. 3=critical
//! - `checkpoint_store_failures_total` (counter): durable failures by operation
//! - `checkpoint_store_fallback_total` (counter): operations served by the volatile store
//! - `checkpoint_store_degraded` (gauge): 1 while routed to the volatile store
//! - `recovery_attempts_total` (counter): recovery passes by outcome
//! - `volatile_checkpoints` (gauge): checkpoints held in memory
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recording before an exporter is installed is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::{ComponentStatus, DegradationLevel};

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_component_status(component: &str, status: ComponentStatus) {
    ::metrics::gauge!("resilience_component_status", "component" => component.to_string())
        .set(f64::from(status.severity()));
}

pub fn record_degradation_level(level: DegradationLevel) {
    ::metrics::gauge!("resilience_degradation_level").set(level.gauge());
}

pub fn record_store_failure(op: &'static str) {
    ::metrics::counter!("checkpoint_store_failures_total", "op" => op).increment(1);
}

pub fn record_store_fallback(op: &'static str) {
    ::metrics::counter!("checkpoint_store_fallback_total", "op" => op).increment(1);
}

pub fn record_store_degraded(degraded: bool) {
    ::metrics::gauge!("checkpoint_store_degraded").set(if degraded { 1.0 } else { 0.0 });
}

pub fn record_recovery_attempt(outcome: &'static str) {
    ::metrics::counter!("recovery_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_volatile_size(checkpoints: usize) {
    ::metrics::gauge!("volatile_checkpoints").set(checkpoints as f64);
}
