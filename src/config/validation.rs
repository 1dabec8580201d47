//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds, limits and intervals > 0)
//! - Detect duplicate or reserved component names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ResilienceConfig;
use crate::health::features::STORE;

/// Ten years, in hours.
pub const MAX_VOLATILE_AGE_HOURS: u64 = 87_600;
/// One hundred years, in days.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// A single semantic problem, tied to the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }

    if config.store.path.trim().is_empty() {
        errors.push(ValidationError::new("store.path", "must not be empty"));
    }
    if config.store.failure_threshold == 0 {
        errors.push(ValidationError::new("store.failure_threshold", "must be at least 1"));
    }

    if config.volatile.max_per_thread == 0 {
        errors.push(ValidationError::new("volatile.max_per_thread", "must be at least 1"));
    }
    if config.volatile.max_age_hours == 0 {
        errors.push(ValidationError::new("volatile.max_age_hours", "must be at least 1"));
    } else if config.volatile.max_age_hours > MAX_VOLATILE_AGE_HOURS {
        errors.push(ValidationError::new(
            "volatile.max_age_hours",
            format!("must not exceed {}", MAX_VOLATILE_AGE_HOURS),
        ));
    }

    if config.recovery.probe_timeout_ms == 0 {
        errors.push(ValidationError::new("recovery.probe_timeout_ms", "must be at least 1"));
    }
    if config.recovery.interval_secs == 0 {
        errors.push(ValidationError::new("recovery.interval_secs", "must be at least 1"));
    }
    if config.recovery.backoff_base_ms > config.recovery.backoff_max_ms {
        errors.push(ValidationError::new(
            "recovery.backoff_base_ms",
            "must not exceed recovery.backoff_max_ms",
        ));
    }

    if config.maintenance.enabled && config.maintenance.interval_secs == 0 {
        errors.push(ValidationError::new("maintenance.interval_secs", "must be at least 1"));
    }
    if config.maintenance.retention_days > MAX_RETENTION_DAYS {
        errors.push(ValidationError::new(
            "maintenance.retention_days",
            format!("must not exceed {}", MAX_RETENTION_DAYS),
        ));
    }
    if config.maintenance.max_per_thread == 0 {
        errors.push(ValidationError::new("maintenance.max_per_thread", "must be at least 1"));
    }

    let mut seen = HashSet::new();
    for (i, component) in config.components.iter().enumerate() {
        let field = format!("components[{}].name", i);
        if component.name.trim().is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
            continue;
        }
        if component.name == STORE {
            errors.push(ValidationError::new(field, "'store' is tracked automatically"));
            continue;
        }
        if !seen.insert(component.name.as_str()) {
            errors.push(ValidationError::new(
                field,
                format!("duplicate component '{}'", component.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
