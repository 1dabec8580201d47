//! Per-component health state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of a single dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Operational,
    /// Working, but impaired or running on a fallback.
    Degraded,
    Unavailable,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Operational => "operational",
            ComponentStatus::Degraded => "degraded",
            ComponentStatus::Unavailable => "unavailable",
        }
    }

    /// Gauge value: 0 operational, 1 degraded, 2 unavailable.
    pub fn severity(&self) -> u8 {
        match self {
            ComponentStatus::Operational => 0,
            ComponentStatus::Degraded => 1,
            ComponentStatus::Unavailable => 2,
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry-owned state of one named component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub name: String,
    pub status: ComponentStatus,
    pub degradation_reason: Option<String>,
    /// Never true while `status` is operational.
    pub fallback_active: bool,
    pub fallback_type: Option<String>,
    pub last_check: DateTime<Utc>,
    /// What users lose when this component is down.
    pub impact_description: String,
    pub recovery_actions: Vec<String>,
}

impl ComponentState {
    pub fn new(name: impl Into<String>, status: ComponentStatus, impact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            degradation_reason: None,
            fallback_active: false,
            fallback_type: None,
            last_check: Utc::now(),
            impact_description: impact.into(),
            recovery_actions: Vec::new(),
        }
    }

    pub fn is_operational(&self) -> bool {
        self.status == ComponentStatus::Operational
    }
}

/// Replacement state for one component, applied by `update_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentUpdate {
    pub name: String,
    pub status: ComponentStatus,
    pub reason: Option<String>,
    pub fallback_active: bool,
    pub fallback_type: Option<String>,
    pub recovery_actions: Vec<String>,
}

impl ComponentUpdate {
    pub fn new(name: impl Into<String>, status: ComponentStatus) -> Self {
        Self {
            name: name.into(),
            status,
            reason: None,
            fallback_active: false,
            fallback_type: None,
            recovery_actions: Vec::new(),
        }
    }

    pub fn operational(name: impl Into<String>) -> Self {
        Self::new(name, ComponentStatus::Operational)
    }

    pub fn degraded(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(name, ComponentStatus::Degraded).with_reason(reason)
    }

    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(name, ComponentStatus::Unavailable).with_reason(reason)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_fallback(mut self, fallback_type: impl Into<String>) -> Self {
        self.fallback_active = true;
        self.fallback_type = Some(fallback_type.into());
        self
    }

    pub fn with_recovery_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recovery_actions = actions.into_iter().map(Into::into).collect();
        self
    }
}
