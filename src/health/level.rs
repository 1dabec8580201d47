//! System-wide degradation level.
//!
//! # Levels
//! ```text
//! Normal:   nothing degraded or unavailable
//! Critical: more than half of all components unavailable
//! Severe:   any component unavailable, or at least half degraded
//! Partial:  anything else
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::health::component::{ComponentState, ComponentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationLevel {
    Normal,
    Partial,
    Severe,
    Critical,
}

impl DegradationLevel {
    /// Derive the level from the current component states. Pure, no I/O.
    pub fn from_components<'a, I>(components: I) -> Self
    where
        I: IntoIterator<Item = &'a ComponentState>,
    {
        let (mut total, mut degraded, mut unavailable) = (0usize, 0usize, 0usize);
        for component in components {
            total += 1;
            match component.status {
                ComponentStatus::Operational => {}
                ComponentStatus::Degraded => degraded += 1,
                ComponentStatus::Unavailable => unavailable += 1,
            }
        }

        if degraded == 0 && unavailable == 0 {
            DegradationLevel::Normal
        } else if unavailable * 2 > total {
            DegradationLevel::Critical
        } else if unavailable > 0 || degraded * 2 >= total {
            DegradationLevel::Severe
        } else {
            DegradationLevel::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationLevel::Normal => "normal",
            DegradationLevel::Partial => "partial",
            DegradationLevel::Severe => "severe",
            DegradationLevel::Critical => "critical",
        }
    }

    pub fn is_degraded(&self) -> bool {
        *self != DegradationLevel::Normal
    }

    /// Gauge value: 0 normal .. 3 critical.
    pub fn gauge(&self) -> f64 {
        match self {
            DegradationLevel::Normal => 0.0,
            DegradationLevel::Partial => 1.0,
            DegradationLevel::Severe => 2.0,
            DegradationLevel::Critical => 3.0,
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(statuses: &[ComponentStatus]) -> Vec<ComponentState> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| ComponentState::new(format!("c{}", i), *s, ""))
            .collect()
    }

    fn level(statuses: &[ComponentStatus]) -> DegradationLevel {
        DegradationLevel::from_components(&states(statuses))
    }

    use ComponentStatus::{Degraded as D, Operational as O, Unavailable as U};

    #[test]
    fn test_normal_when_all_operational() {
        assert_eq!(level(&[]), DegradationLevel::Normal);
        assert_eq!(level(&[O, O, O]), DegradationLevel::Normal);
    }

    #[test]
    fn test_partial_for_minor_degradation() {
        assert_eq!(level(&[D, O, O]), DegradationLevel::Partial);
    }

    #[test]
    fn test_severe_rules() {
        assert_eq!(level(&[U, O, O, O]), DegradationLevel::Severe);
        assert_eq!(level(&[D, D, O, O]), DegradationLevel::Severe);
        // Exactly half unavailable is severe, not critical.
        assert_eq!(level(&[U, O]), DegradationLevel::Severe);
        assert_eq!(level(&[U, U, D, O]), DegradationLevel::Severe);
    }

    #[test]
    fn test_critical_when_majority_unavailable() {
        assert_eq!(level(&[U, U, O]), DegradationLevel::Critical);
        assert_eq!(level(&[U]), DegradationLevel::Critical);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DegradationLevel::Severe).unwrap(), "\"severe\"");
    }
}
