//! Delay between failed automatic recovery passes.
//!
//! The delay doubles per consecutive failed pass, starting at `backoff_base_ms` and
//! capped at `backoff_max_ms`. Jitter only shortens it, by up to a tenth, so the cap
//! holds and replicas sharing a config drift apart.

use std::time::Duration;

use rand::Rng;

use crate::config::RecoveryConfig;

/// Delay to wait after `failed_passes` consecutive failed passes.
pub fn recovery_backoff(failed_passes: u32, config: &RecoveryConfig) -> Duration {
    let Some(doublings) = failed_passes.checked_sub(1) else {
        return Duration::ZERO;
    };
    let factor = 1u64.checked_shl(doublings).unwrap_or(u64::MAX);
    let ceiling = config
        .backoff_base_ms
        .saturating_mul(factor)
        .min(config.backoff_max_ms);

    let spread = ceiling / 10;
    let shave = rand::thread_rng().gen_range(0..=spread);
    Duration::from_millis(ceiling - shave)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_ms: u64, max_ms: u64) -> RecoveryConfig {
        RecoveryConfig {
            backoff_base_ms: base_ms,
            backoff_max_ms: max_ms,
            ..RecoveryConfig::default()
        }
    }

    #[test]
    fn test_no_delay_before_first_failure() {
        assert_eq!(recovery_backoff(0, &config(500, 30_000)), Duration::ZERO);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = config(500, 30_000);

        let first = recovery_backoff(1, &config).as_millis();
        assert!((450..=500).contains(&first));

        let third = recovery_backoff(3, &config).as_millis();
        assert!((1_800..=2_000).contains(&third));

        for failed_passes in [20, 64, 65, u32::MAX] {
            let capped = recovery_backoff(failed_passes, &config).as_millis();
            assert!((27_000..=30_000).contains(&capped));
        }
    }

    #[test]
    fn test_tiny_base_has_no_jitter() {
        assert_eq!(recovery_backoff(1, &config(5, 30_000)), Duration::from_millis(5));
    }
}
