//! Exponential poll backoff.
//!
//! `delay = min(base * multiplier^(failures - 1), max)` and zero once the
//! target succeeds again.

use std::time::Duration;

use crate::config::Config;

/// Default base backoff duration (30 seconds).
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(30);

/// Default maximum backoff duration (5 minutes).
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Default growth factor per consecutive failure.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: i32 = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_BACKOFF,
            multiplier: DEFAULT_MULTIPLIER,
            max: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base,
            multiplier,
            max,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            base: Duration::try_from_secs_f64(config.backoff_base_seconds).unwrap_or(defaults.base),
            multiplier: config.backoff_multiplier,
            max: Duration::try_from_secs_f64(config.backoff_max_seconds).unwrap_or(defaults.max),
        }
    }

    /// Backoff after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = (failures - 1).min(MAX_EXPONENT as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_secs(30));
        assert_eq!(policy.delay(2), Duration::from_secs(60));
        assert_eq!(policy.delay(3), Duration::from_secs(120));
        assert_eq!(policy.delay(4), Duration::from_secs(240));
        assert_eq!(policy.delay(5), Duration::from_secs(300));
        assert_eq!(policy.delay(1000), Duration::from_secs(300));
    }

    #[test]
    fn test_multiplier_of_one_is_constant() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), 1.0, Duration::from_secs(60));
        assert_eq!(policy.delay(1), Duration::from_secs(5));
        assert_eq!(policy.delay(20), Duration::from_secs(5));
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_yaml_str(
            "backoff_base_seconds: 0.5\nbackoff_multiplier: 3\nbackoff_max_seconds: 10\n",
        )
        .unwrap();
        let policy = BackoffPolicy::from_config(&config);
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1500));
        assert_eq!(policy.delay(4), Duration::from_secs(10));
    }
}
