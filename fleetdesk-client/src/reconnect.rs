use std::time::Duration;

use shared::config::ReconnectConfig;

/// Exponential backoff schedule for [`crate::connection::ConnectionManager::reconnect`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            enabled: config.enabled,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
        }
    }

    /// Manual recovery only.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay to wait before `attempt` (1-based), capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let scaled = self.initial_delay.as_secs_f64() * factor;
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            multiplier: 2.0,
            max_attempts: 6,
        }
    }

    #[test]
    fn delays_grow_exponentially_until_capped() {
        let policy = policy();
        let delays: Vec<u128> = (1..=6).map(|a| policy.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn huge_attempt_numbers_stay_capped() {
        assert_eq!(policy().delay_for(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn multiplier_below_one_never_shrinks_delay() {
        let policy = ReconnectPolicy {
            multiplier: 0.5,
            ..policy()
        };
        assert_eq!(policy.delay_for(4), Duration::from_millis(100));
    }

    #[test]
    fn defaults_follow_configuration_defaults() {
        let policy = ReconnectPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, 5);
        assert!(!ReconnectPolicy::disabled().enabled);
    }
}
