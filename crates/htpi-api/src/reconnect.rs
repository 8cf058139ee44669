//! Reconnection backoff shared by every connection-owning component.
//!
//! One policy maps an attempt number to a delay and bounds the number of
//! attempts. The delay doubles from `initial_delay` and is capped at
//! `max_delay`, so it never decreases from one attempt to the next.

use std::time::Duration;

/// Exponential backoff configuration for channel reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the second connection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum connection attempts before giving up. Default: 5.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait after `attempt` consecutive failures (1-based).
    ///
    /// `delay = min(initial * 2^(attempt - 1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1_u32 << exponent;
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether `failed_attempts` has used up the policy.
    pub fn exhausted(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn backoff_doubles() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_monotonic_and_capped() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            max_attempts: 64,
        };

        let mut previous = Duration::ZERO;
        for attempt in 1..=64 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(previous, policy.max_delay);
    }

    #[test]
    fn attempt_zero_uses_initial_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), policy.initial_delay);
    }

    #[test]
    fn exhaustion_is_inclusive() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            ..ReconnectPolicy::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }
}
