// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry policy for producer invocations.
//!
//! Thrown errors and timeouts are transient: they retry up to the attempt
//! budget with bounded exponential backoff. A producer that *returns* a
//! failed status is permanent and does not retry.

use std::time::Duration;

/// Attempt budget and backoff schedule for transient producer failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (so 3 means two retries).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy with near-zero delays, for tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        }
    }

    /// Delay before the retry following `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_three_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(4), Duration::from_millis(350));
    }

    #[test]
    fn immediate_policy_keeps_attempt_budget() {
        let policy = RetryPolicy::immediate();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.delay_for(3) <= Duration::from_millis(1));
    }
}
