//! Exponential back-off policy for failed notifications.
//!
//! Delay before retry `n` (1-based attempt count already recorded) is
//! `base × 2^(n-1)`, capped at `cap`. With the defaults (`base = 60s`,
//! `cap = 1h`, `max_attempts = 5`):
//!
//! | Attempts recorded | Next eligible after |
//! |-------------------|---------------------|
//! | 1                 | 1 min               |
//! | 2                 | 2 min               |
//! | 3                 | 4 min               |
//! | 4                 | 8 min               |
//! | 5                 | abandoned           |
//!
//! Other policies follow the same doubling until it reaches `cap`; every
//! later attempt waits exactly `cap` (base 60s with a 10 min cap gives 1, 2,
//! 4, 8, 10, 10 min). The table only covers transient failures. A permanent
//! failure abandons the seq at attempt 1 without consulting the policy.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(60),
            cap: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base,
            cap,
        }
    }

    /// Back-off after `attempt` failures. `attempt == 0` yields zero.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(20);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// `true` once `attempt` failures have been recorded and no more are allowed.
    #[must_use]
    pub fn should_abandon(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    #[must_use]
    pub fn next_eligible_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_for(attempt))
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        now + delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_secs(60), Duration::from_secs(3600))
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(1), Duration::from_secs(60));
        assert_eq!(p.delay_for(2), Duration::from_secs(120));
        assert_eq!(p.delay_for(3), Duration::from_secs(240));
        assert_eq!(p.delay_for(4), Duration::from_secs(480));
    }

    #[test]
    fn delay_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(7), Duration::from_secs(3600));
        assert_eq!(p.delay_for(40), Duration::from_secs(3600));
    }

    #[test]
    fn custom_cap_flattens_the_tail() {
        let p = RetryPolicy::new(8, Duration::from_secs(60), Duration::from_secs(600));
        let minutes: Vec<u64> = (1..=6).map(|n| p.delay_for(n).as_secs() / 60).collect();
        assert_eq!(minutes, vec![1, 2, 4, 8, 10, 10]);
        assert!(!p.should_abandon(6));
    }

    #[test]
    fn abandon_at_max_attempts() {
        let p = policy();
        assert!(!p.should_abandon(4));
        assert!(p.should_abandon(5));
        assert!(p.should_abandon(6));
    }

    #[test]
    fn next_eligible_adds_delay() {
        let p = policy();
        let now = Utc::now();
        assert_eq!(p.next_eligible_at(2, now), now + chrono::Duration::minutes(2));
    }
}
