//! Fixed-interval retry budget shared by token fetch and session checkout

use std::ops::RangeInclusive;
use std::time::Duration;

/// A bounded number of attempts separated by a fixed delay.
///
/// Attempts are numbered from 1. The delay is applied between attempts,
/// never before the first one, so the worst-case wait is
/// `(max_attempts - 1) * interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Attempt numbers `1..=max_attempts`.
    pub fn attempts(&self) -> RangeInclusive<u32> {
        1..=self.max_attempts
    }

    /// True when `attempt` is the final one in the budget.
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Upper bound on time spent sleeping across the whole budget.
    pub fn max_total_wait(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_one_based_and_bounded() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        assert_eq!(policy.attempts().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(!policy.is_last(2));
        assert!(policy.is_last(3));
    }

    #[test]
    fn zero_attempts_yields_empty_range() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.attempts().count(), 0);
        assert_eq!(policy.max_total_wait(), Duration::ZERO);
    }

    #[test]
    fn total_wait_counts_gaps_between_attempts() {
        let policy = RetryPolicy::new(10, Duration::from_millis(300));
        assert_eq!(policy.max_total_wait(), Duration::from_millis(2700));
    }
}
