//! Fixed-interval retry policy for the link lifecycle
//!
//! The link retries indefinitely by design; there is no attempt ceiling.
//! The counter exists for diagnostics and resets on the first success.

use std::time::Duration;

/// Default backoff between link connect attempts
pub const DEFAULT_LINK_BACKOFF: Duration = Duration::from_secs(5);

/// Fixed-interval retry policy with a consecutive-failure counter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay between attempts
    interval: Duration,
    /// Consecutive failed attempts since the last success
    attempts: u32,
}

impl RetryPolicy {
    /// Create a policy with the given fixed interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            attempts: 0,
        }
    }

    /// Record a failed attempt and return the new consecutive count
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Record a success, resetting the consecutive-failure counter
    pub fn record_success(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failed attempts since the last success
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait before the next attempt (fixed)
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments_per_failure() {
        let mut policy = RetryPolicy::new(Duration::from_secs(5));
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.record_failure(), 1);
        assert_eq!(policy.record_failure(), 2);
        assert_eq!(policy.record_failure(), 3);
    }

    #[test]
    fn test_counter_resets_on_success() {
        let mut policy = RetryPolicy::default();
        policy.record_failure();
        policy.record_failure();
        policy.record_success();
        assert_eq!(policy.attempts(), 0);
        // Counting starts fresh after a success
        assert_eq!(policy.record_failure(), 1);
    }

    #[test]
    fn test_interval_is_fixed() {
        let mut policy = RetryPolicy::new(Duration::from_secs(5));
        for _ in 0..10 {
            policy.record_failure();
            assert_eq!(policy.interval(), Duration::from_secs(5));
        }
    }
}
