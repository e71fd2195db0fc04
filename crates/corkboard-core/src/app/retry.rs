//! Retry policy for individual position mutations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::SourceError;

/// Retry policy for failed remote mutations.
///
/// The default is a single attempt: reorder mutations are fire-and-forget and
/// the next accepted snapshot heals any divergence. Raising `max_attempts`
/// adds a bounded local retry with exponential backoff for transient errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per mutation, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fire_and_forget()
    }
}

impl RetryPolicy {
    /// One attempt, no retry.
    pub fn fire_and_forget() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 200,
            multiplier: 2.0,
        }
    }

    pub fn with_backoff(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX),
            multiplier,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay before the next try, given the number of attempts already made.
    ///
    /// `delay = base_delay * multiplier^(attempts - 1)`
    ///
    /// Example with base_delay=200ms, multiplier=2.0:
    /// - after attempt 1: 200ms
    /// - after attempt 2: 400ms
    /// - after attempt 3: 800ms
    ///
    /// A negative or NaN product is zero; an overflowing one is `Duration::MAX`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay().as_secs_f64();
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = (base_secs * self.multiplier.powi(exponent)).max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Whether another attempt should follow a failure after `attempts` tries.
    pub fn should_retry(&self, attempts: u32, error: &SourceError) -> bool {
        error.is_transient() && attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_does_not_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1, &SourceError::Unavailable("down".into())));
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::with_backoff(5, Duration::from_millis(200), 2.0);

        assert_eq!(policy.next_delay(1), Duration::from_millis(200));
        assert_eq!(policy.next_delay(2), Duration::from_millis(400));
        assert_eq!(policy.next_delay(3), Duration::from_millis(800));
    }

    #[rstest]
    #[case::negative_multiplier(-2.0, 2, Duration::ZERO)]
    #[case::nan_multiplier(f64::NAN, 2, Duration::ZERO)]
    #[case::overflow(f64::MAX, 3, Duration::MAX)]
    #[case::infinite(f64::INFINITY, 2, Duration::MAX)]
    fn degenerate_multipliers_do_not_panic(
        #[case] multiplier: f64,
        #[case] attempts: u32,
        #[case] expected: Duration,
    ) {
        let policy = RetryPolicy::with_backoff(5, Duration::from_millis(200), multiplier);
        assert_eq!(policy.next_delay(attempts), expected);
    }

    #[test]
    fn negative_multiplier_from_config_is_usable() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts": 3, "multiplier": -1.5}"#).unwrap();
        assert_eq!(policy.next_delay(1), Duration::from_millis(200));
        assert_eq!(policy.next_delay(2), Duration::ZERO);
    }

    #[test]
    fn only_transient_errors_are_retried() {
        let policy = RetryPolicy::with_backoff(3, Duration::from_millis(10), 2.0);

        assert!(policy.should_retry(1, &SourceError::Unavailable("timeout".into())));
        assert!(policy.should_retry(2, &SourceError::Unavailable("timeout".into())));
        assert!(!policy.should_retry(3, &SourceError::Unavailable("timeout".into())));
        assert!(!policy.should_retry(1, &SourceError::Rejected("constraint".into())));
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 4}"#).unwrap();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay_ms, 200);
        assert_eq!(policy.multiplier, 2.0);
    }
}
