//! Retry policy for upstream calls.
//!
//! [`RetryPolicy`] holds the parameters and the delay math. The async loop
//! that sleeps between attempts lives in `parley-providers`, which owns the
//! runtime dependency.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default delay before the first retry in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
/// Default delay multiplier.
pub const DEFAULT_EXP_BASE: f64 = 7.0;
/// Default cap on a single delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Status codes retried by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 4] = [429, 500, 503, 504];

/// Bounded exponential backoff, retrying only configured status codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry (ms)
    pub initial_delay_ms: u64,
    /// Multiplier applied per retry
    pub exp_base: f64,
    /// Cap on any single delay (ms)
    pub max_delay_ms: u64,
    /// Status codes considered transient
    pub retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            exp_base: DEFAULT_EXP_BASE,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the multiplier.
    pub fn with_exp_base(mut self, base: f64) -> Self {
        self.exp_base = base;
        self
    }

    /// Set the cap on any single delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Upper bound on the time spent sleeping between attempts.
    pub fn total_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| self.delay_for_retry(retry))
            .sum()
    }

    /// Replace the retryable status set.
    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Delay before retry number `retry` (0 for the first retry).
    ///
    /// `min(initial_delay * exp_base^retry, max_delay)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.exp_base.max(1.0).powi(retry.min(64) as i32);
        let raw = self.initial_delay_ms as f64 * factor;
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped.round() as u64)
    }

    /// Whether the failure is transient under this policy.
    pub fn is_retryable(&self, error: &GenerationError) -> bool {
        match error {
            GenerationError::Status { status, .. } => self.retryable_status_codes.contains(status),
            _ => false,
        }
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    pub fn should_retry(&self, error: &GenerationError, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts && self.is_retryable(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_demo_configuration() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay_ms, 1000);
        assert!((policy.exp_base - 7.0).abs() < f64::EPSILON);
        assert_eq!(
            policy.retryable_status_codes.iter().copied().collect::<Vec<_>>(),
            vec![429, 500, 503, 504]
        );
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(7000));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(49_000));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(60_000));
        assert_eq!(policy.delay_for_retry(200), Duration::from_millis(60_000));
    }

    #[test]
    fn test_total_delay_sums_every_retry_gap() {
        assert_eq!(RetryPolicy::default().total_delay(), Duration::from_secs(117));
        assert_eq!(RetryPolicy::no_retry().total_delay(), Duration::ZERO);

        let short = RetryPolicy::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(500))
            .with_exp_base(2.0)
            .with_max_delay(Duration::from_millis(800));
        assert_eq!(short.total_delay(), Duration::from_millis(1300));
    }

    #[test]
    fn test_only_configured_statuses_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(&GenerationError::status("m", 503, "busy")));
        assert!(!policy.is_retryable(&GenerationError::status("m", 400, "bad request")));
        assert!(!policy.is_retryable(&GenerationError::Network {
            provider: "m".into(),
            message: "reset".into(),
        }));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::default().with_max_attempts(2);
        let err = GenerationError::status("m", 429, "slow down");
        assert!(policy.should_retry(&err, 1));
        assert!(!policy.should_retry(&err, 2));
    }

    #[test]
    fn test_serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, DEFAULT_INITIAL_DELAY_MS);
    }
}
