//! Bounded exponential backoff shared by every source fetcher.

use super::provider::FetchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for one fetch batch.
///
/// Delay before retry `k` (1-based) is `base_delay_ms * factor^(k-1)`,
/// capped at `max_delay_ms`. Permanent errors are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            factor: 2,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no sleeping. For tests and offline replays.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            factor: 1,
            max_delay_ms: 0,
        }
    }

    /// Delay to wait before the `retry`-th retry (1-based).
    pub fn delay_before(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let multiplier = u64::from(self.factor).saturating_pow(retry - 1);
        let ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Returns the last error on
    /// exhaustion.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Result<T, FetchError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "fetch succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.delay_before(attempt);
                    warn!(
                        label,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient fetch failure, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1_000,
            factor: 2,
            max_delay_ms: 3_000,
        };
        assert_eq!(policy.delay_before(1), Duration::from_secs(1));
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(3));
        assert_eq!(policy.delay_before(10), Duration::from_secs(3));
    }

    #[test]
    fn transient_errors_are_retried_until_success() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result = policy.run("test", |_| {
            calls += 1;
            if calls < 3 {
                Err(FetchError::Transient("reset".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhaustion_returns_last_error() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("test", |attempt| {
            calls += 1;
            Err(FetchError::Transient(format!("attempt {attempt}")))
        });
        assert_eq!(result, Err(FetchError::Transient("attempt 3".into())));
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("test", |_| {
            calls += 1;
            Err(FetchError::Permanent("malformed".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy::immediate(0);
        let mut calls = 0;
        let _: Result<(), _> = policy.run("test", |_| {
            calls += 1;
            Err(FetchError::Transient("x".into()))
        });
        assert_eq!(calls, 1);
    }
}
