use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Retry policy for failed task executions
///
/// Pure computation: the worker asks it when a failed task should run again
/// and whether the failure was the last one allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after which a task is dead-lettered
    pub max_attempts: u32,

    /// Delay before the first retry
    pub backoff_initial: Duration,

    /// Multiplier applied per further attempt (typically 2.0)
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_initial: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            backoff_initial,
            backoff_factor,
        }
    }

    /// True once `attempts` failures exhaust the policy.
    pub fn is_terminal(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Backoff after the `attempts`-th failure.
    ///
    /// `initial * factor^(attempts - 1)`, saturating at `u64::MAX` milliseconds.
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let initial_ms = self.backoff_initial.as_millis() as f64;
        let millis = initial_ms * self.backoff_factor.powi(exponent);

        if !millis.is_finite() || millis >= u64::MAX as f64 {
            Duration::from_millis(u64::MAX)
        } else {
            Duration::from_millis(millis.max(0.0) as u64)
        }
    }

    /// When a task that has failed `attempts` times becomes due again.
    pub fn next_execute_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let millis = i64::try_from(self.delay(attempts).as_millis()).unwrap_or(i64::MAX);

        TimeDelta::try_milliseconds(millis)
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_initial: Duration::from_millis(1000),
            backoff_factor: 2.0,
        }
    }
}
