//! Bounded exponential backoff for transient remote failures.
//!
//! Only [`RemoteError::Transient`] is retried. Anything else is returned
//! after the first attempt. When attempts run out the last transient error
//! is returned, so callers can tell "gave up" (`is_transient()`) apart from
//! "rejected".

use std::time::Duration;

use crate::api::Operation;
use crate::error::RemoteError;

/// Retry schedule: `initial_backoff * 2^(n-1)` before attempt `n + 1`,
/// capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `call` under `policy`.
pub fn with_retry<T, F>(policy: &RetryPolicy, operation: Operation, call: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Result<T, RemoteError>,
{
    with_retry_and_check(policy, operation, call, || None)
}

/// Run `call` under `policy`, consulting `check` after every transient
/// failure that will be retried. If `check` returns a value the call is
/// considered to have taken effect and that value is returned instead of
/// retrying. Used to avoid repeating a create whose response was lost.
pub fn with_retry_and_check<T, F, C>(
    policy: &RetryPolicy,
    operation: Operation,
    mut call: F,
    mut check: C,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Result<T, RemoteError>,
    C: FnMut() -> Option<T>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = policy.backoff_after(attempt);
                tracing::warn!(
                    "{operation} attempt {attempt}/{attempts} failed: {err}; retrying in {}ms",
                    delay.as_millis()
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                if let Some(value) = check() {
                    tracing::info!("{operation} took effect despite the error; not retrying");
                    return Ok(value);
                }
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::warn!("{operation} giving up after {attempts} attempt(s): {err}");
                }
                return Err(err);
            }
        }
    }
}
