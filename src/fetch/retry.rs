//! Retry logic with exponential backoff for transient fetch failures.
//!
//! When an attempt fails, its [`AttemptError`] is classified into a
//! [`FailureType`]:
//! - [`FailureType::NonRetriable`] - malformed input (unsupported method,
//!   invalid URL/header/body). Retrying cannot help.
//! - [`FailureType::Retriable`] - everything else (connection failures,
//!   timeouts, body read or write faults).
//!
//! The [`RetryPolicy`] then decides whether another attempt is allowed and
//! how long to wait first. Delays grow as `base * 2^attempt` where `attempt`
//! is the 1-indexed attempt that just failed, so with the default 1 second
//! base the waits are 2s, 4s, 8s, ...
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use fetcher_core::fetch::{FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! match policy.should_retry(FailureType::Retriable, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(2));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use super::constants::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
use super::error::{AttemptError, FetchError};

/// Largest exponent applied to the base delay; keeps the shift from overflowing.
const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Classification of attempt failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on another attempt.
    Retriable,
    /// Will fail the same way every time.
    NonRetriable,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// The attempt number that will run next (1-indexed).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Attempt ceiling and backoff base.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Multiplied by `2^attempt` to get the wait before the next attempt.
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is raised to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Creates a policy with a custom attempt ceiling and the default base delay.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self::new(max_attempts, DEFAULT_BASE_DELAY)
    }

    /// Returns the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff base.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Decides what to do after `attempt` (1-indexed) failed with `failure_type`.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::NonRetriable {
            return RetryDecision::DoNotRetry {
                reason: "non-retriable error".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.backoff_delay(attempt),
            attempt: attempt + 1,
        }
    }

    /// `base * 2^attempt`, saturating.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor)
    }
}

/// Classifies an attempt failure.
///
/// | Error | Type |
/// |-------|------|
/// | UnsupportedMethod | NonRetriable |
/// | InvalidUrl | NonRetriable |
/// | InvalidHeader | NonRetriable |
/// | InvalidBody | NonRetriable |
/// | Network | Retriable |
/// | Timeout | Retriable |
/// | Io | Retriable |
/// | Session | Retriable |
/// | Response | Retriable |
#[must_use]
pub fn classify_error(error: &AttemptError) -> FailureType {
    match error {
        AttemptError::UnsupportedMethod { .. }
        | AttemptError::InvalidUrl { .. }
        | AttemptError::InvalidHeader { .. }
        | AttemptError::InvalidBody { .. } => FailureType::NonRetriable,

        AttemptError::Network { .. }
        | AttemptError::Timeout { .. }
        | AttemptError::Io { .. }
        | AttemptError::Session { .. }
        | AttemptError::Response { .. } => FailureType::Retriable,
    }
}

/// Runs `attempt_fn` until it succeeds, fails non-retriably, or the policy
/// runs out of attempts.
///
/// `attempt_fn` receives the 1-indexed attempt number. Attempts never overlap.
///
/// # Errors
///
/// Returns [`FetchError`] for `url` carrying the last attempt's error message
/// and the number of attempts made.
#[instrument(skip(policy, attempt_fn), fields(max_attempts = policy.max_attempts()))]
pub async fn retry_with_backoff<T, F, Fut>(
    url: &str,
    policy: &RetryPolicy,
    mut attempt_fn: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "starting attempt");

        let err = match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let failure_type = classify_error(&err);
        match policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                warn!(
                    url,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    next_attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "retrying fetch"
                );
                tokio::time::sleep(delay).await;
            }
            RetryDecision::DoNotRetry { reason } => {
                if failure_type == FailureType::NonRetriable {
                    error!(url, error = %err, "non-retriable error");
                } else {
                    error!(url, attempts = attempt, %reason, error = %err, "fetch failed");
                }
                return Err(FetchError::new(url, err.to_string()).with_attempts(attempt));
            }
        }
    }
}
