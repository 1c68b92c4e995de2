//! Fetcher configuration.

use std::time::Duration;

use thiserror::Error;

use super::constants::{
    DEFAULT_BASE_DELAY, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS,
    default_user_agent,
};
use super::retry::RetryPolicy;

/// Invalid configuration value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Concurrency must be at least 1.
    #[error("invalid concurrency value {value}: must be at least 1")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// Timeout must be a positive, finite number of seconds.
    #[error("invalid timeout {value}s: must be a positive number of seconds")]
    InvalidTimeout {
        /// The rejected value.
        value: f64,
    },

    /// At least one attempt is required.
    #[error("invalid max attempts {value}: must be at least 1")]
    InvalidMaxAttempts {
        /// The rejected value.
        value: u32,
    },
}

/// Immutable settings for a [`super::Fetcher`].
///
/// # Default Values
///
/// - `concurrency`: 1
/// - `timeout`: 10 seconds per attempt
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `user_agent`: `resource-fetcher/<version>`
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    concurrency: usize,
    timeout: Duration,
    max_attempts: u32,
    base_delay: Duration,
    user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            user_agent: default_user_agent(),
        }
    }
}

impl FetcherConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `concurrency` or `max_attempts` is zero,
    /// or `timeout_secs` is not a positive finite number.
    pub fn new(concurrency: usize, timeout_secs: f64, max_attempts: u32) -> Result<Self, ConfigError> {
        if concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency { value: concurrency });
        }
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            return Err(ConfigError::InvalidTimeout {
                value: timeout_secs,
            });
        }
        if max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts {
                value: max_attempts,
            });
        }

        Ok(Self {
            concurrency,
            timeout: Duration::from_secs_f64(timeout_secs),
            max_attempts,
            ..Self::default()
        })
    }

    /// Overrides the backoff base (`base * 2^attempt`).
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Overrides the User-Agent sent by default.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Maximum concurrent fetches.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Maximum attempts per fetch.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff base.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Default User-Agent.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The retry policy implied by this configuration.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay)
    }
}
