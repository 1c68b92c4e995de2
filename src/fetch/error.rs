//! Error types for the fetch module.
//!
//! Two layers are defined here:
//! - [`AttemptError`] describes why a single attempt failed and feeds the
//!   retry classification in [`super::retry`].
//! - [`FetchError`] is the terminal error surfaced to callers once the
//!   fetcher gives up, either on a non-retriable failure or after the last
//!   allowed attempt.

use std::path::PathBuf;

use thiserror::Error;

/// Terminal failure of a fetch call.
///
/// Carries the URL that was requested and a human-readable cause. A caller
/// that receives this error never receives a partially built resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Error fetching {url}: {message}")]
pub struct FetchError {
    url: String,
    message: String,
    attempts: u32,
}

impl FetchError {
    /// Creates a fetch error for `url` with the given cause.
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
            attempts: 0,
        }
    }

    /// Records how many attempts were made before giving up.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// The URL that failed.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The cause, without the URL prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Number of attempts made (0 when the failure happened before the first attempt).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Failure of a single fetch attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The request used a method other than GET or POST.
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod {
        /// The rejected method.
        method: String,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A caller-supplied header name or value is not valid HTTP.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name as supplied.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request body could not be encoded.
    #[error("invalid request body: {reason}")]
    InvalidBody {
        /// Why encoding failed.
        reason: String,
    },

    /// Transport-level failure (connection refused, reset, TLS, body read).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The attempt exceeded the configured timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Reading or writing the stream target failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The stream target.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP session could not be established.
    #[error("failed to establish HTTP session: {source}")]
    Session {
        /// The client builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Any other failure raised while reading a response.
    #[error("{message}")]
    Response {
        /// Description of the failure.
        message: String,
    },
}

impl AttemptError {
    /// Creates an unsupported-method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an invalid body error.
    pub fn invalid_body(reason: impl ToString) -> Self {
        Self::InvalidBody {
            reason: reason.to_string(),
        }
    }

    /// Maps a transport error, promoting timeouts to [`AttemptError::Timeout`].
    ///
    /// Builder errors (such as a JSON body that fails to serialize) surface
    /// on send and become [`AttemptError::InvalidBody`].
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else if source.is_builder() {
            Self::invalid_body(source)
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error for the given stream target.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a session error.
    pub fn session(source: reqwest::Error) -> Self {
        Self::Session { source }
    }

    /// Creates a generic response-handling error.
    pub fn response(message: impl Into<String>) -> Self {
        Self::Response {
            message: message.into(),
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// URL or path that the source error does not carry.
