//! Constants for the fetch module (timeouts, backoff, chunking, headers).

use std::time::Duration;

/// Default number of concurrent in-flight fetches.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default per-attempt timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;

/// Default maximum attempts per fetch (including the first one).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (`base * 2^attempt`).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Largest piece written to a stream target in one step.
pub const CHUNK_SIZE: usize = 8192;

/// `Accept-Encoding` advertised on every request unless overridden.
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate";

/// Text encoding reported for buffered bodies that declare none.
pub const DEFAULT_TEXT_ENCODING: &str = "utf-8";

/// Default User-Agent identifying the fetcher.
#[must_use]
pub fn default_user_agent() -> String {
    format!("resource-fetcher/{}", env!("CARGO_PKG_VERSION"))
}
