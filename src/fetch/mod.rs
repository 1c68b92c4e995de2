//! Concurrency-bounded HTTP resource fetching.
//!
//! This module fetches HTTP resources into memory or straight to disk,
//! retrying transient failures and fingerprinting every body with SHA-256.
//!
//! # Features
//!
//! - Semaphore-bounded concurrency shared by all callers of one [`Fetcher`]
//! - Exponential backoff (`base * 2^attempt`) for network errors and timeouts
//! - Buffered bodies are gzip/deflate-decoded before hashing
//! - Streamed bodies are written in chunks and hashed as raw transport bytes
//! - Lazily created, reusable HTTP session that can be closed and reopened
//!
//! # Example
//!
//! ```no_run
//! use fetcher_core::fetch::{Fetcher, FetcherConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::new(FetcherConfig::new(2, 10.0, 3)?);
//! let resource = fetcher.get("https://example.com").await?;
//! println!("{} sha256={}", resource, resource.digest());
//! fetcher.close();
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
pub mod constants;
mod decompress;
mod error;
mod fetcher;
mod resource;
mod response;
mod retry;

pub use builder::ResourceBuilder;
pub use config::{ConfigError, FetcherConfig};
pub use constants::{
    CHUNK_SIZE, DEFAULT_BASE_DELAY, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_TIMEOUT_SECS,
};
pub use decompress::{ContentEncoding, decompress};
pub use error::{AttemptError, FetchError};
pub use fetcher::{FetchOptions, Fetcher, RequestBody, SessionState};
pub use resource::{Metadata, Resource, ResourceBody};
pub use response::{ChunkStream, FetchResponse, detect_text_encoding};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error, retry_with_backoff};

// Note: no module-local Result aliases. Spell out `Result<T, FetchError>`.
