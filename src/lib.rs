//! Resource Fetcher Core Library
//!
//! This library fetches HTTP resources under a shared concurrency limit,
//! retries transient failures with exponential backoff, and returns each
//! body either in memory or as a file on disk together with its SHA-256
//! digest and normalized response metadata.
//!
//! # Architecture
//!
//! - [`fetch`] - Fetcher, retry policy, resource materialization and
//!   content decoding
//!
//! The `resource-fetcher` binary is a thin CLI over [`fetch::Fetcher`].

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;

// Re-export commonly used types
pub use fetch::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS, FetchError, FetchOptions,
    Fetcher, FetcherConfig, Metadata, RequestBody, Resource, ResourceBody, SessionState,
};
