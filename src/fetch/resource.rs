//! The materialized result of a successful fetch.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;

/// Where the body of a [`Resource`] lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBody {
    /// Body held in memory (decompressed when the transport encoded it).
    Buffered(Bytes),
    /// Body written to a file, as raw transport bytes.
    Streamed(PathBuf),
}

/// Normalized response metadata, serialized in a fixed key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Raw response headers in the order received.
    pub headers: Vec<(String, String)>,
    /// HTTP status code.
    pub status_code: u16,
    /// Declared `Content-Type` (empty when absent).
    #[serde(rename = "content-type")]
    pub content_type: String,
    /// Bare MIME type (content type before any parameters).
    pub mime: Option<String>,
    /// Detected text encoding.
    pub encoding: Option<String>,
    /// `ETag` header.
    pub etag: Option<String>,
    /// `Last-Modified` header.
    #[serde(rename = "last-modified")]
    pub last_modified: Option<String>,
    /// Lower-cased `Content-Encoding` (empty when absent).
    #[serde(rename = "content-encoding")]
    pub content_encoding: String,
    /// RFC 3339 UTC timestamp of the fetch.
    pub fetched_at: String,
}

/// One fetched resource.
///
/// Built once by [`super::ResourceBuilder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    url: String,
    redirected_url: String,
    body: ResourceBody,
    digest: String,
    metadata: Metadata,
}

impl Resource {
    /// Assembles a resource from its parts.
    ///
    /// `digest` must be the hex SHA-256 of the bytes in `body`.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        redirected_url: impl Into<String>,
        body: ResourceBody,
        digest: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            url: url.into(),
            redirected_url: redirected_url.into(),
            body,
            digest: digest.into(),
            metadata,
        }
    }

    /// The URL that was requested.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL after redirects (equal to [`url`](Self::url) when none happened).
    #[must_use]
    pub fn redirected_url(&self) -> &str {
        &self.redirected_url
    }

    /// The body representation.
    #[must_use]
    pub fn body(&self) -> &ResourceBody {
        &self.body
    }

    /// In-memory content, for buffered fetches.
    #[must_use]
    pub fn content(&self) -> Option<&Bytes> {
        match &self.body {
            ResourceBody::Buffered(bytes) => Some(bytes),
            ResourceBody::Streamed(_) => None,
        }
    }

    /// Stream target, for streamed fetches.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        match &self.body {
            ResourceBody::Buffered(_) => None,
            ResourceBody::Streamed(path) => Some(path),
        }
    }

    /// Hex-encoded SHA-256 of the body bytes.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Response metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// RFC 3339 UTC timestamp of the fetch.
    #[must_use]
    pub fn fetched_at(&self) -> &str {
        &self.metadata.fetched_at
    }

    /// Consumes the resource, returning its body.
    #[must_use]
    pub fn into_body(self) -> ResourceBody {
        self.body
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            ResourceBody::Buffered(bytes) => write!(f, "<Resource {} ({})>", self.url, bytes.len()),
            ResourceBody::Streamed(path) => {
                write!(f, "<Resource {} (-> {})>", self.url, path.display())
            }
        }
    }
}
