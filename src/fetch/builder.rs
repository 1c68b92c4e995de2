//! Turns an open response into a [`Resource`].
//!
//! Two mutually exclusive paths:
//! - buffered: read the whole body, decompress it, hash the decompressed bytes;
//! - streamed: copy the raw body to a file piece by piece, hashing each piece
//!   before it is written. The body is never held in memory as a whole.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use sha2::{Digest, Sha256};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};

use super::constants::CHUNK_SIZE;
use super::decompress::decompress;
use super::error::AttemptError;
use super::resource::{Metadata, Resource, ResourceBody};
use super::response::{ChunkStream, FetchResponse, sniff_body_encoding};

/// Materializes a response into a [`Resource`].
///
/// # Example
///
/// ```no_run
/// use fetcher_core::fetch::ResourceBuilder;
///
/// # async fn example(response: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
/// let resource = ResourceBuilder::new("https://example.com/data.bin", "2024-01-01T00:00:00+00:00")
///     .stream_to("./data.bin")
///     .build(response)
///     .await?;
/// println!("{} -> {}", resource, resource.digest());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResourceBuilder {
    url: String,
    fetched_at: String,
    stream_to: Option<PathBuf>,
}

impl ResourceBuilder {
    /// Starts a buffered build for the resource requested at `url`.
    pub fn new(url: impl Into<String>, fetched_at: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fetched_at: fetched_at.into(),
            stream_to: None,
        }
    }

    /// Switches to the streaming path, writing the body to `path`.
    #[must_use]
    pub fn stream_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stream_to = Some(path.into());
        self
    }

    /// Consumes `response` and produces the resource.
    ///
    /// # Errors
    ///
    /// Returns [`AttemptError`] when the body cannot be read or the stream
    /// target cannot be written. A partially written stream target is removed.
    #[instrument(skip(self, response), fields(url = %self.url, streaming = self.stream_to.is_some()))]
    pub async fn build<R: FetchResponse>(self, response: R) -> Result<Resource, AttemptError> {
        let redirected_url = response.final_url().to_string();
        let content_type = response.header(CONTENT_TYPE.as_str()).unwrap_or_default();
        let content_encoding = response
            .header(CONTENT_ENCODING.as_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut metadata =
            extract_metadata(&response, content_type, content_encoding, self.fetched_at);

        let (body, digest) = match self.stream_to {
            Some(path) => {
                let digest = stream_and_hash(response.into_chunks(), &path).await?;
                (ResourceBody::Streamed(path), digest)
            }
            None => {
                let raw = response.read_body().await?;
                let content = decompress(raw, &metadata.content_encoding, false);
                if metadata.encoding.is_none() {
                    metadata.encoding = Some(sniff_body_encoding(&content));
                }
                let digest = hex::encode(Sha256::digest(&content));
                (ResourceBody::Buffered(content), digest)
            }
        };

        debug!(digest = %digest, "resource materialized");
        Ok(Resource::new(
            self.url,
            redirected_url,
            body,
            digest,
            metadata,
        ))
    }
}

fn extract_metadata<R: FetchResponse>(
    response: &R,
    content_type: String,
    content_encoding: String,
    fetched_at: String,
) -> Metadata {
    let mime = content_type
        .split(';')
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_string);

    Metadata {
        headers: response.headers(),
        status_code: response.status(),
        mime,
        encoding: response.text_encoding(),
        etag: response.header(ETAG.as_str()),
        last_modified: response.header(LAST_MODIFIED.as_str()),
        content_type,
        content_encoding,
        fetched_at,
    }
}

/// Streams `chunks` into `path`, returning the hex digest of what was written.
async fn stream_and_hash(chunks: ChunkStream, path: &Path) -> Result<String, AttemptError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| AttemptError::io(path, e))?;

    let result = write_chunks(BufWriter::new(file), chunks, path).await;
    if result.is_err() {
        debug!(path = %path.display(), "removing partial stream target after error");
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove partial stream target");
        }
    }
    result
}

async fn write_chunks(
    mut writer: BufWriter<tokio::fs::File>,
    mut chunks: ChunkStream,
    path: &Path,
) -> Result<String, AttemptError> {
    let mut hasher = Sha256::new();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = chunks.next().await {
        let chunk: Bytes = chunk?;
        for piece in chunk.chunks(CHUNK_SIZE) {
            hasher.update(piece);
            writer
                .write_all(piece)
                .await
                .map_err(|e| AttemptError::io(path, e))?;
            bytes_written += piece.len() as u64;
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| AttemptError::io(path, e))?;

    debug!(path = %path.display(), bytes = bytes_written, "stream target written");
    Ok(hex::encode(hasher.finalize()))
}
