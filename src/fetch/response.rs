//! The response contract the resource builder consumes.
//!
//! [`FetchResponse`] is implemented for [`reqwest::Response`]; tests supply
//! in-memory fakes so materialization can be exercised without a socket.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use encoding_rs::Encoding;
use futures_util::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;

use super::constants::DEFAULT_TEXT_ENCODING;
use super::error::AttemptError;

/// Boxed stream of body chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, AttemptError>> + Send>>;

/// An open HTTP response whose body has not been consumed yet.
pub trait FetchResponse: Send {
    /// URL after redirects.
    fn final_url(&self) -> &str;

    /// HTTP status code.
    fn status(&self) -> u16;

    /// All response headers, in the order received.
    fn headers(&self) -> Vec<(String, String)>;

    /// First value of the header `name`, compared case-insensitively.
    fn header(&self, name: &str) -> Option<String> {
        self.headers()
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Text encoding declared for the body, if any.
    fn text_encoding(&self) -> Option<String> {
        detect_text_encoding(self.header(CONTENT_TYPE.as_str()).as_deref())
    }

    /// Reads the entire body into memory.
    fn read_body(self) -> impl Future<Output = Result<Bytes, AttemptError>> + Send;

    /// Consumes the response as a stream of body chunks.
    fn into_chunks(self) -> ChunkStream;
}

impl FetchResponse for reqwest::Response {
    fn final_url(&self) -> &str {
        self.url().as_str()
    }

    fn status(&self) -> u16 {
        self.status().as_u16()
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers()
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    fn read_body(self) -> impl Future<Output = Result<Bytes, AttemptError>> + Send {
        async move {
            let url = self.url().to_string();
            self.bytes()
                .await
                .map_err(|e| AttemptError::transport(url, e))
        }
    }

    fn into_chunks(self) -> ChunkStream {
        let url = self.url().to_string();
        Box::pin(
            self.bytes_stream()
                .map(move |chunk| chunk.map_err(|e| AttemptError::transport(url.clone(), e))),
        )
    }
}

/// Detects the text encoding from a `Content-Type` value.
///
/// Uses the `charset` parameter when present, normalized to its canonical
/// name (`UTF8` becomes `utf-8`). JSON media types default to `utf-8`.
#[must_use]
pub fn detect_text_encoding(content_type: Option<&str>) -> Option<String> {
    let content_type = content_type?;
    let mut parts = content_type.split(';');
    let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();

    let charset = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    });

    match charset {
        Some(charset) if !charset.is_empty() => Some(normalize_charset(charset)),
        _ if mime == "application/json" || mime.ends_with("+json") => {
            Some(DEFAULT_TEXT_ENCODING.to_string())
        }
        _ => None,
    }
}

/// Encoding of a body that was read without a declared charset.
///
/// A byte order mark decides; otherwise `utf-8`.
#[must_use]
pub fn sniff_body_encoding(content: &[u8]) -> String {
    Encoding::for_bom(content)
        .map_or(DEFAULT_TEXT_ENCODING, |(encoding, _)| encoding.name())
        .to_ascii_lowercase()
}

/// Unknown labels are kept, lower-cased.
fn normalize_charset(label: &str) -> String {
    Encoding::for_label(label.as_bytes()).map_or_else(
        || label.to_ascii_lowercase(),
        |encoding| encoding.name().to_ascii_lowercase(),
    )
}
