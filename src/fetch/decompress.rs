//! Transport-level decompression of buffered response bodies.
//!
//! Only buffered fetches pass through here. Streamed fetches write the raw
//! transport bytes, so a gzip-encoded response streamed to disk stays
//! gzip-encoded on disk.

use std::io::Read;

use bytes::Bytes;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use tracing::debug;

/// A `Content-Encoding` label as understood by [`decompress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    /// `gzip`
    Gzip,
    /// `deflate` (zlib-wrapped)
    Deflate,
    /// `br`, recognized but not decoded.
    Brotli,
    /// No encoding header, or `identity`.
    Identity,
    /// Any other label.
    Other(String),
}

impl ContentEncoding {
    /// Parses a header value, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "gzip" => Self::Gzip,
            "deflate" => Self::Deflate,
            "br" => Self::Brotli,
            "" | "identity" => Self::Identity,
            _ => Self::Other(label),
        }
    }
}

/// Decodes `data` according to `encoding`.
///
/// Returns the input unchanged when `is_chunked` is set, when the encoding is
/// not one of `gzip`/`deflate`, or when decoding fails.
#[must_use]
pub fn decompress(data: Bytes, encoding: &str, is_chunked: bool) -> Bytes {
    if is_chunked {
        return data;
    }

    let decoded = match ContentEncoding::parse(encoding) {
        ContentEncoding::Gzip => read_all(MultiGzDecoder::new(data.as_ref())),
        ContentEncoding::Deflate => read_all(ZlibDecoder::new(data.as_ref())),
        ContentEncoding::Brotli | ContentEncoding::Identity | ContentEncoding::Other(_) => {
            return data;
        }
    };

    match decoded {
        Ok(decoded) => Bytes::from(decoded),
        Err(e) => {
            debug!(encoding, error = %e, "decompression failed, keeping raw body");
            data
        }
    }
}

fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};

    use super::*;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decompress_gzip() {
        let compressed = Bytes::from(gzip(b"hello gzip"));
        assert_eq!(decompress(compressed, "gzip", false), &b"hello gzip"[..]);
    }

    #[test]
    fn test_decompress_deflate() {
        let compressed = Bytes::from(zlib(b"hello deflate"));
        assert_eq!(decompress(compressed, "deflate", false), &b"hello deflate"[..]);
    }

    #[test]
    fn test_decompress_label_is_case_insensitive() {
        let compressed = Bytes::from(gzip(b"shouting"));
        assert_eq!(decompress(compressed, " GZIP ", false), &b"shouting"[..]);
    }

    #[test]
    fn test_decompress_multi_member_gzip() {
        let mut joined = gzip(b"first ");
        joined.extend(gzip(b"second"));
        assert_eq!(
            decompress(Bytes::from(joined), "gzip", false),
            &b"first second"[..]
        );
    }

    #[test]
    fn test_decompress_unknown_and_brotli_return_original() {
        let original = Bytes::from_static(b"no compression");
        for label in ["unknown", "", "br", "identity", "compress"] {
            assert_eq!(decompress(original.clone(), label, false), original, "{label}");
        }
    }

    #[test]
    fn test_decompress_empty_bytes() {
        assert!(decompress(Bytes::new(), "gzip", false).is_empty());
        assert!(decompress(Bytes::new(), "deflate", false).is_empty());
    }

    #[test]
    fn test_decompress_is_chunked_skips_decompression() {
        let compressed = Bytes::from(gzip(b"chunked data"));
        assert_eq!(decompress(compressed.clone(), "gzip", true), compressed);
    }

    #[test]
    fn test_decompress_invalid_data_returns_original() {
        let bad = Bytes::from_static(b"not really compressed");
        assert_eq!(decompress(bad.clone(), "gzip", false), bad);
        assert_eq!(decompress(bad.clone(), "deflate", false), bad);
    }

    #[test]
    fn test_decompress_truncated_gzip_returns_original() {
        let mut compressed = gzip(b"this stream will be cut short before its trailer");
        compressed.truncate(compressed.len() / 2);
        let truncated = Bytes::from(compressed);
        assert_eq!(decompress(truncated.clone(), "gzip", false), truncated);
    }

    #[test]
    fn test_content_encoding_parse() {
        assert_eq!(ContentEncoding::parse("gzip"), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::parse("Deflate"), ContentEncoding::Deflate);
        assert_eq!(ContentEncoding::parse("br"), ContentEncoding::Brotli);
        assert_eq!(ContentEncoding::parse(""), ContentEncoding::Identity);
        assert_eq!(
            ContentEncoding::parse("zstd"),
            ContentEncoding::Other("zstd".to_string())
        );
    }
}
