//! Stream target naming and JSON result lines for the CLI.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use fetcher_core::{FetchError, Metadata, Resource, ResourceBody};
use serde::Serialize;
use url::Url;

/// Fallback file name when a URL has no usable last path segment.
const FALLBACK_FILENAME: &str = "index.html";

/// One stdout line per fetched URL.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultLine<'a> {
    Ok {
        url: &'a str,
        final_url: &'a str,
        sha256: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<&'a Path>,
        metadata: &'a Metadata,
    },
    Error {
        url: &'a str,
        attempts: u32,
        error: String,
    },
}

impl<'a> ResultLine<'a> {
    pub fn from_result(url: &'a str, result: &'a Result<Resource, FetchError>) -> Self {
        match result {
            Ok(resource) => {
                let (size, path) = match resource.body() {
                    ResourceBody::Buffered(bytes) => (Some(bytes.len()), None),
                    ResourceBody::Streamed(path) => (None, Some(path.as_path())),
                };
                Self::Ok {
                    url: resource.url(),
                    final_url: resource.redirected_url(),
                    sha256: resource.digest(),
                    size,
                    path,
                    metadata: resource.metadata(),
                }
            }
            Err(err) => Self::Error {
                url,
                attempts: err.attempts(),
                error: err.message().to_string(),
            },
        }
    }
}

/// Picks one distinct file in `dir` per URL, named after the URL's last
/// path segment. Repeated names get `_2`, `_3`, ... suffixes.
pub fn target_paths(dir: &Path, urls: &[String]) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    urls.iter()
        .map(|url| {
            let name = filename_for(url);
            let mut candidate = name.clone();
            let mut counter = 2;
            while !taken.insert(candidate.clone()) {
                candidate = with_suffix(&name, counter);
                counter += 1;
            }
            dir.join(candidate)
        })
        .collect()
}

fn filename_for(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map(|segment| sanitize_filename(&segment))
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn with_suffix(name: &str, counter: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{counter}.{ext}"),
        _ => format!("{name}_{counter}"),
    }
}
