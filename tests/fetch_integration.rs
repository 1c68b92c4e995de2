//! Integration tests for the fetcher against a mock HTTP server.
//!
//! These tests cover materialization (buffered and streamed), request
//! shaping (methods, headers, bodies), retries with backoff, the
//! concurrency gate and the session lifecycle.

use std::io::Write;
use std::net::TcpListener;
use std::time::{Duration, Instant};

use flate2::Compression;
use flate2::write::GzEncoder;
use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use wiremock::matchers::{body_json, body_string, header, header_exists, method, path};
use wiremock::{Mock, Request, ResponseTemplate};

use fetcher_core::fetch::{
    FetchOptions, Fetcher, FetcherConfig, RequestBody, ResourceBody, SessionState,
};

#[macro_use]
mod support;

const HTML_BODY: &str = "<html><body>Hello, World!</body></html>";

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Fast-retrying fetcher: short timeout, millisecond backoff.
fn fast_fetcher(concurrency: usize, timeout_secs: f64, max_attempts: u32) -> Fetcher {
    let config = FetcherConfig::new(concurrency, timeout_secs, max_attempts)
        .unwrap()
        .with_base_delay(Duration::from_millis(5));
    Fetcher::new(config)
}

/// Matches a header by its exact raw value.
fn raw_header(name: &'static str, value: &'static str) -> impl Fn(&Request) -> bool + Send + Sync + 'static {
    move |request: &Request| {
        request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == value)
    }
}

// ==================== Materialization ====================

#[tokio::test]
async fn test_fetch_html_in_memory() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(HTML_BODY, "text/html; charset=utf-8"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/", mock_server.uri());
    let fetcher = Fetcher::default();
    let resource = fetcher.get(&url).await.unwrap();

    assert_eq!(resource.url(), url);
    assert_eq!(resource.redirected_url(), url);
    assert_eq!(resource.content().unwrap().as_ref(), HTML_BODY.as_bytes());
    assert!(resource.file_path().is_none());
    assert_eq!(resource.digest(), sha256_hex(HTML_BODY.as_bytes()));

    let metadata = resource.metadata();
    assert_eq!(metadata.status_code, 200);
    assert_eq!(metadata.content_type, "text/html; charset=utf-8");
    assert_eq!(metadata.mime.as_deref(), Some("text/html"));
    assert_eq!(metadata.encoding.as_deref(), Some("utf-8"));
    assert_eq!(metadata.content_encoding, "");
    assert!(!metadata.fetched_at.is_empty());
}

#[tokio::test]
async fn test_fetch_captures_validators() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                .set_body_bytes(b"data".to_vec()),
        )
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::default();
    let resource = fetcher.get(&mock_server.uri()).await.unwrap();

    let metadata = resource.metadata();
    assert_eq!(metadata.etag.as_deref(), Some("\"v1\""));
    assert_eq!(
        metadata.last_modified.as_deref(),
        Some("Wed, 21 Oct 2015 07:28:00 GMT")
    );
    assert!(metadata.headers.iter().any(|(name, _)| name == "etag"));
}

#[tokio::test]
async fn test_fetch_error_status_is_still_a_resource() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = fast_fetcher(1, 5.0, 3);
    let resource = fetcher.get(&mock_server.uri()).await.unwrap();

    assert_eq!(resource.metadata().status_code, 404);
    assert_eq!(resource.metadata().encoding.as_deref(), Some("utf-8"));
    assert_eq!(resource.content().unwrap().as_ref(), b"missing");
}

#[tokio::test]
async fn test_fetch_gzip_body_is_decoded_before_hashing() {
    let mock_server = require_mock_server!();
    let plain = b"compressed payload ".repeat(100);
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "GZIP")
                .set_body_bytes(gzip(&plain)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::default();
    let resource = fetcher.get(&mock_server.uri()).await.unwrap();

    assert_eq!(resource.metadata().content_encoding, "gzip");
    assert_eq!(resource.content().unwrap().as_ref(), plain.as_slice());
    assert_eq!(resource.digest(), sha256_hex(&plain));
}

#[tokio::test]
async fn test_fetch_stream_to_file() {
    let mock_server = require_mock_server!();
    let body: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/large.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("large.bin");
    let fetcher = Fetcher::default();
    let resource = fetcher
        .fetch(
            &format!("{}/large.bin", mock_server.uri()),
            FetchOptions::new().stream_to(&target),
        )
        .await
        .unwrap();

    assert!(resource.content().is_none());
    assert_eq!(resource.body(), &ResourceBody::Streamed(target.clone()));

    let written = std::fs::read(&target).unwrap();
    assert_eq!(written, body);
    assert_eq!(resource.digest(), sha256_hex(&written));
}

#[tokio::test]
async fn test_fetch_stream_keeps_transport_bytes() {
    let mock_server = require_mock_server!();
    let compressed = gzip(b"raw on disk");
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(compressed.clone()),
        )
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("body.gz");
    let fetcher = Fetcher::default();
    let resource = fetcher
        .fetch(&mock_server.uri(), FetchOptions::new().stream_to(&target))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), compressed);
    assert_eq!(resource.digest(), sha256_hex(&compressed));
}

#[tokio::test]
async fn test_fetch_follows_redirect() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/new"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&mock_server)
        .await;

    let old_url = format!("{}/old", mock_server.uri());
    let fetcher = Fetcher::default();
    let resource = fetcher.get(&old_url).await.unwrap();

    assert_eq!(resource.url(), old_url);
    assert_eq!(resource.redirected_url(), format!("{}/new", mock_server.uri()));
    assert_eq!(resource.content().unwrap().as_ref(), b"moved");
}

// ==================== Request shaping ====================

#[tokio::test]
async fn test_fetch_sends_default_headers() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(raw_header("accept-encoding", "gzip, deflate"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::default();
    fetcher.get(&mock_server.uri()).await.unwrap();
}

#[tokio::test]
async fn test_fetch_header_overrides_replace_defaults() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(header("user-agent", "custom-agent/2.0"))
        .and(header("x-request-id", "42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::default();
    let options = FetchOptions::new()
        .header("User-Agent", "custom-agent/2.0")
        .header("X-Request-Id", "42");
    fetcher.fetch(&mock_server.uri(), options).await.unwrap();
}

#[tokio::test]
async fn test_fetch_post_form_body() {
    let mock_server = require_mock_server!();
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("name=ferris&greeting=hello+world"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::default();
    let options = FetchOptions::new()
        .method(reqwest::Method::POST)
        .body(RequestBody::Form(vec![
            ("name".to_string(), "ferris".to_string()),
            ("greeting".to_string(), "hello world".to_string()),
        ]));
    let resource = fetcher
        .fetch(&format!("{}/submit", mock_server.uri()), options)
        .await
        .unwrap();

    assert_eq!(resource.metadata().status_code, 201);
}

#[tokio::test]
async fn test_fetch_post_json_body() {
    let mock_server = require_mock_server!();
    let payload = serde_json::json!({ "query": "rust", "limit": 10 });
    Mock::given(method("POST"))
        .and(header("content-type", "application/json"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::default();
    let options = FetchOptions::new()
        .method(reqwest::Method::POST)
        .body(RequestBody::Json(payload.clone()));
    fetcher.fetch(&mock_server.uri(), options).await.unwrap();
}

#[tokio::test]
async fn test_fetch_post_json_keeps_caller_content_type() {
    let mock_server = require_mock_server!();
    let payload = serde_json::json!({ "op": "add" });
    Mock::given(method("POST"))
        .and(header("content-type", "application/merge-patch+json"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::default();
    let options = FetchOptions::new()
        .method(reqwest::Method::POST)
        .header("Content-Type", "application/merge-patch+json")
        .body(RequestBody::Json(payload.clone()));
    fetcher.fetch(&mock_server.uri(), options).await.unwrap();
}

#[tokio::test]
async fn test_fetch_unsupported_method_sends_nothing() {
    let mock_server = require_mock_server!();
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let fetcher = fast_fetcher(1, 5.0, 3);
    let start = Instant::now();
    let err = fetcher
        .fetch(
            &mock_server.uri(),
            FetchOptions::new().method(reqwest::Method::PUT),
        )
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 1);
    assert!(err.message().contains("Unsupported HTTP method: PUT"));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_fetch_invalid_url_is_not_retried() {
    let fetcher = fast_fetcher(1, 5.0, 3);
    let err = fetcher.get("not-a-valid-url").await.unwrap_err();
    assert_eq!(err.attempts(), 1);
    assert_eq!(err.url(), "not-a-valid-url");
}

// ==================== Retries ====================

#[tokio::test]
async fn test_fetch_retries_timeouts_then_succeeds() {
    let mock_server = require_mock_server!();

    // First two attempts hang past the timeout.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .with_priority(2)
        .mount(&mock_server)
        .await;

    let fetcher = fast_fetcher(1, 0.2, 3);
    let resource = fetcher.get(&mock_server.uri()).await.unwrap();

    assert_eq!(resource.content().unwrap().as_ref(), b"finally");
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_fetch_gives_up_after_max_attempts() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(2)
        .mount(&mock_server)
        .await;

    let fetcher = fast_fetcher(1, 0.2, 2);
    let err = fetcher.get(&mock_server.uri()).await.unwrap_err();

    assert_eq!(err.attempts(), 2);
    assert!(err.to_string().starts_with("Error fetching "));
    assert!(err.message().contains("timeout"));
}

#[tokio::test]
async fn test_fetch_connection_refused_is_retried() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/");

    let fetcher = fast_fetcher(1, 1.0, 3);
    let err = fetcher.get(&url).await.unwrap_err();

    assert_eq!(err.attempts(), 3);
    assert_eq!(err.url(), url);
    assert_eq!(fetcher.available_slots(), 1);
}

// ==================== Concurrency gate ====================

#[tokio::test]
async fn test_concurrency_limit_is_never_exceeded() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(400))
                .set_body_bytes(b"content".to_vec()),
        )
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = fast_fetcher(2, 5.0, 1);
    let urls: Vec<String> = (0..3)
        .map(|i| format!("{}/file{i}.txt", mock_server.uri()))
        .collect();

    let sample_slots = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let in_flight = mock_server.received_requests().await.unwrap().len();
        (in_flight, fetcher.available_slots())
    };

    let start = Instant::now();
    let (results, (in_flight, free_slots)) =
        tokio::join!(join_all(urls.iter().map(|url| fetcher.get(url))), sample_slots);

    assert!(results.iter().all(Result::is_ok));
    // Only two requests got through the gate while the first wave was pending.
    assert_eq!(in_flight, 2);
    assert_eq!(free_slots, 0);
    // The third fetch had to wait for a full wave.
    assert!(start.elapsed() >= Duration::from_millis(800));
    assert_eq!(fetcher.available_slots(), 2);
}

#[tokio::test]
async fn test_slot_released_after_failure() {
    let fetcher = fast_fetcher(1, 1.0, 1);
    assert!(fetcher.get("not-a-valid-url").await.is_err());
    assert!(fetcher.get("also not a url").await.is_err());
    assert_eq!(fetcher.available_slots(), 1);
}

// ==================== Session lifecycle ====================

#[tokio::test]
async fn test_session_reopens_after_close() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::default();
    assert_eq!(fetcher.session_state(), SessionState::Uninitialized);

    fetcher.get(&mock_server.uri()).await.unwrap();
    assert_eq!(fetcher.session_state(), SessionState::Active);

    fetcher.close();
    assert_eq!(fetcher.session_state(), SessionState::Closed);

    fetcher.get(&mock_server.uri()).await.unwrap();
    assert_eq!(fetcher.session_state(), SessionState::Active);
}

#[tokio::test]
async fn test_scope_returns_body_result() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("scoped"))
        .mount(&mock_server)
        .await;

    let url = mock_server.uri();
    let resources = Fetcher::scope(FetcherConfig::default(), |fetcher| {
        Box::pin(async move {
            let first = fetcher.get(&url).await;
            let second = fetcher.get(&url).await;
            vec![first, second]
        })
    })
    .await;

    assert_eq!(resources.len(), 2);
    for resource in resources {
        assert_eq!(resource.unwrap().content().unwrap().as_ref(), b"scoped");
    }
}

#[test]
fn test_fetch_blocking_from_sync_code() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let Some(mock_server) = runtime.block_on(support::mock_server()) else {
        return;
    };
    runtime.block_on(
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("blocking"))
            .expect(2)
            .mount(&mock_server),
    );

    let fetcher = Fetcher::default();
    let resource = fetcher
        .fetch_blocking(&mock_server.uri(), FetchOptions::new())
        .unwrap();
    assert_eq!(resource.content().unwrap().as_ref(), b"blocking");
    assert_eq!(fetcher.session_state(), SessionState::Closed);

    // A second blocking call opens a fresh session.
    fetcher
        .fetch_blocking(&mock_server.uri(), FetchOptions::new())
        .unwrap();

    drop(fetcher);
    runtime.block_on(async move {
        mock_server.verify().await;
        drop(mock_server);
    });
}
