//! Concurrency-bounded fetcher with retry support.
//!
//! # Concurrency Model
//!
//! - A semaphore sized to the configured concurrency gates every fetch call
//! - The permit is held across all attempts of one call and released on
//!   every exit path (RAII)
//! - Attempts within one call are strictly sequential
//!
//! # Session Lifecycle
//!
//! The HTTP client is created lazily on first use and shared by all calls:
//!
//! ```text
//! Uninitialized --fetch--> Active --close--> Closed --fetch--> Active
//! ```

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures_util::future::BoxFuture;
use reqwest::header::{
    ACCEPT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use reqwest::{Client, Method, RequestBuilder};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use url::Url;

use super::builder::ResourceBuilder;
use super::config::FetcherConfig;
use super::constants::DEFAULT_ACCEPT_ENCODING;
use super::error::{AttemptError, FetchError};
use super::resource::Resource;
use super::retry::{RetryPolicy, retry_with_backoff};

/// Request body sent with a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    /// JSON document.
    Json(serde_json::Value),
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
}

impl RequestBody {
    /// Serializes `value` into a JSON body.
    ///
    /// # Errors
    ///
    /// Returns the serialization error when `value` cannot be represented as JSON.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }
}

/// Per-call options for [`Fetcher::fetch`].
///
/// Defaults to an in-memory GET with the default headers and no body.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// HTTP method; only GET and POST are supported.
    pub method: Method,
    /// When set, the body is streamed to this path instead of buffered.
    pub stream_to: Option<PathBuf>,
    /// Headers overriding the defaults (`User-Agent`, `Accept-Encoding`).
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<RequestBody>,
}

impl FetchOptions {
    /// Default options (in-memory GET).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Streams the body to `path`.
    #[must_use]
    pub fn stream_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stream_to = Some(path.into());
        self
    }

    /// Adds a header override.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }
}

/// Observable state of the shared HTTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No fetch has run yet.
    Uninitialized,
    /// A client is open and reused across fetches.
    Active,
    /// The client was closed; the next fetch reopens it.
    Closed,
}

#[derive(Debug)]
enum Session {
    Uninitialized,
    Active(Client),
    Closed,
}

impl Session {
    fn state(&self) -> SessionState {
        match self {
            Self::Uninitialized => SessionState::Uninitialized,
            Self::Active(_) => SessionState::Active,
            Self::Closed => SessionState::Closed,
        }
    }
}

/// Concurrency-bounded HTTP fetcher.
///
/// # Example
///
/// ```no_run
/// use fetcher_core::fetch::{FetchOptions, Fetcher, FetcherConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = Fetcher::new(FetcherConfig::new(4, 10.0, 3)?);
/// let page = fetcher.get("https://example.com").await?;
/// let file = fetcher
///     .fetch("https://example.com/big.iso", FetchOptions::new().stream_to("big.iso"))
///     .await?;
/// println!("{page} {file}");
/// fetcher.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Fetcher {
    config: FetcherConfig,
    retry_policy: RetryPolicy,
    semaphore: Semaphore,
    session: Mutex<Session>,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(FetcherConfig::default())
    }
}

impl Fetcher {
    /// Creates a fetcher. No network activity happens until the first fetch.
    #[must_use]
    #[instrument(level = "debug", skip(config), fields(concurrency = config.concurrency(), max_attempts = config.max_attempts()))]
    pub fn new(config: FetcherConfig) -> Self {
        debug!(timeout_ms = config.timeout().as_millis(), "creating fetcher");
        Self {
            retry_policy: config.retry_policy(),
            semaphore: Semaphore::new(config.concurrency()),
            session: Mutex::new(Session::Uninitialized),
            config,
        }
    }

    /// Runs `body` with a fresh fetcher and closes its session afterwards,
    /// whatever `body` returns. A panic inside `body` closes it through `Drop`.
    ///
    /// ```no_run
    /// use fetcher_core::fetch::{Fetcher, FetcherConfig};
    ///
    /// # async fn example() {
    /// let result = Fetcher::scope(FetcherConfig::default(), |fetcher| {
    ///     Box::pin(async move { fetcher.get("https://example.com").await })
    /// })
    /// .await;
    /// # }
    /// ```
    pub async fn scope<T, F>(config: FetcherConfig, body: F) -> T
    where
        F: for<'a> FnOnce(&'a Fetcher) -> BoxFuture<'a, T>,
    {
        let fetcher = Self::new(config);
        let output = body(&fetcher).await;
        fetcher.close();
        output
    }

    /// The configuration this fetcher was built with.
    #[must_use]
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Current session state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.lock_session().state()
    }

    /// Number of fetch slots currently free.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Closes the HTTP session. The next fetch opens a new one.
    pub fn close(&self) {
        let mut session = self.lock_session();
        if matches!(*session, Session::Active(_)) {
            debug!("closing HTTP session");
            *session = Session::Closed;
        }
    }

    /// Fetches `url` into memory with a GET request.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch).
    pub async fn get(&self, url: &str) -> Result<Resource, FetchError> {
        self.fetch(url, FetchOptions::default()).await
    }

    /// Fetches `url`, retrying transient failures with exponential backoff.
    ///
    /// Waits for a free slot first; at most `concurrency` calls are past this
    /// point at any time.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when a non-retriable error occurs (unsupported
    /// method, invalid URL, header or body) or when every allowed attempt
    /// failed.
    #[instrument(skip(self, options), fields(method = %options.method, streaming = options.stream_to.is_some()))]
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<Resource, FetchError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::new(url, "concurrency gate closed"))?;

        retry_with_backoff(url, &self.retry_policy, |_| self.fetch_once(url, &options)).await
    }

    /// Blocking variant of [`fetch`](Self::fetch) for synchronous callers.
    ///
    /// Drives the fetch on a private current-thread runtime. Pooled
    /// connections die with that runtime, so the session is closed before
    /// returning.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch). Also fails when called from inside an
    /// async runtime, or when the private runtime cannot be started.
    pub fn fetch_blocking(&self, url: &str, options: FetchOptions) -> Result<Resource, FetchError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(FetchError::new(
                url,
                "fetch_blocking cannot be called from within an async runtime",
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FetchError::new(url, format!("failed to start runtime: {e}")))?;

        let result = runtime.block_on(self.fetch(url, options));
        self.close();
        result
    }

    /// One attempt: build the request, send it, materialize the response.
    async fn fetch_once(&self, url: &str, options: &FetchOptions) -> Result<Resource, AttemptError> {
        info!(
            url,
            mode = if options.stream_to.is_some() { "streaming" } else { "in-memory" },
            "fetching"
        );

        let parsed = self.validate_request(url, options)?;
        let client = self.ensure_session()?;
        let request = self.build_request(&client, parsed.clone(), options)?;

        let response = request
            .send()
            .await
            .map_err(|e| AttemptError::transport(url, e))?;

        if *response.url() != parsed {
            info!(url, redirected_to = %response.url(), "redirected");
        }

        let fetched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
        let builder = ResourceBuilder::new(url, fetched_at);
        let builder = match &options.stream_to {
            Some(path) => builder.stream_to(path),
            None => builder,
        };
        builder.build(response).await
    }

    /// Rejects malformed input before any I/O.
    fn validate_request(&self, url: &str, options: &FetchOptions) -> Result<Url, AttemptError> {
        if options.method != Method::GET && options.method != Method::POST {
            return Err(AttemptError::unsupported_method(options.method.as_str()));
        }
        Url::parse(url).map_err(|_| AttemptError::invalid_url(url))
    }

    fn build_request(
        &self,
        client: &Client,
        url: Url,
        options: &FetchOptions,
    ) -> Result<RequestBuilder, AttemptError> {
        let headers = self.request_headers(&options.headers)?;
        let has_content_type = headers.contains_key(CONTENT_TYPE);
        let request = client.request(options.method.clone(), url).headers(headers);

        match &options.body {
            None => Ok(request),
            Some(RequestBody::Bytes(bytes)) => Ok(request.body(bytes.clone())),
            // reqwest keeps a caller Content-Type and defaults to application/json
            Some(RequestBody::Json(value)) => Ok(request.json(value)),
            Some(RequestBody::Form(pairs)) => {
                let payload = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                let request = if has_content_type {
                    request
                } else {
                    request.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                };
                Ok(request.body(payload))
            }
        }
    }

    /// Default headers with caller overrides applied on top.
    fn request_headers(&self, overrides: &[(String, String)]) -> Result<HeaderMap, AttemptError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(self.config.user_agent())
                .map_err(|e| AttemptError::invalid_header(USER_AGENT.as_str(), e))?,
        );
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
        );

        let mut custom = HeaderMap::new();
        for (name, value) in overrides {
            let header_name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|e| AttemptError::invalid_header(name.as_str(), e))?;
            let header_value = HeaderValue::from_str(value.trim())
                .map_err(|e| AttemptError::invalid_header(name.as_str(), e))?;
            custom.append(header_name, header_value);
        }
        // Extending from a HeaderMap replaces every default sharing a name.
        headers.extend(custom);

        Ok(headers)
    }

    /// Returns the active client, opening one if needed.
    fn ensure_session(&self) -> Result<Client, AttemptError> {
        let mut session = self.lock_session();
        if let Session::Active(client) = &*session {
            return Ok(client.clone());
        }

        debug!(previous = ?session.state(), "opening HTTP session");
        let client = Client::builder()
            .timeout(self.config.timeout())
            .user_agent(self.config.user_agent())
            .build()
            .map_err(AttemptError::session)?;
        *session = Session::Active(client.clone());
        Ok(client)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        self.close();
    }
}
