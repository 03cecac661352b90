//! Network fetch capability behind a mockable seam.
//!
//! The strategies never talk to reqwest directly: they receive a
//! [`NetworkFetch`] implementation. In production that is [`FetchClient`];
//! in tests it is a scripted mock. Non-2xx statuses surface as
//! `Error::Network`, so anything a strategy gets back `Ok` is safe to cache.
//! Requests that bypass the cache use [`NetworkFetch::fetch_raw`], which
//! keeps the real status and body.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};

use lifeboat_core::{CachedResponse, Error, RequestKey};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "lifeboat/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "lifeboat/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20_000),
            max_redirects: 5,
        }
    }
}

/// Response from a network fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code (always a success status via [`NetworkFetch::fetch`])
    pub status: StatusCode,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Response body bytes
    pub body: Bytes,
    /// When the fetch completed
    pub fetched_at: DateTime<Utc>,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Take an immutable snapshot suitable for a cache partition.
    pub fn snapshot(&self) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        CachedResponse {
            status: self.status.as_u16(),
            headers,
            body: self.body.to_vec(),
            stored_at: self.fetched_at,
        }
    }
}

/// Capability to perform a network fetch for a request key.
///
/// Failing with `Error::Network` covers offline, timeout, DNS, and non-2xx
/// statuses alike; strategies decide which cache tier to fall back to.
#[async_trait]
pub trait NetworkFetch: Send + Sync {
    async fn fetch(&self, key: &RequestKey) -> Result<FetchResponse, Error>;

    /// Fetch without the success-status gate.
    ///
    /// Requests that bypass the cache subsystem are passed through untouched,
    /// so the caller gets the real status and body even for non-2xx answers.
    /// The default forwards to [`fetch`](NetworkFetch::fetch).
    async fn fetch_raw(&self, key: &RequestKey) -> Result<FetchResponse, Error> {
        self.fetch(key).await
    }
}

/// reqwest-backed fetch client.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl NetworkFetch for FetchClient {
    async fn fetch(&self, key: &RequestKey) -> Result<FetchResponse, Error> {
        let response = self.fetch_raw(key).await?;
        if !response.status.is_success() {
            return Err(Error::Network(format!("{}: status {}", key.url(), response.status.as_u16())));
        }
        Ok(response)
    }

    async fn fetch_raw(&self, key: &RequestKey) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let method = reqwest::Method::from_bytes(key.method().as_str().as_bytes())
            .map_err(|e| Error::Network(format!("unsupported method {}: {e}", key.method())))?;

        let response = self
            .http
            .request(method, key.url().as_str())
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: {e}", key.url())))?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::Network(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::Network(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} in {}ms ({} bytes)", key.url(), fetch_ms, body.len());

        Ok(FetchResponse { status, headers, body, fetched_at: Utc::now(), fetch_ms })
    }
}
