//! Request classification and dispatch.
//!
//! Every intercepted request maps to exactly one route; classification is
//! pure and total. Non-GET requests bypass the cache subsystem entirely.
//! When every tier a strategy may use is exhausted, the router hands the
//! host a synthesized 503 instead of an error.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use lifeboat_client::{NetworkFetch, Strategy, StrategyEngine};
use lifeboat_core::{AppConfig, CachedResponse, Error, RequestKey, request};

/// Where one request goes. Never more than one route per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Straight to the network, no cache partition is read or written.
    Bypass,
    /// Static app-shell asset.
    CacheFirst,
    /// Dynamic/API namespace.
    NetworkFirst,
    /// Everything else.
    StaleWhileRevalidate,
}

/// Classifies intercepted requests and runs the matching strategy.
pub struct Router {
    engine: StrategyEngine,
    /// Absolute manifest entries, canonicalized.
    manifest_urls: HashSet<String>,
    /// Origin-relative manifest entries, matched by path.
    manifest_paths: HashSet<String>,
    api_prefix: String,
}

impl Router {
    pub fn new(engine: StrategyEngine, config: &AppConfig) -> Result<Self, Error> {
        let mut manifest_urls = HashSet::new();
        let mut manifest_paths = HashSet::new();
        for entry in &config.static_manifest {
            if entry.contains("://") {
                manifest_urls.insert(request::canonicalize(entry)?.to_string());
            } else {
                manifest_paths.insert(entry.clone());
            }
        }

        Ok(Self { engine, manifest_urls, manifest_paths, api_prefix: config.api_prefix.clone() })
    }

    /// Classify one request. Pure and total: every key maps to exactly one
    /// route, and only GET requests are eligible for a cache strategy.
    pub fn classify(&self, key: &RequestKey) -> Route {
        if !key.is_cacheable() {
            return Route::Bypass;
        }

        let url = key.url();
        if self.manifest_urls.contains(url.as_str()) || self.manifest_paths.contains(url.path()) {
            Route::CacheFirst
        } else if url.path().starts_with(&self.api_prefix) {
            Route::NetworkFirst
        } else {
            Route::StaleWhileRevalidate
        }
    }

    /// Dispatch one request to its route and return a response to the host.
    ///
    /// `Error::Unavailable` never escapes: it becomes a terminal 503
    /// response, equivalent to what the host would render offline.
    pub async fn handle(&self, key: &RequestKey, fetcher: Arc<dyn NetworkFetch>) -> Result<CachedResponse, Error> {
        let route = self.classify(key);
        tracing::debug!(method = %key.method(), url = %key.url(), route = ?route, "routing request");

        let result = match route {
            Route::Bypass => fetcher.fetch_raw(key).await.map(|response| response.snapshot()),
            Route::CacheFirst => self.engine.execute(Strategy::CacheFirst, key, fetcher).await,
            Route::NetworkFirst => self.engine.execute(Strategy::NetworkFirst, key, fetcher).await,
            Route::StaleWhileRevalidate => {
                self.engine
                    .execute(Strategy::StaleWhileRevalidate, key, fetcher)
                    .await
            }
        };

        match result {
            Ok(response) => Ok(response),
            Err(Error::Unavailable(reason)) => {
                tracing::warn!(url = %key.url(), reason = %reason, "request unavailable, answering 503");
                Ok(unavailable_response())
            }
            Err(other) => Err(other),
        }
    }
}

/// Terminal failure response when neither cache nor network could answer.
pub fn unavailable_response() -> CachedResponse {
    CachedResponse {
        status: 503,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: b"content not available offline".to_vec(),
        stored_at: Utc::now(),
    }
}
