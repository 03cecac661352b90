//! The three fetch strategies and the engine that executes them.
//!
//! A request is routed to exactly one strategy, selected once by the event
//! router and dispatched here as a tagged variant:
//!
//! - **Cache-first** serves the static app shell; the network is only
//!   consulted on a miss.
//! - **Network-first** serves dynamic/API content; the dynamic partition is
//!   the offline fallback.
//! - **Stale-while-revalidate** answers from the dynamic partition when it
//!   can and refreshes the entry in a detached background task.
//!
//! Cache writes are best-effort everywhere: a response already in hand is
//! returned to the caller even when persisting it fails.

use std::sync::Arc;
use std::time::Duration;

use lifeboat_core::{CacheDb, CachedResponse, Error, Partition, PartitionNames, RequestKey};

use crate::fetch::{FetchResponse, NetworkFetch};

/// Which strategy the router selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

/// Executes strategies against the current cache generation.
#[derive(Clone)]
pub struct StrategyEngine {
    db: CacheDb,
    names: PartitionNames,
    swr_wait_timeout: Option<Duration>,
}

impl StrategyEngine {
    pub fn new(db: CacheDb, names: PartitionNames) -> Self {
        Self { db, names, swr_wait_timeout: None }
    }

    /// Bound how long a stale-while-revalidate caller with no cached entry
    /// waits for the network. Unset, the fetch client's own timeout applies.
    pub fn with_swr_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.swr_wait_timeout = timeout;
        self
    }

    pub fn names(&self) -> &PartitionNames {
        &self.names
    }

    /// Run the selected strategy for one request.
    pub async fn execute(
        &self, strategy: Strategy, key: &RequestKey, fetcher: Arc<dyn NetworkFetch>,
    ) -> Result<CachedResponse, Error> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(key, fetcher).await,
            Strategy::NetworkFirst => self.network_first(key, fetcher).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(key, fetcher).await,
        }
    }

    /// Cache-first, for the static app shell.
    ///
    /// A hit returns immediately with no network involved. A miss fetches,
    /// repopulates the static partition, and returns the response. When the
    /// network also fails the request is unavailable; this strategy never
    /// silently serves another tier.
    pub async fn cache_first(&self, key: &RequestKey, fetcher: Arc<dyn NetworkFetch>) -> Result<CachedResponse, Error> {
        let partition = self.db.open_partition(&self.names.static_name).await?;

        if let Some(hit) = partition.get(key).await? {
            tracing::debug!(url = %key.url(), "cache-first hit");
            return Ok(hit);
        }

        let response = fetcher
            .fetch(key)
            .await
            .map_err(|e| Error::Unavailable(format!("{}: {e}", key.url())))?;

        let snapshot = response.snapshot();
        store_best_effort(&partition, key, &snapshot).await;
        Ok(snapshot)
    }

    /// Network-first, for dynamic/API content.
    ///
    /// A successful fetch overwrites the dynamic partition entry and is
    /// returned. On fetch failure the dynamic partition is the fallback;
    /// only when both fail is the request unavailable.
    pub async fn network_first(
        &self, key: &RequestKey, fetcher: Arc<dyn NetworkFetch>,
    ) -> Result<CachedResponse, Error> {
        let partition = self.db.open_partition(&self.names.dynamic_name).await?;

        match fetcher.fetch(key).await {
            Ok(response) => {
                let snapshot = response.snapshot();
                store_best_effort(&partition, key, &snapshot).await;
                Ok(snapshot)
            }
            Err(err) => {
                tracing::debug!(url = %key.url(), error = %err, "network-first fetch failed, trying cache");
                match partition.get(key).await? {
                    Some(hit) => Ok(hit),
                    None => Err(Error::Unavailable(format!("{}: network failed and nothing cached", key.url()))),
                }
            }
        }
    }

    /// Stale-while-revalidate, the default for uncategorized GET requests.
    ///
    /// On a hit the cached entry returns immediately and the refresh runs as
    /// a detached task whose outcome never reaches this request. On a miss
    /// the caller waits for the network (optionally bounded by the
    /// configured budget).
    pub async fn stale_while_revalidate(
        &self, key: &RequestKey, fetcher: Arc<dyn NetworkFetch>,
    ) -> Result<CachedResponse, Error> {
        let partition = self.db.open_partition(&self.names.dynamic_name).await?;

        if let Some(hit) = partition.get(key).await? {
            tracing::debug!(url = %key.url(), "serving stale, revalidating in background");
            let partition = partition.clone();
            let key = key.clone();
            tokio::spawn(async move {
                revalidate(&partition, &key, fetcher).await;
            });
            return Ok(hit);
        }

        // Nothing cached: this request has to wait for the network.
        let fetched: Result<FetchResponse, Error> = match self.swr_wait_timeout {
            Some(budget) => match tokio::time::timeout(budget, fetcher.fetch(key)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Network(format!("no response within {}ms", budget.as_millis()))),
            },
            None => fetcher.fetch(key).await,
        };

        let response = fetched.map_err(|e| Error::Unavailable(format!("{}: {e}", key.url())))?;
        let snapshot = response.snapshot();
        store_best_effort(&partition, key, &snapshot).await;
        Ok(snapshot)
    }
}

/// Refresh one dynamic entry. Failures are logged, never propagated; the
/// response this revalidation belongs to has already been returned.
async fn revalidate(partition: &Partition, key: &RequestKey, fetcher: Arc<dyn NetworkFetch>) {
    match fetcher.fetch(key).await {
        Ok(response) => store_best_effort(partition, key, &response.snapshot()).await,
        Err(err) => tracing::debug!(url = %key.url(), error = %err, "revalidation fetch failed"),
    }
}

/// Persist a response without letting a store failure fail the request.
async fn store_best_effort(partition: &Partition, key: &RequestKey, response: &CachedResponse) {
    if let Err(err) = partition.put(key, response).await {
        tracing::warn!(
            url = %key.url(),
            partition = partition.name(),
            error = %err,
            "cache write failed, serving response anyway"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use reqwest::{StatusCode, header};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted fetcher: serves bodies by URL, counts calls, can go offline.
    struct ScriptedFetcher {
        bodies: Mutex<HashMap<String, String>>,
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self { bodies: Mutex::new(HashMap::new()), offline: AtomicBool::new(false), calls: AtomicUsize::new(0) }
        }

        fn serve(&self, url: &str, body: &str) {
            self.bodies.lock().unwrap().insert(url.to_string(), body.to_string());
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NetworkFetch for ScriptedFetcher {
        async fn fetch(&self, key: &RequestKey) -> Result<FetchResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::Network("offline".to_string()));
            }
            let body = self
                .bodies
                .lock()
                .unwrap()
                .get(key.url().as_str())
                .cloned()
                .ok_or_else(|| Error::Network(format!("{}: status 404", key.url())))?;
            Ok(FetchResponse {
                status: StatusCode::OK,
                headers: header::HeaderMap::new(),
                body: Bytes::from(body),
                fetched_at: Utc::now(),
                fetch_ms: 1,
            })
        }
    }

    async fn engine() -> (StrategyEngine, Arc<ScriptedFetcher>) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let engine = StrategyEngine::new(db, PartitionNames::for_version("v1"));
        (engine, Arc::new(ScriptedFetcher::new()))
    }

    async fn dynamic_entry(engine: &StrategyEngine, key: &RequestKey) -> Option<CachedResponse> {
        engine
            .db
            .open_partition(&engine.names.dynamic_name)
            .await
            .unwrap()
            .get(key)
            .await
            .unwrap()
    }

    /// Poll until the detached revalidation has written `expected`.
    async fn wait_for_body(engine: &StrategyEngine, key: &RequestKey, expected: &[u8]) {
        for _ in 0..100 {
            if let Some(entry) = dynamic_entry(engine, key).await
                && entry.body == expected
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("revalidation never wrote expected body");
    }

    #[tokio::test]
    async fn test_cache_first_populates_then_skips_network() {
        let (engine, fetcher) = engine().await;
        fetcher.serve("https://app.test/index.html", "<html>shell</html>");
        let key = RequestKey::get("https://app.test/index.html").unwrap();

        let first = engine.cache_first(&key, fetcher.clone()).await.unwrap();
        assert_eq!(first.body, b"<html>shell</html>");
        assert_eq!(fetcher.calls(), 1);

        // Second and later requests never touch the network.
        let second = engine.cache_first(&key, fetcher.clone()).await.unwrap();
        assert_eq!(second.body, b"<html>shell</html>");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_returns_response_when_store_write_fails() {
        let path = std::env::temp_dir().join(format!("lifeboat-strategy-{}.sqlite", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let db = CacheDb::open(&path).await.unwrap();

        // Simulate quota exhaustion through a second connection: every entry
        // write aborts, but reads and partition bookkeeping still work.
        let raw = tokio_rusqlite::Connection::open(&path).await.unwrap();
        raw.call(|conn| -> Result<(), tokio_rusqlite::rusqlite::Error> {
            conn.execute_batch(
                "CREATE TRIGGER quota_exceeded BEFORE INSERT ON entries
                 BEGIN SELECT RAISE(ABORT, 'quota exceeded'); END;",
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let engine = StrategyEngine::new(db, PartitionNames::for_version("v1"));
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.serve("https://app.test/index.html", "shell");
        let key = RequestKey::get("https://app.test/index.html").unwrap();

        // The fetched response still reaches the caller despite the failed write.
        let response = engine.cache_first(&key, fetcher.clone()).await.unwrap();
        assert_eq!(response.body, b"shell");

        // Nothing was persisted, so the repeat goes back to the network.
        let again = engine.cache_first(&key, fetcher.clone()).await.unwrap();
        assert_eq!(again.body, b"shell");
        assert_eq!(fetcher.calls(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_cache_first_hit_while_offline() {
        let (engine, fetcher) = engine().await;
        fetcher.serve("https://app.test/app.js", "console.log('hi')");
        let key = RequestKey::get("https://app.test/app.js").unwrap();

        engine.cache_first(&key, fetcher.clone()).await.unwrap();
        fetcher.set_offline(true);

        let hit = engine.cache_first(&key, fetcher.clone()).await.unwrap();
        assert_eq!(hit.body, b"console.log('hi')");
    }

    #[tokio::test]
    async fn test_cache_first_unavailable_when_both_tiers_fail() {
        let (engine, fetcher) = engine().await;
        fetcher.set_offline(true);
        let key = RequestKey::get("https://app.test/index.html").unwrap();

        let result = engine.cache_first(&key, fetcher.clone()).await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_network_first_stores_latest_response() {
        let (engine, fetcher) = engine().await;
        let key = RequestKey::get("https://app.test/api/tasks").unwrap();

        fetcher.serve("https://app.test/api/tasks", "[1]");
        engine.network_first(&key, fetcher.clone()).await.unwrap();

        fetcher.serve("https://app.test/api/tasks", "[1,2]");
        let latest = engine.network_first(&key, fetcher.clone()).await.unwrap();
        assert_eq!(latest.body, b"[1,2]");

        // Last writer wins in the dynamic partition.
        let entry = dynamic_entry(&engine, &key).await.unwrap();
        assert_eq!(entry.body, b"[1,2]");
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache_offline() {
        let (engine, fetcher) = engine().await;
        let key = RequestKey::get("https://app.test/api/tasks").unwrap();

        fetcher.serve("https://app.test/api/tasks", "[1]");
        engine.network_first(&key, fetcher.clone()).await.unwrap();

        fetcher.set_offline(true);
        let fallback = engine.network_first(&key, fetcher.clone()).await.unwrap();
        assert_eq!(fallback.body, b"[1]");
    }

    #[tokio::test]
    async fn test_network_first_unavailable_when_nothing_cached() {
        let (engine, fetcher) = engine().await;
        fetcher.set_offline(true);
        let key = RequestKey::get("https://app.test/api/tasks").unwrap();

        let result = engine.network_first(&key, fetcher.clone()).await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_swr_miss_waits_for_network_and_stores() {
        let (engine, fetcher) = engine().await;
        fetcher.serve("https://app.test/random-asset.png", "png-bytes");
        let key = RequestKey::get("https://app.test/random-asset.png").unwrap();

        let response = engine.stale_while_revalidate(&key, fetcher.clone()).await.unwrap();
        assert_eq!(response.body, b"png-bytes");
        assert!(dynamic_entry(&engine, &key).await.is_some());
    }

    #[tokio::test]
    async fn test_swr_hit_returns_stale_and_revalidates_in_background() {
        let (engine, fetcher) = engine().await;
        fetcher.serve("https://app.test/random-asset.png", "v1");
        let key = RequestKey::get("https://app.test/random-asset.png").unwrap();

        engine.stale_while_revalidate(&key, fetcher.clone()).await.unwrap();

        // The repeat answers from cache immediately with the stale copy.
        fetcher.serve("https://app.test/random-asset.png", "v2");
        let stale = engine.stale_while_revalidate(&key, fetcher.clone()).await.unwrap();
        assert_eq!(stale.body, b"v1");

        // While the detached revalidation refreshes the entry for next time.
        wait_for_body(&engine, &key, b"v2").await;
    }

    #[tokio::test]
    async fn test_swr_revalidation_failure_never_reaches_caller() {
        let (engine, fetcher) = engine().await;
        fetcher.serve("https://app.test/page", "cached");
        let key = RequestKey::get("https://app.test/page").unwrap();

        engine.stale_while_revalidate(&key, fetcher.clone()).await.unwrap();
        fetcher.set_offline(true);

        let served = engine.stale_while_revalidate(&key, fetcher.clone()).await.unwrap();
        assert_eq!(served.body, b"cached");

        // The failed refresh leaves the cached entry intact.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dynamic_entry(&engine, &key).await.unwrap().body, b"cached");
    }

    #[tokio::test]
    async fn test_swr_miss_offline_is_unavailable() {
        let (engine, fetcher) = engine().await;
        fetcher.set_offline(true);
        let key = RequestKey::get("https://app.test/page").unwrap();

        let result = engine.stale_while_revalidate(&key, fetcher.clone()).await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_swr_miss_respects_wait_budget() {
        struct StalledFetcher;

        #[async_trait]
        impl NetworkFetch for StalledFetcher {
            async fn fetch(&self, _key: &RequestKey) -> Result<FetchResponse, Error> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(Error::Network("unreachable".to_string()))
            }
        }

        let db = CacheDb::open_in_memory().await.unwrap();
        let engine = StrategyEngine::new(db, PartitionNames::for_version("v1"))
            .with_swr_wait_timeout(Some(Duration::from_millis(50)));
        let key = RequestKey::get("https://app.test/slow").unwrap();

        let result = engine
            .stale_while_revalidate(&key, Arc::new(StalledFetcher))
            .await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_execute_dispatches_by_variant() {
        let (engine, fetcher) = engine().await;
        fetcher.serve("https://app.test/index.html", "shell");
        let key = RequestKey::get("https://app.test/index.html").unwrap();

        let via_execute = engine
            .execute(Strategy::CacheFirst, &key, fetcher.clone())
            .await
            .unwrap();
        assert_eq!(via_execute.body, b"shell");

        // The entry landed in the static partition, not the dynamic one.
        assert!(dynamic_entry(&engine, &key).await.is_none());
    }
}
