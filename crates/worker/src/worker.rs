//! The worker facade a host application registers.
//!
//! One [`Worker`] is the single interception point for the host's outbound
//! fetches. Each intercepted request runs its strategy independently, so any
//! number may be in flight at once; the store serializes writes per key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lifeboat_client::{NetworkFetch, StrategyEngine};
use lifeboat_core::{AppConfig, CacheDb, CachedResponse, Error, Method, RequestKey};
use tokio::sync::broadcast;

use crate::clients::ClientRegistry;
use crate::lifecycle::{Lifecycle, LifecycleEvent, LifecycleState};
use crate::router::Router;
use crate::sync::{EmptyQueue, PendingQueue, SyncReport};

/// Commands the host may post to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    /// Force the waiting generation to become eligible for activation.
    SkipWaiting,
}

/// Raised by the scheduled check when no client is open and the host should
/// surface a notification. Delivery is the host's responsibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSignal {
    pub checked_at: DateTime<Utc>,
}

/// The offline gateway registered by the host.
pub struct Worker {
    db: CacheDb,
    lifecycle: Arc<Lifecycle>,
    router: Router,
    registry: Arc<ClientRegistry>,
    fetcher: Arc<dyn NetworkFetch>,
    queue: Arc<dyn PendingQueue>,
}

impl Worker {
    /// Register the gateway for the host's fetch scope.
    ///
    /// Idempotent: registering twice against the same store is safe and
    /// yields an equivalent worker. Typically performed once at startup.
    pub async fn register(config: AppConfig, fetcher: Arc<dyn NetworkFetch>) -> Result<Self, Error> {
        config.validate().map_err(|e| Error::Config(e.to_string()))?;
        let db = CacheDb::open(&config.db_path).await?;
        Self::with_store(config, db, fetcher)
    }

    /// Register against an existing store (tests use the in-memory one).
    pub fn with_store(config: AppConfig, db: CacheDb, fetcher: Arc<dyn NetworkFetch>) -> Result<Self, Error> {
        let registry = Arc::new(ClientRegistry::new());
        let lifecycle = Arc::new(Lifecycle::new(db.clone(), &config, registry.clone())?);
        let engine = StrategyEngine::new(db.clone(), config.partition_names())
            .with_swr_wait_timeout(config.swr_wait_timeout());
        let router = Router::new(engine, &config)?;

        tracing::info!(version = %config.version, "worker registered");

        Ok(Self { db, lifecycle, router, registry, fetcher, queue: Arc::new(EmptyQueue) })
    }

    /// Swap in a real offline-mutation queue.
    pub fn with_pending_queue(mut self, queue: Arc<dyn PendingQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Subscribe to lifecycle signals (installed, update-available,
    /// activated).
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Run the install transition for the configured version.
    pub async fn install(&self) -> Result<(), Error> {
        self.lifecycle.install(self.fetcher.clone()).await
    }

    /// Force the activate transition.
    pub async fn activate(&self) -> Result<(), Error> {
        self.lifecycle.activate().await
    }

    /// Activate if permitted: either skip-waiting was requested or no client
    /// is still held by an older generation. Returns whether it activated.
    pub async fn try_activate(&self) -> Result<bool, Error> {
        if self.lifecycle.can_activate() {
            self.lifecycle.activate().await?;
            Ok(true)
        } else {
            tracing::debug!("activation deferred, older generation still controls clients");
            Ok(false)
        }
    }

    /// Handle a command posted by the host.
    pub fn post_message(&self, message: HostMessage) {
        match message {
            HostMessage::SkipWaiting => self.lifecycle.skip_waiting(),
        }
    }

    /// Intercept one outbound request.
    pub async fn handle(&self, method: Method, url: &str) -> Result<CachedResponse, Error> {
        let key = RequestKey::new(method, url)?;
        self.router.handle(&key, self.fetcher.clone()).await
    }

    /// Connectivity restored: flush whatever the offline queue holds.
    pub async fn on_reconnect(&self) -> Result<SyncReport, Error> {
        let drained = self.queue.drain().await?;
        if drained.is_empty() {
            tracing::debug!("reconnect sync: nothing queued");
        } else {
            tracing::info!(count = drained.len(), "reconnect sync: flushing queued mutations");
        }
        Ok(SyncReport { flushed: drained.len() })
    }

    /// Periodic check: signal a reminder only when no client is open.
    pub fn on_scheduled_check(&self) -> Option<ReminderSignal> {
        if self.registry.count() == 0 {
            tracing::debug!("no open clients, raising reminder signal");
            Some(ReminderSignal { checked_at: Utc::now() })
        } else {
            None
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    /// Names of every partition currently in the store.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.db.list_partition_names().await
    }
}
