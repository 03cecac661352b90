//! Install/activate lifecycle for versioned cache generations.
//!
//! One cycle per version bump: install populates `static-<version>` from the
//! app-shell manifest, activation garbage-collects every partition belonging
//! to superseded generations and takes over open clients. A failed install
//! aborts the rollout and never disturbs the generation that is currently
//! serving.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lifeboat_client::NetworkFetch;
use lifeboat_core::{AppConfig, CacheDb, Error, PartitionNames, RequestKey, request};
use tokio::sync::{RwLock, broadcast};
use url::Url;

use crate::clients::ClientRegistry;

/// Lifecycle states of one worker generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    InstalledWaiting,
    Activating,
    Active,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Uninstalled => write!(f, "uninstalled"),
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::InstalledWaiting => write!(f, "installed-waiting"),
            LifecycleState::Activating => write!(f, "activating"),
            LifecycleState::Active => write!(f, "active"),
        }
    }
}

/// Signals broadcast to the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The static shell for `version` is fully cached.
    Installed { version: String },
    /// A new generation is installed and waiting while an older one serves.
    UpdateAvailable { waiting: String },
    /// `version` now controls all clients; stale generations are gone.
    Activated { version: String },
}

/// Drives install -> activate transitions for one version.
pub struct Lifecycle {
    db: CacheDb,
    version: String,
    names: PartitionNames,
    manifest: Vec<Url>,
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
    events: broadcast::Sender<LifecycleEvent>,
    registry: Arc<ClientRegistry>,
}

impl Lifecycle {
    pub fn new(db: CacheDb, config: &AppConfig, registry: Arc<ClientRegistry>) -> Result<Self, Error> {
        let origin = request::canonicalize(&config.scope_origin)?;
        let mut manifest = Vec::with_capacity(config.static_manifest.len());
        for entry in &config.static_manifest {
            let url = if entry.contains("://") {
                request::canonicalize(entry)?
            } else {
                origin
                    .join(entry)
                    .map_err(|e| Error::Config(format!("manifest entry {entry}: {e}")))?
            };
            manifest.push(url);
        }

        let (events, _) = broadcast::channel(16);

        Ok(Self {
            db,
            version: config.version.clone(),
            names: config.partition_names(),
            manifest,
            state: RwLock::new(LifecycleState::Uninstalled),
            skip_waiting: AtomicBool::new(false),
            events,
            registry,
        })
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Absolute manifest URLs resolved against the scope origin.
    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    /// Subscribe to lifecycle signals.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Host command: bypass the wait for old clients to disconnect.
    pub fn skip_waiting(&self) {
        tracing::info!(version = %self.version, "skip-waiting requested");
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Whether activation may proceed: forced via skip-waiting, or no client
    /// is still held by an older generation.
    pub fn can_activate(&self) -> bool {
        self.skip_requested() || self.registry.controlled_count() == 0
    }

    /// Populate the static partition from the manifest.
    ///
    /// Runs to full completion; any fetch or write failure aborts this
    /// version's rollout and the previously active generation keeps serving.
    /// Re-installing the same version rewrites identical content.
    pub async fn install(&self, fetcher: Arc<dyn NetworkFetch>) -> Result<(), Error> {
        *self.state.write().await = LifecycleState::Installing;
        tracing::info!(version = %self.version, "installing cache generation");

        match self.populate_static(fetcher).await {
            Ok(superseding) => {
                *self.state.write().await = LifecycleState::InstalledWaiting;
                let _ = self.events.send(LifecycleEvent::Installed { version: self.version.clone() });
                if superseding {
                    let _ = self
                        .events
                        .send(LifecycleEvent::UpdateAvailable { waiting: self.version.clone() });
                }
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = LifecycleState::Uninstalled;
                tracing::warn!(version = %self.version, error = %err, "install failed, rollout aborted");
                match err {
                    Error::InstallFailure(_) => Err(err),
                    other => Err(Error::InstallFailure(other.to_string())),
                }
            }
        }
    }

    async fn populate_static(&self, fetcher: Arc<dyn NetworkFetch>) -> Result<bool, Error> {
        let existing = self.db.list_partition_names().await?;
        let superseding = existing.iter().any(|name| !self.names.contains(name));

        let partition = self.db.open_partition(&self.names.static_name).await?;
        for url in &self.manifest {
            let key = RequestKey::get(url.as_str())?;
            let response = fetcher
                .fetch(&key)
                .await
                .map_err(|e| Error::InstallFailure(format!("manifest entry {url}: {e}")))?;
            partition.put(&key, &response.snapshot()).await?;
        }

        tracing::info!(
            partition = %self.names.static_name,
            entries = self.manifest.len(),
            "static shell cached"
        );
        Ok(superseding)
    }

    /// Delete every partition not belonging to this version and take over
    /// all open clients.
    ///
    /// Stale generation data is deleted explicitly, not merely unreferenced.
    pub async fn activate(&self) -> Result<(), Error> {
        {
            // Check and transition under one guard so concurrent activations
            // cannot both pass the gate.
            let mut state = self.state.write().await;
            if *state != LifecycleState::InstalledWaiting {
                return Err(Error::InvalidState(format!("activate requires installed-waiting, state is {}", *state)));
            }
            *state = LifecycleState::Activating;
        }

        match self.sweep_stale_generations().await {
            Ok(deleted) => {
                let claimed = self.registry.claim_all();
                *self.state.write().await = LifecycleState::Active;
                tracing::info!(
                    version = %self.version,
                    stale_partitions = deleted,
                    clients = claimed,
                    "cache generation activated"
                );
                let _ = self.events.send(LifecycleEvent::Activated { version: self.version.clone() });
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = LifecycleState::InstalledWaiting;
                Err(err)
            }
        }
    }

    async fn sweep_stale_generations(&self) -> Result<usize, Error> {
        let mut deleted = 0;
        for name in self.db.list_partition_names().await? {
            if !self.names.contains(&name) {
                tracing::info!(partition = %name, "deleting stale cache generation");
                if self.db.delete_partition(&name).await? {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}
