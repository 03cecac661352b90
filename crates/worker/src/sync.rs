//! Deferred-sync collaborator surface.
//!
//! While offline, the host may queue mutations that need to reach a remote
//! collaborator. When connectivity returns the worker drains that queue.
//! Supplying a real queue (and the transport behind it) is the host's job;
//! the default implementation has nothing to flush.

use async_trait::async_trait;
use lifeboat_core::Error;
use serde::{Deserialize, Serialize};

/// One mutation recorded while offline, awaiting sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: u64,
    pub payload: serde_json::Value,
}

/// Source of mutations queued while offline.
#[async_trait]
pub trait PendingQueue: Send + Sync {
    /// Take every queued mutation, leaving the queue empty.
    async fn drain(&self) -> Result<Vec<QueuedMutation>, Error>;
}

/// Default collaborator: no offline queue, nothing to sync.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyQueue;

#[async_trait]
impl PendingQueue for EmptyQueue {
    async fn drain(&self) -> Result<Vec<QueuedMutation>, Error> {
        Ok(Vec::new())
    }
}

/// Outcome of a reconnect sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// How many queued mutations were flushed.
    pub flushed: usize,
}
