//! Registry of clients the worker can control.
//!
//! Mirrors the browser notion of open clients: each connected window/tab
//! registers here, and activation claims them all so the new generation
//! controls them without a reload. A client still marked controlled before
//! activation is held by the previously active generation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier handed out when a client connects.
pub type ClientId = u64;

#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    // id -> controlled by a worker generation
    clients: Mutex<HashMap<ClientId, bool>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened client. It starts uncontrolled.
    pub fn connect(&self) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().unwrap().insert(id, false);
        id
    }

    /// Register a client that an older generation already controls.
    pub fn connect_controlled(&self) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().unwrap().insert(id, true);
        id
    }

    /// Remove a client. Returns false if it was not registered.
    pub fn disconnect(&self, id: ClientId) -> bool {
        self.clients.lock().unwrap().remove(&id).is_some()
    }

    /// Number of currently open clients.
    pub fn count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Number of clients still held by a worker generation.
    pub fn controlled_count(&self) -> usize {
        self.clients.lock().unwrap().values().filter(|c| **c).count()
    }

    pub fn is_controlled(&self, id: ClientId) -> bool {
        self.clients.lock().unwrap().get(&id).copied().unwrap_or(false)
    }

    /// Take control of every open client immediately (no reload required).
    ///
    /// Returns how many clients were claimed.
    pub fn claim_all(&self) -> usize {
        let mut clients = self.clients.lock().unwrap();
        for controlled in clients.values_mut() {
            *controlled = true;
        }
        clients.len()
    }
}
