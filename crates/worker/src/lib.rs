//! Host-facing surface of the lifeboat offline gateway.
//!
//! This crate ties the cache store and the strategy engine into the worker a
//! host application registers: the install/activate lifecycle for versioned
//! cache generations, the event router that classifies intercepted requests,
//! the registry of controlled clients, and the sync/reminder collaborator
//! stubs.

pub mod clients;
pub mod lifecycle;
pub mod router;
pub mod sync;
pub mod worker;

pub use clients::{ClientId, ClientRegistry};
pub use lifecycle::{Lifecycle, LifecycleEvent, LifecycleState};
pub use router::{Route, Router};
pub use sync::{EmptyQueue, PendingQueue, QueuedMutation, SyncReport};
pub use worker::{HostMessage, ReminderSignal, Worker};
