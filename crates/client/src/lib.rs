//! Network side of the lifeboat offline gateway.
//!
//! This crate provides the reqwest-backed fetch client behind the
//! [`NetworkFetch`] seam, and the strategy engine that coordinates cache
//! partitions with network fetches.

pub mod fetch;
pub mod strategy;

pub use fetch::{FetchClient, FetchConfig, FetchResponse, NetworkFetch};
pub use strategy::{Strategy, StrategyEngine};
