//! Core types and shared functionality for the lifeboat offline gateway.
//!
//! This crate provides:
//! - The SQLite-backed cache store (versioned partitions)
//! - Request identity (canonical URL + method)
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod request;

pub use cache::{CacheDb, CachedResponse, Partition, PartitionNames};
pub use config::AppConfig;
pub use error::Error;
pub use request::{Method, RequestKey};
