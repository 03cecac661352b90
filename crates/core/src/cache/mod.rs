//! SQLite-backed cache store for offline responses.
//!
//! This module provides the persistent key-value store behind the fetch
//! strategies, using SQLite with async access via tokio-rusqlite. It
//! supports:
//!
//! - Named, versioned partitions ("cache generations")
//! - Whole-row entry replacement (last-writer-wins, never torn)
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use partitions::{CachedResponse, Partition, PartitionNames};
