//! # ethpool-storage
//!
//! Storage layer for the ethpool accounting core.
//!
//! This crate provides a Redis-backed key-value abstraction with support for:
//! - A prefixed key schema covering the whole pool keyspace
//! - Typed hash, sorted-set and plain-set operations
//! - Atomic write batches (MULTI/EXEC pipelines)
//! - Optimistic watched transactions (WATCH/MULTI/EXEC with restart)
//! - An in-process [`MemoryStore`] for tests
//!
//! ## Keyspace
//!
//! Every key is `{prefix}:{segment}:{segment}:…`. Sorted-set members use the
//! same `:`-joined decimal encoding, produced and parsed by [`codec`].

mod batch;
pub mod clock;
pub mod codec;
mod config;
mod error;
mod keys;
mod memory;
mod redis_store;
mod store;

pub use batch::{Bound, Reply, ScoredMember, StoreOp, WriteBatch};
pub use config::{PoolConfig, StoreConfig};
pub use error::{StorageError, StorageResult};
pub use keys::Keys;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::Store;
