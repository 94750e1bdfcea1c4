//! Store abstraction over the pool keyspace.

use crate::batch::{Bound, Reply, ScoredMember, WriteBatch};
use crate::error::StorageResult;
use std::collections::HashMap;
use std::time::Duration;

/// Typed primitives over the backing key-value store.
///
/// Every method blocks its caller until the store answers; this is the only
/// suspension point in the accounting core. The trait exists so the
/// accounting logic can be exercised against [`crate::MemoryStore`] in tests
/// while production runs against [`crate::RedisStore`].
pub trait Store: Send + Sync {
    /// Liveness probe.
    fn ping(&self) -> StorageResult<String>;

    /// Trigger an asynchronous persistence snapshot on the store.
    fn bgsave(&self) -> StorageResult<String>;

    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Set `key` only if absent, with an optional TTL. Returns whether the
    /// value was set.
    fn setnx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<bool>;

    fn del(&self, key: &str) -> StorageResult<i64>;

    fn exists(&self, key: &str) -> StorageResult<bool>;

    fn hget(&self, key: &str, field: &str) -> StorageResult<Option<String>>;

    fn hgetall(&self, key: &str) -> StorageResult<HashMap<String, String>>;

    /// Add a member to a sorted set. Returns the number of newly added
    /// elements (zero when the member already existed).
    fn zadd(&self, key: &str, score: f64, member: &str) -> StorageResult<i64>;

    /// Remove members scored within `[min, max]`. Returns the removed count.
    fn zrem_range_by_score(&self, key: &str, min: Bound, max: Bound) -> StorageResult<i64>;

    fn zrangebyscore_withscores(
        &self,
        key: &str,
        min: Bound,
        max: Bound,
    ) -> StorageResult<Vec<ScoredMember>>;

    fn zrevrange_withscores(&self, key: &str, start: i64, stop: i64)
        -> StorageResult<Vec<ScoredMember>>;

    fn zcard(&self, key: &str) -> StorageResult<i64>;

    fn smembers(&self, key: &str) -> StorageResult<Vec<String>>;

    /// Collect every key matching `pattern` using a cursored scan with the
    /// given page size.
    fn scan_keys(&self, pattern: &str, page: usize) -> StorageResult<Vec<String>>;

    /// Execute a batch as one atomic unit, returning positional replies.
    fn exec(&self, batch: WriteBatch) -> StorageResult<Vec<Reply>>;

    /// Optimistic watched transaction over a hash key.
    ///
    /// Reads `key` as a hash, hands the snapshot to `build`, and commits the
    /// returned batch atomically iff `key` was not modified in between. On
    /// concurrent modification the whole cycle restarts with a fresh
    /// snapshot.
    fn watch_hash(
        &self,
        key: &str,
        build: &mut dyn FnMut(&HashMap<String, String>) -> StorageResult<WriteBatch>,
    ) -> StorageResult<Vec<Reply>>;
}
