//! In-process store implementation.
//!
//! Backs the test-suite and single-process tooling with the same contract as
//! the Redis store: one mutex plays the role of the server's command loop, so
//! a batch is observed either entirely or not at all.

use crate::batch::{Bound, Reply, ScoredMember, StoreOp, WriteBatch};
use crate::clock;
use crate::error::{StorageError, StorageResult};
use crate::store::Store;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    ZSet(HashMap<String, f64>),
    Set(HashSet<String>),
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Value>,
    expires: HashMap<String, i64>,
}

/// In-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate a plain set; test convenience for access lists.
    pub fn fill_set(&self, key: &str, members: &[&str]) {
        let mut inner = self.inner.lock();
        inner.data.insert(
            key.to_string(),
            Value::Set(members.iter().map(|m| m.to_string()).collect()),
        );
    }
}

impl Inner {
    fn purge(&mut self, key: &str) {
        if let Some(at) = self.expires.get(key) {
            if *at <= clock::now_sec() {
                self.data.remove(key);
                self.expires.remove(key);
            }
        }
    }

    fn check_kind(&mut self, key: &str, hash: bool) -> StorageResult<()> {
        self.purge(key);
        match self.data.get(key) {
            None => Ok(()),
            Some(Value::Hash(_)) if hash => Ok(()),
            Some(Value::ZSet(_)) if !hash => Ok(()),
            Some(_) => Err(StorageError::WrongType(key.to_string())),
        }
    }

    fn hash_mut(&mut self, key: &str) -> &mut HashMap<String, String> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()))
        {
            Value::Hash(h) => h,
            // validated by the caller
            _ => unreachable!("wrong kind slipped past validation"),
        }
    }

    fn zset_mut(&mut self, key: &str) -> &mut HashMap<String, f64> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::ZSet(HashMap::new()))
        {
            Value::ZSet(z) => z,
            _ => unreachable!("wrong kind slipped past validation"),
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.data.get(key) {
            Some(Value::Hash(h)) => h.is_empty(),
            Some(Value::ZSet(z)) => z.is_empty(),
            Some(Value::Set(s)) => s.is_empty(),
            _ => false,
        };
        if empty {
            self.data.remove(key);
            self.expires.remove(key);
        }
    }

    /// Type and existence checks for one op, with no mutation. Running the
    /// whole batch through this first keeps `exec` all-or-nothing.
    fn validate(&mut self, op: &StoreOp) -> StorageResult<()> {
        use StoreOp::*;
        match op {
            HSet { key, .. }
            | HSetNx { key, .. }
            | HIncrBy { key, .. }
            | HDel { key, .. }
            | HGet { key, .. }
            | HGetAll { key } => self.check_kind(key, true),
            ZAdd { key, .. }
            | ZRem { key, .. }
            | ZIncrBy { key, .. }
            | ZRemRangeByScore { key, .. }
            | ZRangeWithScores { key, .. }
            | ZRevRangeWithScores { key, .. }
            | ZCard { key } => self.check_kind(key, false),
            Rename { from, .. } => {
                self.purge(from);
                if self.data.contains_key(from) {
                    Ok(())
                } else {
                    Err(StorageError::NoSuchKey(from.clone()))
                }
            }
            Del { .. } | Expire { .. } => Ok(()),
        }
    }

    fn apply(&mut self, op: &StoreOp) -> Reply {
        use StoreOp::*;
        match op {
            HSet { key, field, value } => {
                self.hash_mut(key).insert(field.clone(), value.clone());
                Reply::Unit
            }
            HSetNx { key, field, value } => {
                let h = self.hash_mut(key);
                if h.contains_key(field) {
                    Reply::Int(0)
                } else {
                    h.insert(field.clone(), value.clone());
                    Reply::Int(1)
                }
            }
            HIncrBy { key, field, delta } => {
                let h = self.hash_mut(key);
                let current: i64 = h.get(field).and_then(|v| v.parse().ok()).unwrap_or(0);
                let next = current + delta;
                h.insert(field.clone(), next.to_string());
                Reply::Int(next)
            }
            HDel { key, field } => {
                let removed = match self.data.get_mut(key) {
                    Some(Value::Hash(h)) => i64::from(h.remove(field).is_some()),
                    _ => 0,
                };
                self.drop_if_empty(key);
                Reply::Int(removed)
            }
            HGet { key, field } => {
                let value = match self.data.get(key) {
                    Some(Value::Hash(h)) => h.get(field).cloned(),
                    _ => None,
                };
                Reply::Value(value)
            }
            HGetAll { key } => {
                let map = match self.data.get(key) {
                    Some(Value::Hash(h)) => h.clone(),
                    _ => HashMap::new(),
                };
                Reply::Map(map)
            }
            ZAdd { key, score, member } => {
                let z = self.zset_mut(key);
                let added = i64::from(!z.contains_key(member));
                z.insert(member.clone(), *score);
                Reply::Int(added)
            }
            ZRem { key, member } => {
                let removed = match self.data.get_mut(key) {
                    Some(Value::ZSet(z)) => i64::from(z.remove(member).is_some()),
                    _ => 0,
                };
                self.drop_if_empty(key);
                Reply::Int(removed)
            }
            ZIncrBy { key, delta, member } => {
                let z = self.zset_mut(key);
                *z.entry(member.clone()).or_insert(0.0) += delta;
                Reply::Unit
            }
            ZRemRangeByScore { key, min, max } => {
                let removed = match self.data.get_mut(key) {
                    Some(Value::ZSet(z)) => {
                        let before = z.len();
                        z.retain(|_, s| !(min.allows_from_below(*s) && max.allows_from_above(*s)));
                        (before - z.len()) as i64
                    }
                    _ => 0,
                };
                self.drop_if_empty(key);
                Reply::Int(removed)
            }
            ZRangeWithScores { key, start, stop } => {
                let mut all = self.sorted(key);
                Reply::Scored(slice_range(&mut all, *start, *stop, false))
            }
            ZRevRangeWithScores { key, start, stop } => {
                let mut all = self.sorted(key);
                Reply::Scored(slice_range(&mut all, *start, *stop, true))
            }
            ZCard { key } => {
                let len = match self.data.get(key) {
                    Some(Value::ZSet(z)) => z.len() as i64,
                    _ => 0,
                };
                Reply::Int(len)
            }
            Rename { from, to } => {
                if let Some(value) = self.data.remove(from) {
                    self.data.insert(to.clone(), value);
                    match self.expires.remove(from) {
                        Some(at) => {
                            self.expires.insert(to.clone(), at);
                        }
                        None => {
                            self.expires.remove(to);
                        }
                    }
                }
                Reply::Unit
            }
            Del { key } => {
                let removed = i64::from(self.data.remove(key).is_some());
                self.expires.remove(key);
                Reply::Int(removed)
            }
            Expire { key, ttl } => {
                self.purge(key);
                if self.data.contains_key(key) {
                    self.expires
                        .insert(key.clone(), clock::now_sec() + ttl.as_secs() as i64);
                }
                Reply::Unit
            }
        }
    }

    fn sorted(&self, key: &str) -> Vec<ScoredMember> {
        let mut out: Vec<ScoredMember> = match self.data.get(key) {
            Some(Value::ZSet(z)) => z
                .iter()
                .map(|(m, s)| ScoredMember {
                    member: m.clone(),
                    score: *s,
                })
                .collect(),
            _ => Vec::new(),
        };
        out.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.member.cmp(&b.member))
        });
        out
    }

    fn run(&mut self, batch: &WriteBatch) -> StorageResult<Vec<Reply>> {
        for op in &batch.ops {
            self.validate(op)?;
        }
        Ok(batch.ops.iter().map(|op| self.apply(op)).collect())
    }
}

/// Apply redis index semantics (negative offsets count from the tail) to an
/// ascending score ordering.
fn slice_range(all: &mut Vec<ScoredMember>, start: i64, stop: i64, rev: bool) -> Vec<ScoredMember> {
    if rev {
        all.reverse();
    }
    let n = all.len() as i64;
    let mut s = if start < 0 { n + start } else { start };
    let mut e = if stop < 0 { n + stop } else { stop };
    if s < 0 {
        s = 0;
    }
    if e >= n {
        e = n - 1;
    }
    if n == 0 || s > e {
        return Vec::new();
    }
    all[s as usize..=e as usize].to_vec()
}

impl Store for MemoryStore {
    fn ping(&self) -> StorageResult<String> {
        Ok("PONG".to_string())
    }

    fn bgsave(&self) -> StorageResult<String> {
        Ok("Background saving started".to_string())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        match inner.data.get(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(StorageError::WrongType(key.to_string())),
        }
    }

    fn setnx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<bool> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        if inner.data.contains_key(key) {
            return Ok(false);
        }
        inner
            .data
            .insert(key.to_string(), Value::Str(value.to_string()));
        if let Some(ttl) = ttl {
            inner
                .expires
                .insert(key.to_string(), clock::now_sec() + ttl.as_secs() as i64);
        }
        Ok(true)
    }

    fn del(&self, key: &str) -> StorageResult<i64> {
        let mut batch = WriteBatch::new();
        batch.del(key);
        Ok(self.exec(batch)?[0].int())
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        Ok(inner.data.contains_key(key))
    }

    fn hget(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        let mut batch = WriteBatch::new();
        batch.hget(key, field);
        Ok(self.exec(batch)?[0].as_value().map(str::to_string))
    }

    fn hgetall(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        let mut batch = WriteBatch::new();
        batch.hgetall(key);
        Ok(self.exec(batch)?[0].as_map().cloned().unwrap_or_default())
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> StorageResult<i64> {
        let mut batch = WriteBatch::new();
        batch.zadd(key, score, member);
        Ok(self.exec(batch)?[0].int())
    }

    fn zrem_range_by_score(&self, key: &str, min: Bound, max: Bound) -> StorageResult<i64> {
        let mut batch = WriteBatch::new();
        batch.zrem_range_by_score(key, min, max);
        Ok(self.exec(batch)?[0].int())
    }

    fn zrangebyscore_withscores(
        &self,
        key: &str,
        min: Bound,
        max: Bound,
    ) -> StorageResult<Vec<ScoredMember>> {
        let mut inner = self.inner.lock();
        inner.check_kind(key, false)?;
        Ok(inner
            .sorted(key)
            .into_iter()
            .filter(|e| min.allows_from_below(e.score) && max.allows_from_above(e.score))
            .collect())
    }

    fn zrevrange_withscores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StorageResult<Vec<ScoredMember>> {
        let mut batch = WriteBatch::new();
        batch.zrevrange_withscores(key, start, stop);
        Ok(self.exec(batch)?[0].as_scored().to_vec())
    }

    fn zcard(&self, key: &str) -> StorageResult<i64> {
        let mut batch = WriteBatch::new();
        batch.zcard(key);
        Ok(self.exec(batch)?[0].int())
    }

    fn smembers(&self, key: &str) -> StorageResult<Vec<String>> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        match inner.data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(s)) => {
                let mut out: Vec<String> = s.iter().cloned().collect();
                out.sort();
                Ok(out)
            }
            Some(_) => Err(StorageError::WrongType(key.to_string())),
        }
    }

    fn scan_keys(&self, pattern: &str, _page: usize) -> StorageResult<Vec<String>> {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .expires
            .iter()
            .filter(|(_, at)| **at <= clock::now_sec())
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            inner.data.remove(&key);
            inner.expires.remove(&key);
        }
        let (head, tail) = pattern.split_once('*').unwrap_or((pattern, ""));
        Ok(inner
            .data
            .keys()
            .filter(|k| k.starts_with(head) && k.ends_with(tail))
            .cloned()
            .collect())
    }

    fn exec(&self, batch: WriteBatch) -> StorageResult<Vec<Reply>> {
        self.inner.lock().run(&batch)
    }

    fn watch_hash(
        &self,
        key: &str,
        build: &mut dyn FnMut(&HashMap<String, String>) -> StorageResult<WriteBatch>,
    ) -> StorageResult<Vec<Reply>> {
        // The single lock spans snapshot and commit, so the watched key
        // cannot change in between and the transaction never restarts.
        let mut inner = self.inner.lock();
        inner.purge(key);
        let snapshot = match inner.data.get(key) {
            Some(Value::Hash(h)) => h.clone(),
            Some(_) => return Err(StorageError::WrongType(key.to_string())),
            None => HashMap::new(),
        };
        let batch = build(&snapshot)?;
        inner.run(&batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.hset("h", "a", "1");
        batch.hincr_by("h", "b", 5);
        store.exec(batch).unwrap();

        assert_eq!(store.hget("h", "a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.hget("h", "b").unwrap().as_deref(), Some("5"));
        assert_eq!(store.hgetall("h").unwrap().len(), 2);
    }

    #[test]
    fn test_zadd_reports_new_members_only() {
        let store = MemoryStore::new();
        assert_eq!(store.zadd("z", 1.0, "m").unwrap(), 1);
        assert_eq!(store.zadd("z", 2.0, "m").unwrap(), 0);
        assert_eq!(store.zcard("z").unwrap(), 1);
    }

    #[test]
    fn test_range_by_score_respects_exclusive_bounds() {
        let store = MemoryStore::new();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            store.zadd("z", s, m).unwrap();
        }
        let hits = store
            .zrangebyscore_withscores("z", Bound::Excl(1.0), Bound::Incl(3.0))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].member, "b");
    }

    #[test]
    fn test_rev_range_with_negative_stop() {
        let store = MemoryStore::new();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            store.zadd("z", s, m).unwrap();
        }
        let all = store.zrevrange_withscores("z", 0, -1).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].member, "c");
        let top = store.zrevrange_withscores("z", 0, 0).unwrap();
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.zadd("typed", 1.0, "m").unwrap();

        let mut batch = WriteBatch::new();
        batch.hincr_by("h", "f", 10);
        batch.hset("typed", "f", "v"); // wrong kind, must abort everything
        assert!(store.exec(batch).is_err());
        assert_eq!(store.hget("h", "f").unwrap(), None);
    }

    #[test]
    fn test_rename_moves_value() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.hincr_by("from", "alice", 100);
        batch.rename("from", "to");
        store.exec(batch).unwrap();

        assert!(!store.exists("from").unwrap());
        assert_eq!(store.hget("to", "alice").unwrap().as_deref(), Some("100"));
    }

    #[test]
    fn test_rename_missing_source_fails() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.rename("missing", "to");
        assert!(matches!(
            store.exec(batch),
            Err(StorageError::NoSuchKey(_))
        ));
    }

    #[test]
    fn test_setnx_excludes_second_writer() {
        let store = MemoryStore::new();
        assert!(store.setnx("lock", "alice:1", None).unwrap());
        assert!(!store.setnx("lock", "bob:2", None).unwrap());
        store.del("lock").unwrap();
        assert!(store.setnx("lock", "bob:2", None).unwrap());
    }

    #[test]
    fn test_scan_matches_prefix_pattern() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.hset("eth:miners:alice", "balance", "1");
        batch.hset("eth:miners:bob", "balance", "2");
        batch.hset("eth:stats", "roundShares", "3");
        store.exec(batch).unwrap();

        let mut keys = store.scan_keys("eth:miners:*", 100).unwrap();
        keys.sort();
        assert_eq!(keys, vec!["eth:miners:alice", "eth:miners:bob"]);
    }

    #[test]
    fn test_watch_hash_sees_snapshot_and_commits() {
        let store = MemoryStore::new();
        let mut seed = WriteBatch::new();
        seed.hset("sheet", "alice", "700000");
        store.exec(seed).unwrap();

        store
            .watch_hash("sheet", &mut |snapshot| {
                assert_eq!(snapshot.get("alice").map(String::as_str), Some("700000"));
                let mut batch = WriteBatch::new();
                batch.del("sheet");
                batch.hincr_by("acct", "balance", 700000);
                Ok(batch)
            })
            .unwrap();

        assert!(!store.exists("sheet").unwrap());
        assert_eq!(
            store.hget("acct", "balance").unwrap().as_deref(),
            Some("700000")
        );
    }
}
