//! Redis-backed store implementation.

use crate::batch::{Bound, Reply, ScoredMember, StoreOp, WriteBatch};
use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::store::Store;
use r2d2::{Pool, PooledConnection};
use redis::{from_redis_value, Client, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// How many times a watched transaction restarts before giving up.
const MAX_WATCH_RESTARTS: usize = 64;

/// Redis-backed [`Store`] with a fixed-size connection pool.
pub struct RedisStore {
    pool: Pool<Client>,
}

impl RedisStore {
    /// Connect to the store described by `cfg`.
    pub fn open(cfg: &StoreConfig) -> StorageResult<Self> {
        let url = if cfg.password.is_empty() {
            format!("redis://{}/{}", cfg.endpoint, cfg.database)
        } else {
            format!("redis://:{}@{}/{}", cfg.password, cfg.endpoint, cfg.database)
        };
        let client = Client::open(url.as_str())?;
        let pool = Pool::builder().max_size(cfg.pool_size).build(client)?;
        info!(endpoint = %cfg.endpoint, database = cfg.database, "connected to store");
        Ok(Self { pool })
    }

    fn conn(&self) -> StorageResult<PooledConnection<Client>> {
        Ok(self.pool.get()?)
    }
}

fn push_op(pipe: &mut redis::Pipeline, op: &StoreOp) {
    use StoreOp::*;
    match op {
        HSet { key, field, value } => {
            pipe.cmd("HSET").arg(key).arg(field).arg(value);
        }
        HSetNx { key, field, value } => {
            pipe.cmd("HSETNX").arg(key).arg(field).arg(value);
        }
        HIncrBy { key, field, delta } => {
            pipe.cmd("HINCRBY").arg(key).arg(field).arg(*delta);
        }
        HDel { key, field } => {
            pipe.cmd("HDEL").arg(key).arg(field);
        }
        HGet { key, field } => {
            pipe.cmd("HGET").arg(key).arg(field);
        }
        HGetAll { key } => {
            pipe.cmd("HGETALL").arg(key);
        }
        ZAdd { key, score, member } => {
            pipe.cmd("ZADD").arg(key).arg(*score).arg(member);
        }
        ZRem { key, member } => {
            pipe.cmd("ZREM").arg(key).arg(member);
        }
        ZIncrBy { key, delta, member } => {
            pipe.cmd("ZINCRBY").arg(key).arg(*delta).arg(member);
        }
        ZRemRangeByScore { key, min, max } => {
            pipe.cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg(min.to_arg())
                .arg(max.to_arg());
        }
        ZRangeWithScores { key, start, stop } => {
            pipe.cmd("ZRANGE")
                .arg(key)
                .arg(*start)
                .arg(*stop)
                .arg("WITHSCORES");
        }
        ZRevRangeWithScores { key, start, stop } => {
            pipe.cmd("ZREVRANGE")
                .arg(key)
                .arg(*start)
                .arg(*stop)
                .arg("WITHSCORES");
        }
        ZCard { key } => {
            pipe.cmd("ZCARD").arg(key);
        }
        Rename { from, to } => {
            pipe.cmd("RENAME").arg(from).arg(to);
        }
        Del { key } => {
            pipe.cmd("DEL").arg(key);
        }
        Expire { key, ttl } => {
            pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs());
        }
    }
}

fn convert(op: &StoreOp, value: Value) -> StorageResult<Reply> {
    use StoreOp::*;
    Ok(match op {
        HSetNx { .. } | HIncrBy { .. } | HDel { .. } | ZAdd { .. } | ZRem { .. }
        | ZRemRangeByScore { .. } | ZCard { .. } | Del { .. } => {
            Reply::Int(from_redis_value(&value)?)
        }
        HGet { .. } => Reply::Value(from_redis_value(&value)?),
        HGetAll { .. } => Reply::Map(from_redis_value(&value)?),
        ZRangeWithScores { .. } | ZRevRangeWithScores { .. } => {
            let pairs: Vec<(String, f64)> = from_redis_value(&value)?;
            Reply::Scored(
                pairs
                    .into_iter()
                    .map(|(member, score)| ScoredMember { member, score })
                    .collect(),
            )
        }
        _ => Reply::Unit,
    })
}

fn convert_all(batch: &WriteBatch, values: Vec<Value>) -> StorageResult<Vec<Reply>> {
    batch
        .ops
        .iter()
        .zip(values)
        .map(|(op, value)| convert(op, value))
        .collect()
}

impl Store for RedisStore {
    fn ping(&self) -> StorageResult<String> {
        Ok(redis::cmd("PING").query(&mut *self.conn()?)?)
    }

    fn bgsave(&self) -> StorageResult<String> {
        Ok(redis::cmd("BGSAVE").query(&mut *self.conn()?)?)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(redis::cmd("GET").arg(key).query(&mut *self.conn()?)?)
    }

    fn setnx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }
        let reply: Option<String> = cmd.query(&mut *self.conn()?)?;
        Ok(reply.is_some())
    }

    fn del(&self, key: &str) -> StorageResult<i64> {
        Ok(redis::cmd("DEL").arg(key).query(&mut *self.conn()?)?)
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(redis::cmd("EXISTS").arg(key).query(&mut *self.conn()?)?)
    }

    fn hget(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        Ok(redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query(&mut *self.conn()?)?)
    }

    fn hgetall(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        Ok(redis::cmd("HGETALL").arg(key).query(&mut *self.conn()?)?)
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> StorageResult<i64> {
        Ok(redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query(&mut *self.conn()?)?)
    }

    fn zrem_range_by_score(&self, key: &str, min: Bound, max: Bound) -> StorageResult<i64> {
        Ok(redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(min.to_arg())
            .arg(max.to_arg())
            .query(&mut *self.conn()?)?)
    }

    fn zrangebyscore_withscores(
        &self,
        key: &str,
        min: Bound,
        max: Bound,
    ) -> StorageResult<Vec<ScoredMember>> {
        let pairs: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min.to_arg())
            .arg(max.to_arg())
            .arg("WITHSCORES")
            .query(&mut *self.conn()?)?;
        Ok(pairs
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    fn zrevrange_withscores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StorageResult<Vec<ScoredMember>> {
        let pairs: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query(&mut *self.conn()?)?;
        Ok(pairs
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    fn zcard(&self, key: &str) -> StorageResult<i64> {
        Ok(redis::cmd("ZCARD").arg(key).query(&mut *self.conn()?)?)
    }

    fn smembers(&self, key: &str) -> StorageResult<Vec<String>> {
        Ok(redis::cmd("SMEMBERS").arg(key).query(&mut *self.conn()?)?)
    }

    fn scan_keys(&self, pattern: &str, page: usize) -> StorageResult<Vec<String>> {
        let mut con = self.conn()?;
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(page as u64)
                .query(&mut *con)?;
            out.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(out)
    }

    fn exec(&self, batch: WriteBatch) -> StorageResult<Vec<Reply>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut con = self.conn()?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &batch.ops {
            push_op(&mut pipe, op);
        }
        let raw: Vec<Value> = pipe.query(&mut *con)?;
        convert_all(&batch, raw)
    }

    fn watch_hash(
        &self,
        key: &str,
        build: &mut dyn FnMut(&HashMap<String, String>) -> StorageResult<WriteBatch>,
    ) -> StorageResult<Vec<Reply>> {
        let mut con = self.conn()?;
        for _ in 0..MAX_WATCH_RESTARTS {
            redis::cmd("WATCH").arg(key).query::<()>(&mut *con)?;
            let snapshot: HashMap<String, String> =
                redis::cmd("HGETALL").arg(key).query(&mut *con)?;

            let batch = match build(&snapshot) {
                Ok(batch) => batch,
                Err(e) => {
                    let _: () = redis::cmd("UNWATCH").query(&mut *con)?;
                    return Err(e);
                }
            };

            let mut pipe = redis::pipe();
            pipe.atomic();
            for op in &batch.ops {
                push_op(&mut pipe, op);
            }
            // EXEC answers nil when the watched key changed underneath us.
            let raw: Option<Vec<Value>> = pipe.query(&mut *con)?;
            match raw {
                Some(values) => return convert_all(&batch, values),
                None => {
                    debug!(key, "watched transaction restarted");
                    continue;
                }
            }
        }
        Err(StorageError::Conflict(key.to_string()))
    }
}
