//! Typed operation batches executed as one atomic unit.

use std::collections::HashMap;
use std::time::Duration;

/// Score bound for sorted-set range operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    NegInf,
    PosInf,
    /// Inclusive bound.
    Incl(f64),
    /// Exclusive bound (`(value` in the wire form).
    Excl(f64),
}

impl Bound {
    /// Render to the store's string form.
    pub(crate) fn to_arg(self) -> String {
        fn num(x: f64) -> String {
            if x.fract() == 0.0 {
                format!("{:.0}", x)
            } else {
                x.to_string()
            }
        }
        match self {
            Bound::NegInf => "-inf".to_string(),
            Bound::PosInf => "+inf".to_string(),
            Bound::Incl(x) => num(x),
            Bound::Excl(x) => format!("({}", num(x)),
        }
    }

    /// Whether `score` satisfies `self` as a lower bound.
    pub(crate) fn allows_from_below(self, score: f64) -> bool {
        match self {
            Bound::NegInf => true,
            Bound::PosInf => false,
            Bound::Incl(x) => score >= x,
            Bound::Excl(x) => score > x,
        }
    }

    /// Whether `score` satisfies `self` as an upper bound.
    pub(crate) fn allows_from_above(self, score: f64) -> bool {
        match self {
            Bound::NegInf => false,
            Bound::PosInf => true,
            Bound::Incl(x) => score <= x,
            Bound::Excl(x) => score < x,
        }
    }
}

/// A sorted-set entry together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// A single operation inside a batch.
#[derive(Debug, Clone)]
pub enum StoreOp {
    HSet { key: String, field: String, value: String },
    HSetNx { key: String, field: String, value: String },
    HIncrBy { key: String, field: String, delta: i64 },
    HDel { key: String, field: String },
    HGet { key: String, field: String },
    HGetAll { key: String },
    ZAdd { key: String, score: f64, member: String },
    ZRem { key: String, member: String },
    ZIncrBy { key: String, delta: f64, member: String },
    ZRemRangeByScore { key: String, min: Bound, max: Bound },
    ZRangeWithScores { key: String, start: i64, stop: i64 },
    ZRevRangeWithScores { key: String, start: i64, stop: i64 },
    ZCard { key: String },
    Rename { from: String, to: String },
    Del { key: String },
    Expire { key: String, ttl: Duration },
}

/// One entry returned from an executed batch, positionally matching its op.
#[derive(Debug, Clone)]
pub enum Reply {
    Unit,
    Int(i64),
    Value(Option<String>),
    Map(HashMap<String, String>),
    Scored(Vec<ScoredMember>),
}

impl Reply {
    pub fn int(&self) -> i64 {
        match self {
            Reply::Int(n) => *n,
            _ => 0,
        }
    }

    pub fn as_value(&self) -> Option<&str> {
        match self {
            Reply::Value(v) => v.as_deref(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, String>> {
        match self {
            Reply::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scored(&self) -> &[ScoredMember] {
        match self {
            Reply::Scored(v) => v,
            _ => &[],
        }
    }
}

/// A batch of operations to be executed atomically.
///
/// All writes commit together or not at all; ops that read yield positional
/// [`Reply`] values so composite snapshots serialize in one round-trip.
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<StoreOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    pub fn hset(&mut self, key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) {
        self.ops.push(StoreOp::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
    }

    pub fn hset_nx(&mut self, key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) {
        self.ops.push(StoreOp::HSetNx {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
    }

    pub fn hincr_by(&mut self, key: impl Into<String>, field: impl Into<String>, delta: i64) {
        self.ops.push(StoreOp::HIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        });
    }

    pub fn hdel(&mut self, key: impl Into<String>, field: impl Into<String>) {
        self.ops.push(StoreOp::HDel {
            key: key.into(),
            field: field.into(),
        });
    }

    pub fn hget(&mut self, key: impl Into<String>, field: impl Into<String>) {
        self.ops.push(StoreOp::HGet {
            key: key.into(),
            field: field.into(),
        });
    }

    pub fn hgetall(&mut self, key: impl Into<String>) {
        self.ops.push(StoreOp::HGetAll { key: key.into() });
    }

    pub fn zadd(&mut self, key: impl Into<String>, score: f64, member: impl Into<String>) {
        self.ops.push(StoreOp::ZAdd {
            key: key.into(),
            score,
            member: member.into(),
        });
    }

    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) {
        self.ops.push(StoreOp::ZRem {
            key: key.into(),
            member: member.into(),
        });
    }

    pub fn zincr_by(&mut self, key: impl Into<String>, delta: f64, member: impl Into<String>) {
        self.ops.push(StoreOp::ZIncrBy {
            key: key.into(),
            delta,
            member: member.into(),
        });
    }

    pub fn zrem_range_by_score(&mut self, key: impl Into<String>, min: Bound, max: Bound) {
        self.ops.push(StoreOp::ZRemRangeByScore {
            key: key.into(),
            min,
            max,
        });
    }

    pub fn zrange_withscores(&mut self, key: impl Into<String>, start: i64, stop: i64) {
        self.ops.push(StoreOp::ZRangeWithScores {
            key: key.into(),
            start,
            stop,
        });
    }

    pub fn zrevrange_withscores(&mut self, key: impl Into<String>, start: i64, stop: i64) {
        self.ops.push(StoreOp::ZRevRangeWithScores {
            key: key.into(),
            start,
            stop,
        });
    }

    pub fn zcard(&mut self, key: impl Into<String>) {
        self.ops.push(StoreOp::ZCard { key: key.into() });
    }

    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.ops.push(StoreOp::Rename {
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn del(&mut self, key: impl Into<String>) {
        self.ops.push(StoreOp::Del { key: key.into() });
    }

    pub fn expire(&mut self, key: impl Into<String>, ttl: Duration) {
        self.ops.push(StoreOp::Expire {
            key: key.into(),
            ttl,
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
