//! Hashrate stream aggregation.
//!
//! Stream members are `difficulty:identity:…` where identity is the login on
//! the global stream and the worker id on a per-login stream; the positional
//! parse below only touches the first two fields, so the same fold serves
//! both.

use ethpool_storage::codec;
use ethpool_storage::ScoredMember;
use serde::Serialize;
use std::collections::HashMap;

/// Minimum effective averaging window, seconds. Prevents spiky hashrate for
/// freshly connected miners.
pub const HASHRATE_FLOOR_SECS: i64 = 600;

/// Per-miner hashrate snapshot entry.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MinerHashrate {
    #[serde(rename = "lastBeat")]
    pub last_beat: i64,
    pub hr: i64,
    pub offline: bool,
    #[serde(skip)]
    pub started_at: i64,
}

/// Per-worker hashrate snapshot entry, carrying both horizons.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WorkerHashrate {
    #[serde(rename = "lastBeat")]
    pub last_beat: i64,
    pub hr: i64,
    /// Share sum over the large window.
    #[serde(rename = "hr2")]
    pub total_hr: i64,
    pub offline: bool,
    #[serde(skip)]
    pub started_at: i64,
}

/// The divisor applied to a share sum: the window, floored at ten minutes
/// and capped by how long the identity has been observed.
pub fn effective_window(now: i64, started_at: i64, window: i64) -> i64 {
    let mut online = now - started_at;
    if online < HASHRATE_FLOOR_SECS {
        online = HASHRATE_FLOOR_SECS;
    }
    online.min(window)
}

/// Fold stream entries into per-identity worker rows. `hr` only counts
/// entries within `window` of `now`; `total_hr` counts everything handed in.
pub(crate) fn aggregate_workers(
    now: i64,
    window: i64,
    entries: &[ScoredMember],
) -> HashMap<String, WorkerHashrate> {
    let mut workers: HashMap<String, WorkerHashrate> = HashMap::new();
    for entry in entries {
        let mut parts = entry.member.split(':');
        let share = codec::parse_i64(parts.next().unwrap_or(""));
        let id = parts.next().unwrap_or("").to_string();
        let score = entry.score as i64;

        let worker = workers.entry(id).or_default();
        worker.total_hr += share;
        if score >= now - window {
            worker.hr += share;
        }
        if worker.last_beat < score {
            worker.last_beat = score;
        }
        if worker.started_at > score || worker.started_at == 0 {
            worker.started_at = score;
        }
    }
    workers
}

/// Fold the (already window-pruned) global stream into per-login rows with
/// finalized rates. Returns the pool-wide hashrate alongside.
pub(crate) fn miners_snapshot(
    now: i64,
    window: i64,
    entries: &[ScoredMember],
) -> (i64, HashMap<String, MinerHashrate>) {
    let mut miners: HashMap<String, MinerHashrate> = HashMap::new();
    for entry in entries {
        let mut parts = entry.member.split(':');
        let share = codec::parse_i64(parts.next().unwrap_or(""));
        let login = parts.next().unwrap_or("").to_string();
        let score = entry.score as i64;

        let miner = miners.entry(login).or_default();
        miner.hr += share;
        if miner.last_beat < score {
            miner.last_beat = score;
        }
        if miner.started_at > score || miner.started_at == 0 {
            miner.started_at = score;
        }
    }

    let mut total = 0i64;
    for miner in miners.values_mut() {
        miner.hr /= effective_window(now, miner.started_at, window);
        if miner.last_beat < now - window / 2 {
            miner.offline = true;
        }
        total += miner.hr;
    }
    (total, miners)
}
