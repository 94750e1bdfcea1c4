//! Composite stats snapshots.

use crate::error::StatsResult;
use crate::hashrate::{self, MinerHashrate, WorkerHashrate};
use ethpool_ledger::{BlockData, MinerAccount, Payment};
use ethpool_storage::codec;
use ethpool_storage::{clock, Bound, Keys, Store, WriteBatch};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Scan page size for per-login stream enumeration.
const SCAN_PAGE: usize = 100;

/// The well-known counters kept in the `stats` hash.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolCounters {
    #[serde(rename = "roundShares")]
    pub round_shares: i64,
    #[serde(rename = "lastBlockFound")]
    pub last_block_found: i64,
}

impl PoolCounters {
    fn from_hash(hash: &HashMap<String, String>) -> Self {
        let field = |name: &str| hash.get(name).map(|v| codec::parse_i64(v)).unwrap_or(0);
        Self {
            round_shares: field("roundShares"),
            last_block_found: field("lastBlockFound"),
        }
    }
}

/// Pool-wide dashboard snapshot.
#[derive(Debug, Default, Serialize)]
pub struct PoolStats {
    #[serde(rename = "stats")]
    pub counters: PoolCounters,
    pub candidates: Vec<BlockData>,
    #[serde(rename = "candidatesTotal")]
    pub candidates_total: i64,
    pub immature: Vec<BlockData>,
    #[serde(rename = "immatureTotal")]
    pub immature_total: i64,
    pub matured: Vec<BlockData>,
    #[serde(rename = "maturedTotal")]
    pub matured_total: i64,
    pub payments: Vec<Payment>,
    #[serde(rename = "paymentsTotal")]
    pub payments_total: i64,
    pub hashrate: i64,
    pub miners: HashMap<String, MinerHashrate>,
    #[serde(rename = "minersTotal")]
    pub miners_total: usize,
    pub workers: HashMap<String, WorkerHashrate>,
    #[serde(rename = "workersTotal")]
    pub workers_total: usize,
}

/// Per-miner worker breakdown.
#[derive(Debug, Default, Serialize)]
pub struct WorkersStats {
    pub workers: HashMap<String, WorkerHashrate>,
    #[serde(rename = "workersTotal")]
    pub workers_total: usize,
    #[serde(rename = "workersOnline")]
    pub workers_online: i64,
    #[serde(rename = "workersOffline")]
    pub workers_offline: i64,
    /// Average hashrate over the large window.
    pub hashrate: i64,
    #[serde(rename = "currentHashrate")]
    pub current_hashrate: i64,
}

/// Luck ratios over one horizon of recent blocks.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Luck {
    pub luck: f64,
    #[serde(rename = "uncleRate")]
    pub uncle_rate: f64,
    #[serde(rename = "orphanRate")]
    pub orphan_rate: f64,
}

/// Account snapshot for a miner dashboard.
#[derive(Debug, Default, Serialize)]
pub struct MinerStats {
    #[serde(rename = "stats")]
    pub account: MinerAccount,
    pub payments: Vec<Payment>,
    #[serde(rename = "paymentsTotal")]
    pub payments_total: i64,
    #[serde(rename = "roundShares")]
    pub round_shares: i64,
}

/// Read-side aggregator over the shared indices.
pub struct StatsCollector<S: Store> {
    store: Arc<S>,
    keys: Keys,
}

impl<S: Store> StatsCollector<S> {
    pub fn new(store: Arc<S>, keys: Keys) -> Self {
        Self { store, keys }
    }

    /// One-batch pool snapshot. Prunes the global hashrate stream to the
    /// window as part of the same atomic unit that reads it.
    pub fn collect_stats(
        &self,
        small_window: Duration,
        max_blocks: i64,
        max_payments: i64,
    ) -> StatsResult<PoolStats> {
        let window = small_window.as_secs() as i64;
        let now = clock::now_sec();

        let mut batch = WriteBatch::new();
        batch.zrem_range_by_score(
            self.keys.hashrate(),
            Bound::NegInf,
            Bound::Excl((now - window) as f64),
        );
        batch.zrange_withscores(self.keys.hashrate(), 0, -1);
        batch.hgetall(self.keys.stats());
        batch.zrevrange_withscores(self.keys.candidates(), 0, -1);
        batch.zrevrange_withscores(self.keys.immature(), 0, -1);
        batch.zrevrange_withscores(self.keys.matured(), 0, max_blocks - 1);
        batch.zcard(self.keys.candidates());
        batch.zcard(self.keys.immature());
        batch.zcard(self.keys.matured());
        batch.zcard(self.keys.payments_all());
        batch.zrevrange_withscores(self.keys.payments_all(), 0, max_payments - 1);
        let replies = self.store.exec(batch)?;

        let counters = replies[2]
            .as_map()
            .map(PoolCounters::from_hash)
            .unwrap_or_default();
        let candidates: Vec<BlockData> = replies[3]
            .as_scored()
            .iter()
            .map(BlockData::from_candidate)
            .collect();
        let immature: Vec<BlockData> = replies[4]
            .as_scored()
            .iter()
            .map(BlockData::from_index)
            .collect();
        let matured: Vec<BlockData> = replies[5]
            .as_scored()
            .iter()
            .map(BlockData::from_index)
            .collect();
        let payments: Vec<Payment> = replies[10]
            .as_scored()
            .iter()
            .map(Payment::from_entry)
            .collect();

        let stream = replies[1].as_scored();
        let (hashrate, miners) = hashrate::miners_snapshot(now, window, stream);
        let workers = hashrate::aggregate_workers(now, window, stream);

        debug!(
            miners = miners.len(),
            hashrate, "collected pool snapshot"
        );

        Ok(PoolStats {
            counters,
            candidates,
            candidates_total: replies[6].int(),
            immature,
            immature_total: replies[7].int(),
            matured,
            matured_total: replies[8].int(),
            payments,
            payments_total: replies[9].int(),
            hashrate,
            miners_total: miners.len(),
            miners,
            workers_total: workers.len(),
            workers,
        })
    }

    /// Per-login worker snapshot over both horizons. Prunes the per-login
    /// stream to the large window in the same atomic unit.
    pub fn collect_workers_stats(
        &self,
        small_window: Duration,
        large_window: Duration,
        login: &str,
    ) -> StatsResult<WorkersStats> {
        let small = small_window.as_secs() as i64;
        let large = large_window.as_secs() as i64;
        let now = clock::now_sec();
        let key = self.keys.miner_hashrate(login);

        let mut batch = WriteBatch::new();
        batch.zrem_range_by_score(&key, Bound::NegInf, Bound::Excl((now - large) as f64));
        batch.zrange_withscores(&key, 0, -1);
        let replies = self.store.exec(batch)?;

        let mut workers = hashrate::aggregate_workers(now, small, replies[1].as_scored());

        let mut stats = WorkersStats::default();
        for worker in workers.values_mut() {
            worker.hr /= hashrate::effective_window(now, worker.started_at, small);
            worker.total_hr /= hashrate::effective_window(now, worker.started_at, large);
            if worker.last_beat < now - small / 2 {
                worker.offline = true;
                stats.workers_offline += 1;
            } else {
                stats.workers_online += 1;
            }
            stats.current_hashrate += worker.hr;
            stats.hashrate += worker.total_hr;
        }
        stats.workers_total = workers.len();
        stats.workers = workers;
        Ok(stats)
    }

    /// Luck ratios for each configured horizon, keyed by how many blocks
    /// were actually available. Stops after the first horizon that the
    /// available block count cannot fill.
    pub fn collect_luck_stats(&self, horizons: &[usize]) -> StatsResult<BTreeMap<usize, Luck>> {
        let mut stats = BTreeMap::new();
        let max = horizons.last().copied().unwrap_or(0) as i64;

        let mut batch = WriteBatch::new();
        batch.zrevrange_withscores(self.keys.immature(), 0, -1);
        batch.zrevrange_withscores(self.keys.matured(), 0, max - 1);
        let replies = self.store.exec(batch)?;

        let blocks: Vec<BlockData> = replies[0]
            .as_scored()
            .iter()
            .chain(replies[1].as_scored())
            .map(BlockData::from_index)
            .collect();

        for &horizon in horizons {
            let mut total = 0usize;
            let mut luck = 0.0f64;
            let mut uncles = 0.0f64;
            let mut orphans = 0.0f64;
            for block in blocks.iter().take(horizon) {
                if block.uncle {
                    uncles += 1.0;
                }
                if block.orphan {
                    orphans += 1.0;
                }
                luck += block.total_shares as f64 / block.difficulty as f64;
                total += 1;
            }
            if total > 0 {
                luck /= total as f64;
                uncles /= total as f64;
                orphans /= total as f64;
            }
            stats.insert(
                total,
                Luck {
                    luck,
                    uncle_rate: uncles,
                    orphan_rate: orphans,
                },
            );
            if total < horizon {
                break;
            }
        }
        Ok(stats)
    }

    /// One-batch account snapshot for a miner dashboard.
    pub fn get_miner_stats(&self, login: &str, max_payments: i64) -> StatsResult<MinerStats> {
        let mut batch = WriteBatch::new();
        batch.hgetall(self.keys.miner(login));
        batch.zrevrange_withscores(self.keys.miner_payments(login), 0, max_payments - 1);
        batch.zcard(self.keys.miner_payments(login));
        batch.hget(self.keys.round_current(), login);
        let replies = self.store.exec(batch)?;

        Ok(MinerStats {
            account: replies[0]
                .as_map()
                .map(MinerAccount::from_hash)
                .unwrap_or_default(),
            payments: replies[1]
                .as_scored()
                .iter()
                .map(Payment::from_entry)
                .collect(),
            payments_total: replies[2].int(),
            round_shares: replies[3]
                .as_value()
                .map(codec::parse_i64)
                .unwrap_or(0),
        })
    }

    /// Prune the global stream at `window` and every per-login stream at
    /// `large_window`. Returns the number of evicted entries.
    pub fn flush_stale_stats(
        &self,
        window: Duration,
        large_window: Duration,
    ) -> StatsResult<i64> {
        let now = clock::now_sec();
        let mut total = self.store.zrem_range_by_score(
            &self.keys.hashrate(),
            Bound::NegInf,
            Bound::Excl((now - window.as_secs() as i64) as f64),
        )?;

        let max = Bound::Excl((now - large_window.as_secs() as i64) as f64);
        let mut seen: HashSet<String> = HashSet::new();
        for key in self
            .store
            .scan_keys(&self.keys.hashrate_pattern(), SCAN_PAGE)?
        {
            let Some(login) = Keys::login_segment(&key) else {
                continue;
            };
            if seen.insert(login.to_string()) {
                total += self.store.zrem_range_by_score(
                    &self.keys.miner_hashrate(login),
                    Bound::NegInf,
                    max,
                )?;
            }
        }
        debug!(evicted = total, "flushed stale hashrate entries");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethpool_storage::MemoryStore;

    fn collector() -> (Arc<MemoryStore>, Keys, StatsCollector<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let keys = Keys::new("eth");
        let collector = StatsCollector::new(store.clone(), keys.clone());
        (store, keys, collector)
    }

    fn seed_matured(store: &MemoryStore, keys: &Keys, entries: &[(u64, bool, bool, i64, i64)]) {
        let mut batch = WriteBatch::new();
        for (height, uncle, orphan, shares, diff) in entries {
            let uncle_height = if *uncle { height - 1 } else { 0 };
            let member = format!(
                "{}:{}:0xn{}:0xh{}:1700000000:{}:{}:0",
                uncle_height,
                i64::from(*orphan),
                height,
                height,
                diff,
                shares
            );
            batch.zadd(keys.matured(), *height as f64, member);
        }
        store.exec(batch).unwrap();
    }

    #[test]
    fn test_luck_ratios_and_early_break() {
        let (store, keys, collector) = collector();
        seed_matured(
            &store,
            &keys,
            &[
                (100, false, false, 1000, 1000),
                (101, true, false, 3000, 1000),
                (102, false, true, 2000, 1000),
            ],
        );

        let stats = collector.collect_luck_stats(&[2, 10, 50]).unwrap();
        // Horizon 2 is filled; horizon 10 only finds 3 blocks and stops the
        // larger horizon from reporting at all.
        assert_eq!(stats.len(), 2);

        let exact = stats.get(&2).unwrap();
        assert!((exact.luck - 2.5).abs() < 1e-9);
        assert!((exact.uncle_rate - 0.5).abs() < 1e-9);

        let partial = stats.get(&3).unwrap();
        assert!((partial.luck - 2.0).abs() < 1e-9);
        assert!((partial.orphan_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_luck_on_empty_indices() {
        let (_, _, collector) = collector();
        let stats = collector.collect_luck_stats(&[5]).unwrap();
        assert_eq!(stats.len(), 1);
        let row = stats.get(&0).unwrap();
        assert_eq!(row.luck, 0.0);
        assert_eq!(row.uncle_rate, 0.0);
    }

    #[test]
    fn test_collect_stats_snapshot() {
        let (store, keys, collector) = collector();
        let now = clock::now_sec();

        let mut batch = WriteBatch::new();
        batch.hset(keys.stats(), "roundShares", "4200");
        batch.hset(keys.stats(), "lastBlockFound", "1700000000");
        batch.zadd(
            keys.hashrate(),
            (now - 10) as f64,
            format!("600000:alice:w1:{}", (now - 10) * 1000),
        );
        batch.zadd(keys.candidates(), 100000.0, "0xa:0xb:0xc:1700000000:2000000:1500");
        batch.zadd(
            keys.payments_all(),
            (now - 5) as f64,
            "0xtx:alice:700000",
        );
        store.exec(batch).unwrap();

        let stats = collector
            .collect_stats(Duration::from_secs(600), 50, 50)
            .unwrap();

        assert_eq!(stats.counters.round_shares, 4200);
        assert_eq!(stats.candidates_total, 1);
        assert_eq!(stats.candidates[0].height, 100000);
        assert_eq!(stats.payments_total, 1);
        assert_eq!(stats.payments[0].address.as_deref(), Some("alice"));
        assert_eq!(stats.miners_total, 1);
        assert_eq!(stats.hashrate, 1000);
        assert_eq!(stats.workers_total, 1);
    }

    #[test]
    fn test_collect_stats_prunes_stale_stream() {
        let (store, keys, collector) = collector();
        let now = clock::now_sec();
        store
            .zadd(&keys.hashrate(), (now - 10000) as f64, "1000:old:w:1")
            .unwrap();

        let stats = collector
            .collect_stats(Duration::from_secs(600), 50, 50)
            .unwrap();
        assert_eq!(stats.miners_total, 0);
        assert_eq!(store.zcard(&keys.hashrate()).unwrap(), 0);
    }

    #[test]
    fn test_workers_stats_two_horizons() {
        let (store, keys, collector) = collector();
        let now = clock::now_sec();
        let key = keys.miner_hashrate("alice");

        // One fresh share and one only visible in the large window.
        store
            .zadd(&key, (now - 30) as f64, &format!("600000:w1:{}", (now - 30) * 1000))
            .unwrap();
        store
            .zadd(&key, (now - 3000) as f64, &format!("600000:w1:{}", (now - 3000) * 1000))
            .unwrap();

        let stats = collector
            .collect_workers_stats(
                Duration::from_secs(600),
                Duration::from_secs(10800),
                "alice",
            )
            .unwrap();

        assert_eq!(stats.workers_total, 1);
        assert_eq!(stats.workers_online, 1);
        let worker = &stats.workers["w1"];
        // Small horizon sees one share over the whole small window; the
        // large horizon sees both shares over the 3000s uptime.
        assert_eq!(worker.hr, 600000 / 600);
        assert_eq!(worker.total_hr, 1200000 / 3000);
        assert_eq!(stats.current_hashrate, worker.hr);
        assert_eq!(stats.hashrate, worker.total_hr);
    }

    #[test]
    fn test_miner_stats_snapshot() {
        let (store, keys, collector) = collector();
        let mut batch = WriteBatch::new();
        batch.hset(keys.miner("alice"), "balance", "700000");
        batch.hset(keys.miner("alice"), "blocksFound", "2");
        batch.zadd(keys.miner_payments("alice"), 1700000000.0, "0xtx:700000");
        batch.hset(keys.round_current(), "alice", "1234");
        store.exec(batch).unwrap();

        let stats = collector.get_miner_stats("alice", 10).unwrap();
        assert_eq!(stats.account.balance, 700000);
        assert_eq!(stats.account.blocks_found, 2);
        assert_eq!(stats.payments.len(), 1);
        assert_eq!(stats.payments_total, 1);
        assert_eq!(stats.round_shares, 1234);
    }

    #[test]
    fn test_flush_prunes_both_stream_kinds() {
        let (store, keys, collector) = collector();
        let now = clock::now_sec();

        store
            .zadd(&keys.hashrate(), (now - 700) as f64, "1:alice:w:1")
            .unwrap();
        store
            .zadd(&keys.hashrate(), (now - 10) as f64, "1:alice:w:2")
            .unwrap();
        store
            .zadd(&keys.miner_hashrate("alice"), (now - 11000) as f64, "1:w:1")
            .unwrap();
        store
            .zadd(&keys.miner_hashrate("alice"), (now - 10) as f64, "1:w:2")
            .unwrap();

        let evicted = collector
            .flush_stale_stats(Duration::from_secs(600), Duration::from_secs(10800))
            .unwrap();
        assert_eq!(evicted, 2);
        assert_eq!(store.zcard(&keys.hashrate()).unwrap(), 1);
        assert_eq!(store.zcard(&keys.miner_hashrate("alice")).unwrap(), 1);
    }
}
