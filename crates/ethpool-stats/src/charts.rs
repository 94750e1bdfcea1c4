//! Dashboard time-series.
//!
//! Chart entries live in sorted sets scored by timestamp with
//! `time:formatted-time:value(s)` members. Reads evict anything older than
//! 48 hours inside the same atomic unit, then return the most recent N
//! points in chronological order.

use crate::error::StatsResult;
use ethpool_ledger::BlockData;
use ethpool_storage::codec::{self, join};
use ethpool_storage::{clock, Bound, Keys, ScoredMember, Store, WriteBatch};
use serde::Serialize;
use std::sync::Arc;

/// Chart entries older than this are evicted on access. 48 hours.
pub const CHART_RETENTION_SECS: i64 = 172_800;

/// Pool hashrate chart point.
#[derive(Debug, Clone, Serialize)]
pub struct PoolCharts {
    #[serde(rename = "x")]
    pub timestamp: i64,
    #[serde(rename = "timeFormat")]
    pub time_format: String,
    #[serde(rename = "y")]
    pub pool_hash: i64,
}

/// Miner hashrate chart point, both horizons.
#[derive(Debug, Clone, Serialize)]
pub struct MinerCharts {
    #[serde(rename = "x")]
    pub timestamp: i64,
    #[serde(rename = "timeFormat")]
    pub time_format: String,
    #[serde(rename = "minerHash")]
    pub miner_hash: i64,
    #[serde(rename = "minerLargeHash")]
    pub miner_large_hash: i64,
    #[serde(rename = "workerOnline")]
    pub worker_online: String,
}

/// Daily payment chart point.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentCharts {
    #[serde(rename = "x")]
    pub timestamp: i64,
    #[serde(rename = "timeFormat")]
    pub time_format: String,
    pub amount: i64,
}

/// Network difficulty chart point.
#[derive(Debug, Clone, Serialize)]
pub struct NetCharts {
    #[serde(rename = "x")]
    pub timestamp: i64,
    #[serde(rename = "timeFormat")]
    pub time_format: String,
    #[serde(rename = "y")]
    pub net_hash: i64,
}

/// Connected client chart point.
#[derive(Debug, Clone, Serialize)]
pub struct ClientCharts {
    #[serde(rename = "x")]
    pub timestamp: i64,
    #[serde(rename = "timeFormat")]
    pub time_format: String,
    #[serde(rename = "y")]
    pub client_total: i64,
}

/// Per-block luck chart row.
#[derive(Debug, Clone, Serialize)]
pub struct LuckCharts {
    #[serde(rename = "x")]
    pub timestamp: i64,
    pub height: u64,
    pub difficulty: i64,
    pub shares: i64,
    #[serde(rename = "sharesDiff")]
    pub shares_diff: f64,
    pub reward: String,
}

/// Chart reader/writer over the shared sorted sets.
pub struct Charts<S: Store> {
    store: Arc<S>,
    keys: Keys,
}

impl<S: Store> Charts<S> {
    pub fn new(store: Arc<S>, keys: Keys) -> Self {
        Self { store, keys }
    }

    pub fn write_pool_chart(
        &self,
        ts: i64,
        time_format: &str,
        pool_hash: &str,
    ) -> StatsResult<()> {
        let member = join(&[ts.into(), time_format.into(), pool_hash.into()]);
        self.store.zadd(&self.keys.pool_charts(), ts as f64, &member)?;
        Ok(())
    }

    pub fn write_miner_chart(
        &self,
        ts: i64,
        time_format: &str,
        login: &str,
        hash: i64,
        large_hash: i64,
        worker_online: i64,
    ) -> StatsResult<()> {
        let member = join(&[
            ts.into(),
            time_format.into(),
            hash.into(),
            large_hash.into(),
            worker_online.into(),
        ]);
        self.store
            .zadd(&self.keys.miner_charts(login), ts as f64, &member)?;
        Ok(())
    }

    pub fn write_diff_chart(&self, ts: i64, time_format: &str, net_hash: &str) -> StatsResult<()> {
        let member = join(&[ts.into(), time_format.into(), net_hash.into()]);
        self.store.zadd(&self.keys.diff_charts(), ts as f64, &member)?;
        Ok(())
    }

    pub fn write_client_chart(
        &self,
        ts: i64,
        time_format: &str,
        client_total: &str,
    ) -> StatsResult<()> {
        let member = join(&[ts.into(), time_format.into(), client_total.into()]);
        self.store
            .zadd(&self.keys.client_charts(), ts as f64, &member)?;
        Ok(())
    }

    /// Evict expired points and fetch the newest `limit`, oldest first.
    fn read_chart(&self, key: &str, limit: i64) -> StatsResult<Vec<ScoredMember>> {
        let now = clock::now_sec();
        let mut batch = WriteBatch::new();
        batch.zrem_range_by_score(
            key,
            Bound::NegInf,
            Bound::Excl((now - CHART_RETENTION_SECS) as f64),
        );
        batch.zrevrange_withscores(key, 0, limit);
        let replies = self.store.exec(batch)?;
        let mut entries = replies[1].as_scored().to_vec();
        entries.reverse();
        Ok(entries)
    }

    pub fn get_pool_charts(&self, limit: i64) -> StatsResult<Vec<PoolCharts>> {
        let entries = self.read_chart(&self.keys.pool_charts(), limit)?;
        Ok(entries
            .iter()
            .map(|e| {
                let (time_format, value) = split_format_value(&e.member);
                PoolCharts {
                    timestamp: e.score as i64,
                    time_format,
                    pool_hash: value,
                }
            })
            .collect())
    }

    pub fn get_miner_charts(&self, limit: i64, login: &str) -> StatsResult<Vec<MinerCharts>> {
        let entries = self.read_chart(&self.keys.miner_charts(login), limit)?;
        Ok(entries
            .iter()
            .map(|e| {
                let fields: Vec<&str> = e.member.split(':').collect();
                let field = |i: usize| fields.get(i).copied().unwrap_or("");
                MinerCharts {
                    timestamp: e.score as i64,
                    time_format: field(1).to_string(),
                    miner_hash: codec::parse_i64(field(2)),
                    miner_large_hash: codec::parse_i64(field(3)),
                    worker_online: field(4).to_string(),
                }
            })
            .collect())
    }

    pub fn get_net_charts(&self, limit: i64) -> StatsResult<Vec<NetCharts>> {
        let entries = self.read_chart(&self.keys.diff_charts(), limit)?;
        Ok(entries
            .iter()
            .map(|e| {
                let (time_format, value) = split_format_value(&e.member);
                NetCharts {
                    timestamp: e.score as i64,
                    time_format,
                    net_hash: value,
                }
            })
            .collect())
    }

    pub fn get_client_charts(&self, limit: i64) -> StatsResult<Vec<ClientCharts>> {
        let entries = self.read_chart(&self.keys.client_charts(), limit)?;
        Ok(entries
            .iter()
            .map(|e| {
                let (time_format, value) = split_format_value(&e.member);
                ClientCharts {
                    timestamp: e.score as i64,
                    time_format,
                    client_total: value,
                }
            })
            .collect())
    }

    /// Payments bucketed by day; the bucket timestamp snaps to midnight and
    /// amounts within a day sum.
    pub fn get_payment_charts(&self, login: &str) -> StatsResult<Vec<PaymentCharts>> {
        let entries = self
            .store
            .zrevrange_withscores(&self.keys.miner_payments(login), 0, 360)?;

        let mut rows: Vec<PaymentCharts> = Vec::new();
        for entry in &entries {
            let ts = entry.score as i64;
            let time_format = format!("{} 00_00", format_day(ts));
            let amount =
                codec::parse_i64(entry.member.split(':').nth(1).unwrap_or(""));
            if let Some(row) = rows.iter_mut().find(|r| r.time_format == time_format) {
                row.amount += amount;
            } else {
                rows.push(PaymentCharts {
                    timestamp: ts - ts.rem_euclid(86400),
                    time_format,
                    amount,
                });
            }
        }
        rows.reverse();
        Ok(rows)
    }

    /// Luck rows for the most recent matured blocks, oldest first.
    pub fn collect_luck_charts(&self, max_blocks: i64) -> StatsResult<Vec<LuckCharts>> {
        let entries = self
            .store
            .zrevrange_withscores(&self.keys.matured(), 0, max_blocks - 1)?;

        let mut rows: Vec<LuckCharts> = entries
            .iter()
            .map(BlockData::from_index)
            .map(|block| LuckCharts {
                timestamp: block.timestamp,
                height: block.round_height,
                difficulty: block.difficulty,
                shares: block.total_shares,
                shares_diff: block.total_shares as f64 / block.difficulty as f64,
                reward: block.reward_string.clone(),
            })
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }
}

/// Split a `time:formatted-time:value` member around its first and last
/// separators; the formatted time may itself contain `:`.
fn split_format_value(member: &str) -> (String, i64) {
    let first = member.find(':');
    let last = member.rfind(':');
    match (first, last) {
        (Some(first), Some(last)) if last > first => (
            member[first + 1..last].to_string(),
            codec::parse_i64(&member[last + 1..]),
        ),
        _ => (String::new(), 0),
    }
}

/// `YYYY-MM-DD` in UTC, via the days-to-civil-date algorithm.
fn format_day(ts: i64) -> String {
    let days = ts.div_euclid(86_400);
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{:04}-{:02}-{:02}", y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethpool_storage::MemoryStore;

    fn charts() -> (Arc<MemoryStore>, Keys, Charts<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let keys = Keys::new("eth");
        let charts = Charts::new(store.clone(), keys.clone());
        (store, keys, charts)
    }

    #[test]
    fn test_format_day() {
        assert_eq!(format_day(0), "1970-01-01");
        assert_eq!(format_day(1700000000), "2023-11-14");
        assert_eq!(format_day(86_399), "1970-01-01");
        assert_eq!(format_day(86_400), "1970-01-02");
    }

    #[test]
    fn test_pool_chart_roundtrip_ascending() {
        let (_, _, charts) = charts();
        let now = clock::now_sec();
        charts
            .write_pool_chart(now - 120, "2024-01-01 10:00", "5000")
            .unwrap();
        charts
            .write_pool_chart(now - 60, "2024-01-01 10:02", "6000")
            .unwrap();

        let rows = charts.get_pool_charts(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].timestamp < rows[1].timestamp);
        assert_eq!(rows[0].pool_hash, 5000);
        // The formatted time keeps its inner colon.
        assert_eq!(rows[0].time_format, "2024-01-01 10:00");
    }

    #[test]
    fn test_chart_write_is_idempotent() {
        let (store, keys, charts) = charts();
        let now = clock::now_sec();
        charts.write_pool_chart(now, "t", "5000").unwrap();
        charts.write_pool_chart(now, "t", "5000").unwrap();
        assert_eq!(store.zcard(&keys.pool_charts()).unwrap(), 1);
    }

    #[test]
    fn test_chart_read_evicts_expired_points() {
        let (store, keys, charts) = charts();
        let now = clock::now_sec();
        charts
            .write_pool_chart(now - CHART_RETENTION_SECS - 10, "old", "1")
            .unwrap();
        charts.write_pool_chart(now, "new", "2").unwrap();

        let rows = charts.get_pool_charts(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time_format, "new");
        assert_eq!(store.zcard(&keys.pool_charts()).unwrap(), 1);
    }

    #[test]
    fn test_miner_chart_fields() {
        let (_, _, charts) = charts();
        let now = clock::now_sec();
        charts
            .write_miner_chart(now, "2024-01-01", "alice", 1000, 900, 3)
            .unwrap();

        let rows = charts.get_miner_charts(10, "alice").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].miner_hash, 1000);
        assert_eq!(rows[0].miner_large_hash, 900);
        assert_eq!(rows[0].worker_online, "3");
    }

    #[test]
    fn test_payment_charts_bucket_by_day() {
        let (store, keys, charts) = charts();
        let day = 1700006400; // some time on 2023-11-15 UTC
        let mut batch = WriteBatch::new();
        batch.zadd(keys.miner_payments("alice"), day as f64, "0xa:100");
        batch.zadd(
            keys.miner_payments("alice"),
            (day + 3600) as f64,
            "0xb:250",
        );
        batch.zadd(
            keys.miner_payments("alice"),
            (day + 90000) as f64,
            "0xc:40",
        );
        store.exec(batch).unwrap();

        let rows = charts.get_payment_charts("alice").unwrap();
        assert_eq!(rows.len(), 2);
        // Ascending: the first row is the earlier day, with both payments
        // summed and the timestamp snapped to midnight.
        assert_eq!(rows[0].amount, 350);
        assert_eq!(rows[0].timestamp % 86400, 0);
        assert_eq!(rows[1].amount, 40);
    }

    #[test]
    fn test_luck_charts_sorted_by_time() {
        let (store, keys, charts) = charts();
        let mut batch = WriteBatch::new();
        batch.zadd(keys.matured(), 101.0, "0:0:0xn:0xh1:2000:1000:1500:4000000000");
        batch.zadd(keys.matured(), 102.0, "0:0:0xn:0xh2:1000:1000:3000:4000000000");
        store.exec(batch).unwrap();

        let rows = charts.collect_luck_charts(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 1000);
        assert!((rows[0].shares_diff - 3.0).abs() < 1e-9);
        assert_eq!(rows[1].shares_diff, 1.5);
        assert_eq!(rows[0].reward, "4000000000");
    }
}
