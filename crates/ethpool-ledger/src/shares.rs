//! Share and block recording.

use crate::error::LedgerResult;
use crate::pow::DuplicateFilter;
use crate::types::Solution;
use ethpool_storage::codec::{self, join};
use ethpool_storage::{clock, Keys, Reply, Store, WriteBatch};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Records accepted shares and promotes winning shares to block candidates.
pub struct ShareRecorder<S: Store> {
    store: Arc<S>,
    keys: Keys,
    filter: DuplicateFilter<S>,
}

impl<S: Store> ShareRecorder<S> {
    pub fn new(store: Arc<S>, keys: Keys) -> Self {
        let filter = DuplicateFilter::new(store.clone(), keys.clone());
        Self {
            store,
            keys,
            filter,
        }
    }

    fn stage_share(
        &self,
        batch: &mut WriteBatch,
        ms: i64,
        ts: i64,
        login: &str,
        worker_id: &str,
        diff: i64,
        window: Duration,
    ) {
        batch.hincr_by(self.keys.round_current(), login, diff);
        batch.zadd(
            self.keys.hashrate(),
            ts as f64,
            join(&[diff.into(), login.into(), worker_id.into(), ms.into()]),
        );
        batch.zadd(
            self.keys.miner_hashrate(login),
            ts as f64,
            join(&[diff.into(), worker_id.into(), ms.into()]),
        );
        // Sliding expiry removes streams of miners that are gone.
        batch.expire(self.keys.miner_hashrate(login), window);
        batch.hset(self.keys.miner(login), "lastShare", ts.to_string());
    }

    /// Record one accepted share. Returns `true` when the solution was a
    /// duplicate and nothing was written.
    pub fn write_share(
        &self,
        login: &str,
        worker_id: &str,
        solution: &Solution,
        diff: i64,
        height: u64,
        window: Duration,
    ) -> LedgerResult<bool> {
        if self.filter.check_and_insert(height, solution)? {
            return Ok(true);
        }

        let ms = clock::now_ms();
        let ts = ms / 1000;
        let mut batch = WriteBatch::new();
        self.stage_share(&mut batch, ms, ts, login, worker_id, diff, window);
        batch.hincr_by(self.keys.stats(), "roundShares", diff);
        self.store.exec(batch)?;
        Ok(false)
    }

    /// Record a share that is also a block: performs the share writes, then
    /// closes the running round by renaming it onto the winning `(height,
    /// nonce)` and appends a candidate entry.
    ///
    /// The rename finalizes the round in the same atomic unit as the share
    /// increment, so no submission is attributed to both the closing and the
    /// next round; any share committing afterwards starts a fresh round
    /// ledger automatically.
    pub fn write_block(
        &self,
        login: &str,
        worker_id: &str,
        solution: &Solution,
        diff: i64,
        round_diff: i64,
        height: u64,
        window: Duration,
    ) -> LedgerResult<bool> {
        if self.filter.check_and_insert(height, solution)? {
            return Ok(true);
        }

        let ms = clock::now_ms();
        let ts = ms / 1000;
        let round_key = self.keys.round(height, &solution.nonce);

        let mut batch = WriteBatch::new();
        self.stage_share(&mut batch, ms, ts, login, worker_id, diff, window);
        batch.hset(self.keys.stats(), "lastBlockFound", ts.to_string());
        batch.hdel(self.keys.stats(), "roundShares");
        batch.zincr_by(self.keys.finders(), 1.0, login);
        batch.hincr_by(self.keys.miner(login), "blocksFound", 1);
        batch.rename(self.keys.round_current(), &round_key);
        batch.hgetall(&round_key);
        let replies = self.store.exec(batch)?;

        let round_shares = replies
            .last()
            .and_then(Reply::as_map)
            .cloned()
            .unwrap_or_default();
        let total_shares: i64 = round_shares.values().map(|v| codec::parse_i64(v)).sum();

        let member = join(&[
            solution.nonce.as_str().into(),
            solution.pow_hash.as_str().into(),
            solution.mix_digest.as_str().into(),
            ts.into(),
            round_diff.into(),
            total_shares.into(),
        ]);
        self.store
            .zadd(&self.keys.candidates(), height as f64, &member)?;

        debug!(login, height, total_shares, "block candidate recorded");
        Ok(false)
    }

    /// Per-login share sums of a resolved round.
    pub fn get_round_shares(&self, height: u64, nonce: &str) -> LedgerResult<HashMap<String, i64>> {
        let raw = self.store.hgetall(&self.keys.round(height, nonce))?;
        Ok(raw
            .into_iter()
            .map(|(login, v)| {
                let n = codec::parse_i64(&v);
                (login, n)
            })
            .collect())
    }

    /// Whether an account hash exists for `login`.
    pub fn is_miner_exists(&self, login: &str) -> LedgerResult<bool> {
        Ok(self.store.exists(&self.keys.miner(login))?)
    }
}
