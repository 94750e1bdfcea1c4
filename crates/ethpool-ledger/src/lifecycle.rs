//! Block lifecycle transitions.
//!
//! A block moves `candidate → immature → matured | orphaned`. Every
//! transition is one atomic store operation; the immature→terminal
//! transitions run under an optimistic watch on the block's immature credit
//! sheet so two unlocker passes cannot double-credit.

use crate::error::LedgerResult;
use crate::types::BlockData;
use ethpool_storage::codec::{self, join, Field};
use ethpool_storage::{clock, Bound, Keys, Store, WriteBatch};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Drives block state transitions and the associated reward bookkeeping.
pub struct BlockLifecycle<S: Store> {
    store: Arc<S>,
    keys: Keys,
}

impl<S: Store> BlockLifecycle<S> {
    pub fn new(store: Arc<S>, keys: Keys) -> Self {
        Self { store, keys }
    }

    fn stage_immature_index(&self, batch: &mut WriteBatch, block: &BlockData) {
        // An uncle is accepted at a different height than its shares were
        // collected at; carry the round ledger along.
        if block.height != block.round_height {
            batch.rename(
                self.keys.round(block.round_height, &block.nonce),
                self.keys.round(block.height, &block.nonce),
            );
        }
        batch.zrem(self.keys.candidates(), &block.source_member);
        batch.zadd(
            self.keys.immature(),
            block.height as f64,
            block.index_member(),
        );
    }

    fn stage_matured_index(&self, batch: &mut WriteBatch, block: &BlockData) {
        batch.del(self.keys.round(block.round_height, &block.nonce));
        batch.zrem(self.keys.immature(), &block.source_member);
        batch.zadd(
            self.keys.matured(),
            block.height as f64,
            block.index_member(),
        );
    }

    /// Candidate → immature: move the block between indices and credit the
    /// round rewards provisionally.
    pub fn write_immature_block(
        &self,
        block: &BlockData,
        round_rewards: &HashMap<String, i64>,
    ) -> LedgerResult<()> {
        let mut batch = WriteBatch::new();
        self.stage_immature_index(&mut batch, block);

        let credit_key = self.keys.immature_credits(block.height, &block.hash);
        let mut total = 0i64;
        for (login, amount) in round_rewards {
            total += amount;
            batch.hincr_by(self.keys.miner(login), "immature", *amount);
            batch.hset_nx(&credit_key, login, amount.to_string());
        }
        batch.hincr_by(self.keys.finances(), "immature", total);
        self.store.exec(batch)?;

        info!(
            height = block.height,
            hash = %block.hash,
            amount = total,
            "block credited as immature"
        );
        Ok(())
    }

    /// Immature → matured: reverse the provisional credits from the sheet,
    /// finalize balances from `round_rewards`, and update the finance
    /// totals. Restarts if the sheet changes concurrently.
    pub fn write_matured_block(
        &self,
        block: &BlockData,
        round_rewards: &HashMap<String, i64>,
    ) -> LedgerResult<()> {
        let credit_key = self.keys.immature_credits(block.round_height, &block.hash);
        let ts = clock::now_sec();

        self.store.watch_hash(&credit_key, &mut |sheet| {
            let mut batch = WriteBatch::new();
            self.stage_matured_index(&mut batch, block);
            batch.zadd(
                self.keys.credits_all(),
                block.height as f64,
                join(&[
                    block.hash.as_str().into(),
                    ts.into(),
                    Field::Big(&block.reward),
                ]),
            );

            let mut total_immature = 0i64;
            for (login, amount) in sheet {
                let amount = codec::parse_i64(amount);
                total_immature += amount;
                batch.hincr_by(self.keys.miner(login), "immature", -amount);
            }

            let matured_key = self.keys.matured_credits(block.height, &block.hash);
            let mut total = 0i64;
            for (login, amount) in round_rewards {
                total += amount;
                batch.hincr_by(self.keys.miner(login), "balance", *amount);
                batch.hset_nx(&matured_key, login, amount.to_string());
            }

            batch.del(&credit_key);
            let finances = self.keys.finances();
            batch.hincr_by(&finances, "balance", total);
            batch.hincr_by(&finances, "immature", -total_immature);
            batch.hset(&finances, "lastCreditHeight", block.height.to_string());
            batch.hset(&finances, "lastCreditHash", &block.hash);
            batch.hincr_by(&finances, "totalMined", block.reward_in_shannon());
            Ok(batch)
        })?;

        info!(height = block.height, hash = %block.hash, "block matured");
        Ok(())
    }

    /// Immature → orphan: reverse the provisional credits and file the block
    /// in the matured index with the orphan flag set. No balance is credited
    /// and no matured credit sheet is written.
    pub fn write_orphan(&self, block: &BlockData) -> LedgerResult<()> {
        let mut orphaned = block.clone();
        orphaned.orphan = true;

        let credit_key = self
            .keys
            .immature_credits(orphaned.round_height, &orphaned.hash);

        self.store.watch_hash(&credit_key, &mut |sheet| {
            let mut batch = WriteBatch::new();
            self.stage_matured_index(&mut batch, &orphaned);

            let mut total_immature = 0i64;
            for (login, amount) in sheet {
                let amount = codec::parse_i64(amount);
                total_immature += amount;
                batch.hincr_by(self.keys.miner(login), "immature", -amount);
            }

            batch.del(&credit_key);
            batch.hincr_by(self.keys.finances(), "immature", -total_immature);
            Ok(batch)
        })?;

        info!(height = orphaned.height, hash = %orphaned.hash, "block orphaned");
        Ok(())
    }

    /// File candidates the node never confirmed as immature with no rewards,
    /// so the next unlock pass observes them uniformly. All blocks go into
    /// one atomic batch.
    pub fn write_pending_orphans(&self, blocks: &[BlockData]) -> LedgerResult<()> {
        let mut batch = WriteBatch::new();
        for block in blocks {
            self.stage_immature_index(&mut batch, block);
        }
        self.store.exec(batch)?;
        Ok(())
    }

    /// Candidates at or below `max_height`, oldest first.
    pub fn get_candidates(&self, max_height: u64) -> LedgerResult<Vec<BlockData>> {
        let entries = self.store.zrangebyscore_withscores(
            &self.keys.candidates(),
            Bound::Incl(0.0),
            Bound::Incl(max_height as f64),
        )?;
        Ok(entries.iter().map(BlockData::from_candidate).collect())
    }

    /// Immature blocks at or below `max_height`, oldest first.
    pub fn get_immature_blocks(&self, max_height: u64) -> LedgerResult<Vec<BlockData>> {
        let entries = self.store.zrangebyscore_withscores(
            &self.keys.immature(),
            Bound::Incl(0.0),
            Bound::Incl(max_height as f64),
        )?;
        Ok(entries.iter().map(BlockData::from_index).collect())
    }
}
