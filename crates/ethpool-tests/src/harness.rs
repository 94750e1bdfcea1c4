//! Test harness wiring the whole accounting core over one in-memory store.

use ethpool_ledger::{BlockData, BlockLifecycle, MinerAccount, PayoutLedger, ShareRecorder, Solution};
use ethpool_stats::{AccessLists, Charts, NodeRegistry, StatsCollector};
use ethpool_storage::{codec, Keys, MemoryStore, Store};
use num_bigint::BigInt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default per-login stream expiry used by the tests.
pub const TEST_WINDOW: Duration = Duration::from_secs(10800);

/// All components sharing one [`MemoryStore`].
pub struct TestPool {
    pub store: Arc<MemoryStore>,
    pub keys: Keys,
    pub recorder: ShareRecorder<MemoryStore>,
    pub lifecycle: BlockLifecycle<MemoryStore>,
    pub payouts: PayoutLedger<MemoryStore>,
    pub stats: StatsCollector<MemoryStore>,
    pub charts: Charts<MemoryStore>,
    pub nodes: NodeRegistry<MemoryStore>,
    pub access: AccessLists<MemoryStore>,
}

impl TestPool {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let keys = Keys::new("eth");
        Self {
            recorder: ShareRecorder::new(store.clone(), keys.clone()),
            lifecycle: BlockLifecycle::new(store.clone(), keys.clone()),
            payouts: PayoutLedger::new(store.clone(), keys.clone()),
            stats: StatsCollector::new(store.clone(), keys.clone()),
            charts: Charts::new(store.clone(), keys.clone()),
            nodes: NodeRegistry::new(store.clone(), keys.clone()),
            access: AccessLists::new(store.clone(), keys.clone()),
            store,
            keys,
        }
    }

    /// Read a miner account hash back as a typed record.
    pub fn miner_account(&self, login: &str) -> MinerAccount {
        let hash = self.store.hgetall(&self.keys.miner(login)).unwrap();
        MinerAccount::from_hash(&hash)
    }

    /// Read one finance total, zero when absent.
    pub fn finance_field(&self, field: &str) -> i64 {
        self.store
            .hget(&self.keys.finances(), field)
            .unwrap()
            .map(|v| codec::parse_i64(&v))
            .unwrap_or(0)
    }

    /// Drive a full round: the given shares, then a block found by the first
    /// login, returning the candidate parsed back from its index.
    pub fn mine_block(&self, shares: &[(&str, i64)], height: u64, nonce: &str) -> BlockData {
        for (i, (login, diff)) in shares.iter().enumerate() {
            let solution = Solution::new(
                format!("{}-s{}", nonce, i),
                format!("0xp{}", i),
                format!("0xm{}", i),
            );
            let duplicate = self
                .recorder
                .write_share(login, "w1", &solution, *diff, height, TEST_WINDOW)
                .unwrap();
            assert!(!duplicate);
        }

        let winner = shares.first().map(|(login, _)| *login).unwrap_or("solo");
        let solution = Solution::new(nonce, "0xdef", "0x123");
        let duplicate = self
            .recorder
            .write_block(winner, "w1", &solution, 0, 2_000_000, height, TEST_WINDOW)
            .unwrap();
        assert!(!duplicate);

        let entries = self
            .store
            .zrevrange_withscores(&self.keys.candidates(), 0, -1)
            .unwrap();
        let entry = entries
            .iter()
            .find(|e| e.score as u64 == height)
            .expect("candidate missing");
        BlockData::from_candidate(entry)
    }

    /// Promote a candidate into immature with the given rewards, returning
    /// the block parsed back from the immature index.
    pub fn make_immature(
        &self,
        mut block: BlockData,
        hash: &str,
        reward_wei: i64,
        rewards: &HashMap<String, i64>,
    ) -> BlockData {
        block.hash = hash.to_string();
        block.reward = BigInt::from(reward_wei);
        self.lifecycle.write_immature_block(&block, rewards).unwrap();

        let entries = self
            .store
            .zrevrange_withscores(&self.keys.immature(), 0, -1)
            .unwrap();
        let entry = entries
            .iter()
            .find(|e| e.score as u64 == block.height)
            .expect("immature entry missing");
        let mut immature = BlockData::from_index(entry);
        immature.reward = BigInt::from(reward_wei);
        immature
    }
}

impl Default for TestPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a rewards map from literal pairs.
pub fn rewards(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
    pairs
        .iter()
        .map(|(login, amount)| (login.to_string(), *amount))
        .collect()
}
