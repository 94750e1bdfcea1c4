//! Payout ledger: balance → pending → paid, with compensating rollback.

use crate::error::{LedgerError, LedgerResult};
use crate::types::PendingPayment;
use ethpool_storage::codec::{self, join};
use ethpool_storage::{clock, Keys, Store, WriteBatch};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Scan page size for miner account enumeration.
const SCAN_PAGE: usize = 100;

/// Single-writer payout bookkeeping.
///
/// The protocol is: [`lock_payouts`](Self::lock_payouts), then for each payee
/// [`update_balance`](Self::update_balance) followed by exactly one of
/// [`write_payment`](Self::write_payment) or
/// [`rollback_balance`](Self::rollback_balance) before the lock is released.
pub struct PayoutLedger<S: Store> {
    store: Arc<S>,
    keys: Keys,
}

impl<S: Store> PayoutLedger<S> {
    pub fn new(store: Arc<S>, keys: Keys) -> Self {
        Self { store, keys }
    }

    /// Acquire the payout lock. The lock carries no TTL: a crashed payout
    /// process requires a manual unlock, which is preferable to two writers
    /// moving `pending` balances at once.
    pub fn lock_payouts(&self, login: &str, amount: i64) -> LedgerResult<()> {
        let key = self.keys.payments_lock();
        let token = join(&[login.into(), amount.into()]);
        if !self.store.setnx(&key, &token, None)? {
            return Err(LedgerError::LockHeld(key));
        }
        debug!(login, amount, "payout lock acquired");
        Ok(())
    }

    pub fn unlock_payouts(&self) -> LedgerResult<()> {
        self.store.del(&self.keys.payments_lock())?;
        Ok(())
    }

    pub fn is_payouts_locked(&self) -> LedgerResult<bool> {
        Ok(self.store.get(&self.keys.payments_lock())?.is_some())
    }

    /// Move `amount` from balance to pending and enqueue the payment.
    pub fn update_balance(&self, login: &str, amount: i64) -> LedgerResult<()> {
        let ts = clock::now_sec();
        let mut batch = WriteBatch::new();
        batch.hincr_by(self.keys.miner(login), "balance", -amount);
        batch.hincr_by(self.keys.miner(login), "pending", amount);
        batch.hincr_by(self.keys.finances(), "balance", -amount);
        batch.hincr_by(self.keys.finances(), "pending", amount);
        batch.zadd(
            self.keys.payments_pending(),
            ts as f64,
            join(&[login.into(), amount.into()]),
        );
        self.store.exec(batch)?;
        Ok(())
    }

    /// Reverse [`update_balance`](Self::update_balance) exactly, after a
    /// failed broadcast.
    pub fn rollback_balance(&self, login: &str, amount: i64) -> LedgerResult<()> {
        let mut batch = WriteBatch::new();
        batch.hincr_by(self.keys.miner(login), "balance", amount);
        batch.hincr_by(self.keys.miner(login), "pending", -amount);
        batch.hincr_by(self.keys.finances(), "balance", amount);
        batch.hincr_by(self.keys.finances(), "pending", -amount);
        batch.zrem(
            self.keys.payments_pending(),
            join(&[login.into(), amount.into()]),
        );
        self.store.exec(batch)?;
        Ok(())
    }

    /// Settle a broadcast payment: pending → paid, record the transaction in
    /// the pool-wide and per-login payment indices, drop the queue entry and
    /// release the lock.
    pub fn write_payment(&self, login: &str, tx_hash: &str, amount: i64) -> LedgerResult<()> {
        let ts = clock::now_sec();
        let mut batch = WriteBatch::new();
        batch.hincr_by(self.keys.miner(login), "pending", -amount);
        batch.hincr_by(self.keys.miner(login), "paid", amount);
        batch.hincr_by(self.keys.finances(), "pending", -amount);
        batch.hincr_by(self.keys.finances(), "paid", amount);
        batch.zadd(
            self.keys.payments_all(),
            ts as f64,
            join(&[tx_hash.into(), login.into(), amount.into()]),
        );
        batch.zadd(
            self.keys.miner_payments(login),
            ts as f64,
            join(&[tx_hash.into(), amount.into()]),
        );
        batch.zrem(
            self.keys.payments_pending(),
            join(&[login.into(), amount.into()]),
        );
        batch.del(self.keys.payments_lock());
        self.store.exec(batch)?;

        debug!(login, tx_hash, amount, "payment settled");
        Ok(())
    }

    /// Available balance for `login`; absent accounts read as zero.
    pub fn get_balance(&self, login: &str) -> LedgerResult<i64> {
        let raw = self.store.hget(&self.keys.miner(login), "balance")?;
        Ok(raw.map(|v| codec::parse_i64(&v)).unwrap_or(0))
    }

    /// Queued payments, most recent first.
    pub fn get_pending_payments(&self) -> LedgerResult<Vec<PendingPayment>> {
        let entries = self
            .store
            .zrevrange_withscores(&self.keys.payments_pending(), 0, -1)?;
        Ok(entries.iter().map(PendingPayment::from_entry).collect())
    }

    /// Every login with a miner account hash.
    pub fn get_payees(&self) -> LedgerResult<Vec<String>> {
        let keys = self
            .store
            .scan_keys(&self.keys.miners_pattern(), SCAN_PAGE)?;
        let unique: HashSet<String> = keys
            .iter()
            .filter_map(|k| Keys::login_segment(k))
            .map(str::to_string)
            .collect();
        Ok(unique.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethpool_storage::MemoryStore;

    fn ledger() -> (Arc<MemoryStore>, Keys, PayoutLedger<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let keys = Keys::new("eth");
        let ledger = PayoutLedger::new(store.clone(), keys.clone());
        (store, keys, ledger)
    }

    fn seed_balance(store: &MemoryStore, keys: &Keys, login: &str, amount: i64) {
        let mut batch = WriteBatch::new();
        batch.hincr_by(keys.miner(login), "balance", amount);
        batch.hincr_by(keys.finances(), "balance", amount);
        store.exec(batch).unwrap();
    }

    #[test]
    fn test_lock_is_exclusive() {
        let (_, _, ledger) = ledger();
        ledger.lock_payouts("alice", 700000).unwrap();
        assert!(ledger.is_payouts_locked().unwrap());
        assert!(matches!(
            ledger.lock_payouts("bob", 1),
            Err(LedgerError::LockHeld(_))
        ));
        ledger.unlock_payouts().unwrap();
        assert!(!ledger.is_payouts_locked().unwrap());
        ledger.lock_payouts("bob", 1).unwrap();
    }

    #[test]
    fn test_payment_happy_path() {
        let (store, keys, ledger) = ledger();
        seed_balance(&store, &keys, "alice", 700000);

        ledger.lock_payouts("alice", 700000).unwrap();
        ledger.update_balance("alice", 700000).unwrap();

        assert_eq!(ledger.get_balance("alice").unwrap(), 0);
        assert_eq!(
            store.hget(&keys.miner("alice"), "pending").unwrap().as_deref(),
            Some("700000")
        );
        assert_eq!(ledger.get_pending_payments().unwrap().len(), 1);

        ledger.write_payment("alice", "0xtx", 700000).unwrap();

        assert_eq!(
            store.hget(&keys.miner("alice"), "pending").unwrap().as_deref(),
            Some("0")
        );
        assert_eq!(
            store.hget(&keys.miner("alice"), "paid").unwrap().as_deref(),
            Some("700000")
        );
        assert_eq!(
            store.hget(&keys.finances(), "paid").unwrap().as_deref(),
            Some("700000")
        );
        assert!(ledger.get_pending_payments().unwrap().is_empty());
        assert!(!ledger.is_payouts_locked().unwrap());

        let all = store.zrevrange_withscores(&keys.payments_all(), 0, -1).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].member.starts_with("0xtx:alice:"));
        assert_eq!(store.zcard(&keys.miner_payments("alice")).unwrap(), 1);
    }

    #[test]
    fn test_rollback_restores_pre_state() {
        let (store, keys, ledger) = ledger();
        seed_balance(&store, &keys, "alice", 700000);

        let before_miner = store.hgetall(&keys.miner("alice")).unwrap();
        let before_finances = store.hgetall(&keys.finances()).unwrap();

        ledger.lock_payouts("alice", 700000).unwrap();
        ledger.update_balance("alice", 700000).unwrap();
        ledger.rollback_balance("alice", 700000).unwrap();
        ledger.unlock_payouts().unwrap();

        let mut after_miner = store.hgetall(&keys.miner("alice")).unwrap();
        let mut after_finances = store.hgetall(&keys.finances()).unwrap();
        // The transit leaves zeroed fields behind; they read as the same
        // account state.
        after_miner.retain(|_, v| v != "0");
        after_finances.retain(|_, v| v != "0");
        assert_eq!(after_miner, before_miner);
        assert_eq!(after_finances, before_finances);
        assert!(ledger.get_pending_payments().unwrap().is_empty());
    }

    #[test]
    fn test_get_payees_deduplicates() {
        let (store, keys, ledger) = ledger();
        seed_balance(&store, &keys, "alice", 1);
        seed_balance(&store, &keys, "bob", 2);
        seed_balance(&store, &keys, "alice", 3);

        let mut payees = ledger.get_payees().unwrap();
        payees.sort();
        assert_eq!(payees, vec!["alice", "bob"]);
    }

    #[test]
    fn test_missing_account_reads_zero_balance() {
        let (_, _, ledger) = ledger();
        assert_eq!(ledger.get_balance("ghost").unwrap(), 0);
    }
}
