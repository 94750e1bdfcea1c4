//! At-most-once acceptance of proof-of-work solutions.

use crate::error::LedgerResult;
use crate::types::Solution;
use ethpool_storage::{Bound, Keys, Store};
use std::sync::Arc;

/// Heights a recorded solution stays guarded. Covers any plausible short
/// reorg; older entries cannot re-collide meaningfully.
pub const DUPLICATE_WINDOW: u64 = 8;

/// Guard set rejecting replayed solutions.
pub struct DuplicateFilter<S: Store> {
    store: Arc<S>,
    keys: Keys,
}

impl<S: Store> DuplicateFilter<S> {
    pub fn new(store: Arc<S>, keys: Keys) -> Self {
        Self { store, keys }
    }

    /// Record a solution at `height`; returns `true` when it was already
    /// seen. The guard set is pruned below `height − 8` on every call, so it
    /// stays bounded by the window times the peak share rate.
    ///
    /// The single-element sorted-set add serializes concurrent submitters:
    /// at most one caller observes `false` for a given tuple.
    pub fn check_and_insert(&self, height: u64, solution: &Solution) -> LedgerResult<bool> {
        let key = self.keys.pow();
        let floor = height.saturating_sub(DUPLICATE_WINDOW);
        self.store
            .zrem_range_by_score(&key, Bound::NegInf, Bound::Excl(floor as f64))?;
        let added = self.store.zadd(&key, height as f64, &solution.member())?;
        Ok(added == 0)
    }
}
