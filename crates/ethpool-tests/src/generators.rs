//! Proptest strategies for accounting entities.

use ethpool_ledger::Solution;
use proptest::prelude::*;
use std::collections::HashMap;

/// Miner logins: short lowercase handles.
pub fn arb_login() -> impl Strategy<Value = String> {
    "[a-z]{4,10}"
}

/// Share difficulties credited per submission.
pub fn arb_difficulty() -> impl Strategy<Value = i64> {
    1i64..=10_000_000
}

/// Block heights in a realistic operating range.
pub fn arb_height() -> impl Strategy<Value = u64> {
    1_000u64..=20_000_000
}

/// Reward amounts in Shannon.
pub fn arb_amount() -> impl Strategy<Value = i64> {
    1i64..=5_000_000_000
}

/// A reward split over one to six miners.
pub fn arb_rewards() -> impl Strategy<Value = HashMap<String, i64>> {
    prop::collection::hash_map(arb_login(), arb_amount(), 1..6)
}

/// Solutions with distinct hex components.
pub fn arb_solution() -> impl Strategy<Value = Solution> {
    ("[0-9a-f]{16}", "[0-9a-f]{16}", "[0-9a-f]{16}")
        .prop_map(|(nonce, pow, mix)| Solution::new(nonce, pow, mix))
}
