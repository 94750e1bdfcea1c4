//! Core accounting entities.

use ethpool_storage::codec::{self, join, Field};
use ethpool_storage::ScoredMember;
use num_bigint::BigInt;
use serde::Serialize;
use std::collections::HashMap;

/// Smallest reward denomination, in wei.
pub const SHANNON: i64 = 1_000_000_000;

/// A submitted proof-of-work solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub nonce: String,
    pub pow_hash: String,
    pub mix_digest: String,
}

impl Solution {
    pub fn new(
        nonce: impl Into<String>,
        pow_hash: impl Into<String>,
        mix_digest: impl Into<String>,
    ) -> Self {
        Self {
            nonce: nonce.into(),
            pow_hash: pow_hash.into(),
            mix_digest: mix_digest.into(),
        }
    }

    /// `nonce:powhash:mixdigest`.
    pub(crate) fn member(&self) -> String {
        join(&[
            self.nonce.as_str().into(),
            self.pow_hash.as_str().into(),
            self.mix_digest.as_str().into(),
        ])
    }
}

/// A block found by the pool, in any lifecycle state.
///
/// `round_height` is the height at which the block's shares were collected;
/// `height` may differ once the chain accepts the block as an uncle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlockData {
    pub height: u64,
    #[serde(skip)]
    pub round_height: u64,
    #[serde(rename = "uncleHeight")]
    pub uncle_height: u64,
    pub uncle: bool,
    pub orphan: bool,
    #[serde(skip)]
    pub nonce: String,
    #[serde(skip)]
    pub pow_hash: String,
    #[serde(skip)]
    pub mix_digest: String,
    pub hash: String,
    pub timestamp: i64,
    pub difficulty: i64,
    #[serde(rename = "shares")]
    pub total_shares: i64,
    /// Full-precision reward in wei, supplied by the node collaborator.
    /// Zero on blocks parsed back from an index.
    #[serde(skip)]
    pub reward: BigInt,
    /// Reward as stored in the index member (Shannon, decimal).
    #[serde(rename = "reward")]
    pub reward_string: String,
    /// The exact member string this block was parsed from, used to remove it
    /// from its current index.
    #[serde(skip)]
    pub(crate) source_member: String,
}

impl BlockData {
    /// Reward converted to Shannon for storage.
    pub fn reward_in_shannon(&self) -> i64 {
        i64::try_from(&(&self.reward / SHANNON)).unwrap_or(0)
    }

    fn hash_or_default(&self) -> &str {
        if self.hash.is_empty() {
            "0x0"
        } else {
            &self.hash
        }
    }

    /// `nonce:powhash:mixdigest:timestamp:difficulty:totalShares`.
    pub(crate) fn candidate_member(&self) -> String {
        join(&[
            self.nonce.as_str().into(),
            self.pow_hash.as_str().into(),
            self.mix_digest.as_str().into(),
            self.timestamp.into(),
            self.difficulty.into(),
            self.total_shares.into(),
        ])
    }

    /// `uncleHeight:orphan:nonce:hash:timestamp:difficulty:totalShares:rewardShannon`.
    pub(crate) fn index_member(&self) -> String {
        join(&[
            self.uncle_height.into(),
            self.orphan.into(),
            self.nonce.as_str().into(),
            self.hash_or_default().into(),
            self.timestamp.into(),
            self.difficulty.into(),
            self.total_shares.into(),
            self.reward_in_shannon().into(),
        ])
    }

    /// Parse a candidate-index entry.
    pub fn from_candidate(entry: &ScoredMember) -> Self {
        let fields: Vec<&str> = entry.member.split(':').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("");
        let height = entry.score as u64;
        Self {
            height,
            round_height: height,
            nonce: field(0).to_string(),
            pow_hash: field(1).to_string(),
            mix_digest: field(2).to_string(),
            timestamp: codec::parse_i64(field(3)),
            difficulty: codec::parse_i64(field(4)),
            total_shares: codec::parse_i64(field(5)),
            source_member: entry.member.clone(),
            ..Default::default()
        }
    }

    /// Parse an immature- or matured-index entry.
    pub fn from_index(entry: &ScoredMember) -> Self {
        let fields: Vec<&str> = entry.member.split(':').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("");
        let height = entry.score as u64;
        let uncle_height = codec::parse_u64(field(0));
        Self {
            height,
            round_height: height,
            uncle_height,
            uncle: uncle_height > 0,
            orphan: codec::parse_bool(field(1)),
            nonce: field(2).to_string(),
            hash: field(3).to_string(),
            timestamp: codec::parse_i64(field(4)),
            difficulty: codec::parse_i64(field(5)),
            total_shares: codec::parse_i64(field(6)),
            reward_string: field(7).to_string(),
            source_member: entry.member.clone(),
            ..Default::default()
        }
    }
}

/// A miner account hash, parsed with zero defaults for absent fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MinerAccount {
    #[serde(rename = "lastShare")]
    pub last_share: i64,
    pub balance: i64,
    pub pending: i64,
    pub paid: i64,
    pub immature: i64,
    #[serde(rename = "blocksFound")]
    pub blocks_found: i64,
}

impl MinerAccount {
    pub fn from_hash(hash: &HashMap<String, String>) -> Self {
        let field = |name: &str| hash.get(name).map(|v| codec::parse_i64(v)).unwrap_or(0);
        Self {
            last_share: field("lastShare"),
            balance: field("balance"),
            pending: field("pending"),
            paid: field("paid"),
            immature: field("immature"),
            blocks_found: field("blocksFound"),
        }
    }
}

/// A confirmed payment entry.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub timestamp: i64,
    pub tx: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub amount: i64,
}

impl Payment {
    /// Parse `txhash:login:amount` (pool-wide index) or `txhash:amount`
    /// (per-login index) by arity.
    pub fn from_entry(entry: &ScoredMember) -> Self {
        let fields: Vec<&str> = entry.member.split(':').collect();
        if fields.len() < 3 {
            Self {
                timestamp: entry.score as i64,
                tx: fields.first().copied().unwrap_or("").to_string(),
                address: None,
                amount: codec::parse_i64(fields.get(1).copied().unwrap_or("")),
            }
        } else {
            Self {
                timestamp: entry.score as i64,
                tx: fields[0].to_string(),
                address: Some(fields[1].to_string()),
                amount: codec::parse_i64(fields[2]),
            }
        }
    }
}

/// A queued payment awaiting on-chain confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPayment {
    pub timestamp: i64,
    #[serde(rename = "login")]
    pub address: String,
    pub amount: i64,
}

impl PendingPayment {
    /// Parse a `login:amount` entry scored by enqueue time.
    pub fn from_entry(entry: &ScoredMember) -> Self {
        let fields: Vec<&str> = entry.member.split(':').collect();
        Self {
            timestamp: entry.score as i64,
            address: fields.first().copied().unwrap_or("").to_string(),
            amount: codec::parse_i64(fields.get(1).copied().unwrap_or("")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> BlockData {
        BlockData {
            height: 100000,
            round_height: 100000,
            nonce: "0xabc".to_string(),
            pow_hash: "0xdef".to_string(),
            mix_digest: "0x123".to_string(),
            hash: "0xhash".to_string(),
            timestamp: 1700000000,
            difficulty: 2000000,
            total_shares: 1500,
            reward: BigInt::from(4_000_000_000_000_000_000i64),
            ..Default::default()
        }
    }

    #[test]
    fn test_candidate_member_layout() {
        assert_eq!(
            block().candidate_member(),
            "0xabc:0xdef:0x123:1700000000:2000000:1500"
        );
    }

    #[test]
    fn test_index_member_layout() {
        let mut b = block();
        b.orphan = true;
        assert_eq!(
            b.index_member(),
            "0:1:0xabc:0xhash:1700000000:2000000:1500:4000000000"
        );
    }

    #[test]
    fn test_index_member_defaults_missing_hash() {
        let mut b = block();
        b.hash = String::new();
        assert!(b.index_member().contains(":0x0:"));
    }

    #[test]
    fn test_candidate_roundtrip() {
        let b = block();
        let parsed = BlockData::from_candidate(&ScoredMember {
            member: b.candidate_member(),
            score: 100000.0,
        });
        assert_eq!(parsed.height, 100000);
        assert_eq!(parsed.round_height, 100000);
        assert_eq!(parsed.nonce, "0xabc");
        assert_eq!(parsed.total_shares, 1500);
        assert!(!parsed.orphan);
    }

    #[test]
    fn test_index_parse_flags() {
        let parsed = BlockData::from_index(&ScoredMember {
            member: "100001:0:0xabc:0xhash:1700000000:2000000:1500:3500000000".to_string(),
            score: 100002.0,
        });
        assert_eq!(parsed.height, 100002);
        assert_eq!(parsed.uncle_height, 100001);
        assert!(parsed.uncle);
        assert!(!parsed.orphan);
        assert_eq!(parsed.reward_string, "3500000000");
    }

    #[test]
    fn test_reward_in_shannon() {
        assert_eq!(block().reward_in_shannon(), 4_000_000_000);
        assert_eq!(BlockData::default().reward_in_shannon(), 0);
    }

    #[test]
    fn test_payment_arity() {
        let all = Payment::from_entry(&ScoredMember {
            member: "0xtx:alice:700000".to_string(),
            score: 1700000000.0,
        });
        assert_eq!(all.address.as_deref(), Some("alice"));
        assert_eq!(all.amount, 700000);

        let own = Payment::from_entry(&ScoredMember {
            member: "0xtx:700000".to_string(),
            score: 1700000000.0,
        });
        assert_eq!(own.address, None);
        assert_eq!(own.amount, 700000);
    }

    #[test]
    fn test_block_json_shape() {
        let value = serde_json::to_value(block()).unwrap();
        assert_eq!(value["height"], 100000);
        assert_eq!(value["shares"], 1500);
        assert_eq!(value["uncleHeight"], 0);
        assert!(value.get("nonce").is_none());
    }
}
