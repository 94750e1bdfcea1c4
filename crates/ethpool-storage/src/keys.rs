//! Prefixed key schema for the pool keyspace.
//!
//! The layout below is a compatibility contract with operator tooling and is
//! reproduced verbatim from the deployed keyspace:
//!
//! - `pow` (duplicate-solution guard)
//! - `shares:roundCurrent`, `shares:round{height}:{nonce}` (round ledgers)
//! - `hashrate`, `hashrate:{login}` (share streams)
//! - `miners:{login}`, `stats`, `finders`, `finances` (accounting hashes)
//! - `blocks:candidates|immature|matured` (block indices)
//! - `credits:immature:{h}:{hash}`, `credits:{h}:{hash}`, `credits:all`
//! - `payments:lock|pending|all|{login}`
//! - `charts:pool|miner:{login}|difficulty|client`, `nodes`
//! - `blacklist`, `whitelist`

use crate::codec::{join, Field};

/// Key factory carrying the configured namespace prefix.
#[derive(Debug, Clone)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn format(&self, parts: &[Field<'_>]) -> String {
        let mut all = Vec::with_capacity(parts.len() + 1);
        all.push(Field::Str(&self.prefix));
        all.extend_from_slice(parts);
        join(&all)
    }

    pub fn pow(&self) -> String {
        self.format(&["pow".into()])
    }

    /// The running round ledger.
    pub fn round_current(&self) -> String {
        self.format(&["shares".into(), "roundCurrent".into()])
    }

    /// The resolved round ledger for the block found at `height` with `nonce`.
    pub fn round(&self, height: u64, nonce: &str) -> String {
        let segment = format!("round{}", height);
        self.format(&["shares".into(), Field::Str(&segment), nonce.into()])
    }

    pub fn hashrate(&self) -> String {
        self.format(&["hashrate".into()])
    }

    pub fn miner_hashrate(&self, login: &str) -> String {
        self.format(&["hashrate".into(), login.into()])
    }

    pub fn miner(&self, login: &str) -> String {
        self.format(&["miners".into(), login.into()])
    }

    pub fn stats(&self) -> String {
        self.format(&["stats".into()])
    }

    pub fn finders(&self) -> String {
        self.format(&["finders".into()])
    }

    pub fn finances(&self) -> String {
        self.format(&["finances".into()])
    }

    pub fn candidates(&self) -> String {
        self.format(&["blocks".into(), "candidates".into()])
    }

    pub fn immature(&self) -> String {
        self.format(&["blocks".into(), "immature".into()])
    }

    pub fn matured(&self) -> String {
        self.format(&["blocks".into(), "matured".into()])
    }

    /// Provisional per-miner credits for a block awaiting maturity.
    pub fn immature_credits(&self, height: u64, hash: &str) -> String {
        self.format(&[
            "credits".into(),
            "immature".into(),
            height.into(),
            hash.into(),
        ])
    }

    /// Finalized per-miner credits for a matured block. Written once, kept.
    pub fn matured_credits(&self, height: u64, hash: &str) -> String {
        self.format(&["credits".into(), height.into(), hash.into()])
    }

    pub fn credits_all(&self) -> String {
        self.format(&["credits".into(), "all".into()])
    }

    pub fn payments_lock(&self) -> String {
        self.format(&["payments".into(), "lock".into()])
    }

    pub fn payments_pending(&self) -> String {
        self.format(&["payments".into(), "pending".into()])
    }

    pub fn payments_all(&self) -> String {
        self.format(&["payments".into(), "all".into()])
    }

    pub fn miner_payments(&self, login: &str) -> String {
        self.format(&["payments".into(), login.into()])
    }

    pub fn pool_charts(&self) -> String {
        self.format(&["charts".into(), "pool".into()])
    }

    pub fn miner_charts(&self, login: &str) -> String {
        self.format(&["charts".into(), "miner".into(), login.into()])
    }

    pub fn diff_charts(&self) -> String {
        self.format(&["charts".into(), "difficulty".into()])
    }

    pub fn client_charts(&self) -> String {
        self.format(&["charts".into(), "client".into()])
    }

    pub fn nodes(&self) -> String {
        self.format(&["nodes".into()])
    }

    pub fn blacklist(&self) -> String {
        self.format(&["blacklist".into()])
    }

    pub fn whitelist(&self) -> String {
        self.format(&["whitelist".into()])
    }

    /// Scan pattern matching every miner account hash.
    pub fn miners_pattern(&self) -> String {
        self.format(&["miners".into(), "*".into()])
    }

    /// Scan pattern matching every per-login hashrate stream.
    pub fn hashrate_pattern(&self) -> String {
        self.format(&["hashrate".into(), "*".into()])
    }

    /// Extract the login segment from a `{prefix}:miners:{login}` or
    /// `{prefix}:hashrate:{login}` key.
    pub fn login_segment(key: &str) -> Option<&str> {
        key.split(':').nth(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = Keys::new("eth");
        assert_eq!(keys.pow(), "eth:pow");
        assert_eq!(keys.round_current(), "eth:shares:roundCurrent");
        assert_eq!(keys.round(100000, "0xabc"), "eth:shares:round100000:0xabc");
        assert_eq!(keys.miner_hashrate("alice"), "eth:hashrate:alice");
        assert_eq!(
            keys.immature_credits(100000, "0xhash"),
            "eth:credits:immature:100000:0xhash"
        );
        assert_eq!(keys.matured_credits(7, "0xh"), "eth:credits:7:0xh");
        assert_eq!(keys.payments_lock(), "eth:payments:lock");
        assert_eq!(keys.miner_charts("bob"), "eth:charts:miner:bob");
    }

    #[test]
    fn test_login_segment() {
        assert_eq!(Keys::login_segment("eth:miners:alice"), Some("alice"));
        assert_eq!(Keys::login_segment("eth:hashrate"), None);
    }
}
