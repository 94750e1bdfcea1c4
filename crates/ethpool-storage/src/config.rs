//! Pool configuration.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store endpoint, `host:port`.
    pub endpoint: String,
    /// Authentication password; empty disables AUTH.
    #[serde(default)]
    pub password: String,
    /// Logical database selector.
    #[serde(default)]
    pub database: i64,
    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Key namespace prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_pool_size() -> u32 {
    10
}

fn default_prefix() -> String {
    "eth".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:6379".to_string(),
            password: String::new(),
            database: 0,
            pool_size: default_pool_size(),
            prefix: default_prefix(),
        }
    }
}

/// Accounting-core settings consumed by the share, unlocker, payout and
/// stats tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub store: StoreConfig,
    /// Current-hashrate horizon, seconds.
    #[serde(default = "default_small_window")]
    pub small_window: u64,
    /// Average-hashrate horizon, seconds.
    #[serde(default = "default_large_window")]
    pub large_window: u64,
    /// Sliding expiry of per-login hashrate streams, seconds.
    #[serde(default = "default_large_window")]
    pub per_login_window: u64,
    /// Luck horizons, in blocks.
    #[serde(default = "default_luck_horizons")]
    pub luck_horizons: Vec<usize>,
    /// Confirmation depth after which immature blocks mature. Honored by the
    /// node collaborator driving the unlocker, not by the core itself.
    #[serde(default = "default_maturity_depth")]
    pub maturity_depth: u64,
    /// Matured blocks included in a stats snapshot.
    #[serde(default = "default_max_blocks")]
    pub max_blocks: i64,
    /// Payments included in a stats snapshot.
    #[serde(default = "default_max_payments")]
    pub max_payments: i64,
}

fn default_small_window() -> u64 {
    600
}

fn default_large_window() -> u64 {
    10800
}

fn default_luck_horizons() -> Vec<usize> {
    vec![16, 64, 256]
}

fn default_maturity_depth() -> u64 {
    256
}

fn default_max_blocks() -> i64 {
    50
}

fn default_max_payments() -> i64 {
    50
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            small_window: default_small_window(),
            large_window: default_large_window(),
            per_login_window: default_large_window(),
            luck_horizons: default_luck_horizons(),
            maturity_depth: default_maturity_depth(),
            max_blocks: default_max_blocks(),
            max_payments: default_max_payments(),
        }
    }
}

impl PoolConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> StorageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StorageError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.small_window, 600);
        assert_eq!(config.store.prefix, "eth");
        assert!(!config.luck_horizons.is_empty());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: PoolConfig = toml::from_str(
            r#"
            small_window = 300

            [store]
            endpoint = "10.0.0.5:6379"
            prefix = "etc"
            "#,
        )
        .unwrap();
        assert_eq!(config.small_window, 300);
        assert_eq!(config.large_window, 10800);
        assert_eq!(config.store.endpoint, "10.0.0.5:6379");
        assert_eq!(config.store.prefix, "etc");
        assert_eq!(config.store.pool_size, 10);
    }
}
