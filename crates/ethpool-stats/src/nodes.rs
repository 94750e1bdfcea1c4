//! Node heartbeat registry.
//!
//! All nodes share one hash; field names are `id:attr` composites and are
//! scattered back into per-node maps on read.

use crate::error::StatsResult;
use ethpool_storage::codec::{self, join};
use ethpool_storage::{clock, Keys, Store, WriteBatch};
use num_bigint::BigInt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One upstream node's last reported state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeState {
    pub name: String,
    pub height: u64,
    pub difficulty: String,
    #[serde(rename = "lastBeat")]
    pub last_beat: i64,
    pub blocktime: f64,
}

/// Heartbeat writer/reader.
pub struct NodeRegistry<S: Store> {
    store: Arc<S>,
    keys: Keys,
}

impl<S: Store> NodeRegistry<S> {
    pub fn new(store: Arc<S>, keys: Keys) -> Self {
        Self { store, keys }
    }

    pub fn write_node_state(
        &self,
        id: &str,
        height: u64,
        difficulty: &BigInt,
        blocktime: f64,
    ) -> StatsResult<()> {
        let now = clock::now_sec();
        let key = self.keys.nodes();
        let mut batch = WriteBatch::new();
        batch.hset(&key, join(&[id.into(), "name".into()]), id);
        batch.hset(
            &key,
            join(&[id.into(), "height".into()]),
            height.to_string(),
        );
        batch.hset(
            &key,
            join(&[id.into(), "difficulty".into()]),
            difficulty.to_str_radix(10),
        );
        batch.hset(&key, join(&[id.into(), "lastBeat".into()]), now.to_string());
        batch.hset(
            &key,
            join(&[id.into(), "blocktime".into()]),
            format!("{:.4}", blocktime),
        );
        self.store.exec(batch)?;
        Ok(())
    }

    pub fn get_node_states(&self) -> StatsResult<Vec<NodeState>> {
        let raw = self.store.hgetall(&self.keys.nodes())?;
        let mut nodes: HashMap<String, NodeState> = HashMap::new();
        for (field, value) in &raw {
            let Some((id, attr)) = field.split_once(':') else {
                continue;
            };
            let node = nodes.entry(id.to_string()).or_default();
            match attr {
                "name" => node.name = value.clone(),
                "height" => node.height = codec::parse_u64(value),
                "difficulty" => node.difficulty = value.clone(),
                "lastBeat" => node.last_beat = codec::parse_i64(value),
                "blocktime" => node.blocktime = codec::parse_f64(value),
                _ => {}
            }
        }
        let mut out: Vec<NodeState> = nodes.into_values().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethpool_storage::MemoryStore;

    #[test]
    fn test_heartbeat_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let registry = NodeRegistry::new(store, Keys::new("eth"));

        let difficulty = BigInt::from(123456789u64);
        registry
            .write_node_state("geth-1", 100000, &difficulty, 13.2)
            .unwrap();
        registry
            .write_node_state("geth-2", 100001, &difficulty, 13.0)
            .unwrap();

        let nodes = registry.get_node_states().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "geth-1");
        assert_eq!(nodes[0].height, 100000);
        assert_eq!(nodes[0].difficulty, "123456789");
        assert!((nodes[0].blocktime - 13.2).abs() < 1e-9);
        assert!(nodes[0].last_beat > 0);
    }

    #[test]
    fn test_rewrite_overwrites_fields() {
        let store = Arc::new(MemoryStore::new());
        let registry = NodeRegistry::new(store, Keys::new("eth"));

        let difficulty = BigInt::from(1u64);
        registry
            .write_node_state("geth-1", 100, &difficulty, 10.0)
            .unwrap();
        registry
            .write_node_state("geth-1", 200, &difficulty, 10.0)
            .unwrap();

        let nodes = registry.get_node_states().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].height, 200);
    }
}
