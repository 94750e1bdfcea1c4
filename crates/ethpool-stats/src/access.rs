//! Operator access lists.

use crate::error::StatsResult;
use ethpool_storage::{Keys, Store};
use std::sync::Arc;

/// Blacklist and whitelist reads. The sets are maintained by operator
/// tooling; the pool only consults them.
pub struct AccessLists<S: Store> {
    store: Arc<S>,
    keys: Keys,
}

impl<S: Store> AccessLists<S> {
    pub fn new(store: Arc<S>, keys: Keys) -> Self {
        Self { store, keys }
    }

    pub fn get_blacklist(&self) -> StatsResult<Vec<String>> {
        Ok(self.store.smembers(&self.keys.blacklist())?)
    }

    pub fn get_whitelist(&self) -> StatsResult<Vec<String>> {
        Ok(self.store.smembers(&self.keys.whitelist())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethpool_storage::MemoryStore;

    #[test]
    fn test_lists_read_back() {
        let store = Arc::new(MemoryStore::new());
        let keys = Keys::new("eth");
        store.fill_set(&keys.blacklist(), &["mallory"]);
        store.fill_set(&keys.whitelist(), &["alice", "bob"]);

        let lists = AccessLists::new(store, keys);
        assert_eq!(lists.get_blacklist().unwrap(), vec!["mallory"]);
        assert_eq!(lists.get_whitelist().unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_missing_lists_are_empty() {
        let store = Arc::new(MemoryStore::new());
        let lists = AccessLists::new(store, Keys::new("eth"));
        assert!(lists.get_blacklist().unwrap().is_empty());
    }
}
