//! Shard Member Cache
//!
//! Snapshot of shard membership per routing key. Entries are shared as
//! `Arc` slices so a refresh never pulls a list out from under a reader.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{NodeId, RoutingKey};

/// Cached member list for one shard
pub type MemberList = Arc<[NodeId]>;

/// Member cache keyed by routing key
#[derive(Default)]
pub struct MemberCache {
    entries: RwLock<HashMap<RoutingKey, MemberList>>,
}

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached members for `key`, if any
    pub fn get(&self, key: &RoutingKey) -> Option<MemberList> {
        self.entries.read().get(key).cloned()
    }

    /// Replace the entry for `key` and return the new snapshot
    pub fn replace(&self, key: RoutingKey, members: Vec<NodeId>) -> MemberList {
        let list: MemberList = members.into();
        self.entries.write().insert(key, Arc::clone(&list));
        list
    }

    /// Drop the entry for `key`; the next lookup refreshes it
    pub fn invalidate(&self, key: &RoutingKey) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Drop every entry (e.g. after a view change)
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn test_replace_keeps_old_snapshot_alive() {
        let cache = MemberCache::new();
        let key = RoutingKey::new(DataType(0), 0, 1);

        assert!(cache.get(&key).is_none());
        cache.replace(key, vec![5, 7, 9]);

        let snapshot = cache.get(&key).unwrap();
        cache.replace(key, vec![7]);

        assert_eq!(&snapshot[..], &[5, 7, 9]);
        assert_eq!(&cache.get(&key).unwrap()[..], &[7]);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = MemberCache::new();
        let a = RoutingKey::new(DataType(0), 0, 0);
        let b = RoutingKey::new(DataType(0), 0, 1);
        cache.replace(a, vec![1]);
        cache.replace(b, vec![2]);

        assert!(cache.invalidate(&a));
        assert!(!cache.invalidate(&a));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
