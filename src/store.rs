//! Shard Store
//!
//! The replicated object hosted by every member of a shard. Mutations are
//! committed in the substrate's total order; reads can target the latest
//! state, a past version, or a point in time.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::substrate::{Operation, Reply};
use crate::types::{Object, ObjectKey, Version, WriteReceipt, INVALID_VERSION};

/// A committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committed {
    pub object: Object,
    pub removed: bool,
}

impl Committed {
    pub fn receipt(&self) -> WriteReceipt {
        WriteReceipt {
            version: self.object.version,
            timestamp_us: self.object.timestamp_us,
        }
    }
}

/// State of one shard replica
pub trait ShardStore: Send {
    /// Apply a mutation at the given commit time
    fn commit(&mut self, op: &Operation, timestamp_us: u64) -> Result<Committed>;

    /// Serve a read-only operation
    fn query(&self, op: &Operation) -> Result<Reply>;

    /// Latest committed version
    fn latest_version(&self) -> Version;
}

/// In-memory versioned key/value store
///
/// Versions are dense and start at zero, so a version is also the index of
/// its record in the log. Removes are kept as tombstones.
#[derive(Debug, Default)]
pub struct VersionedStore {
    log: Vec<Committed>,
    latest_by_key: HashMap<ObjectKey, Version>,
}

impl VersionedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> Version {
        self.log.len() as Version
    }

    /// Clamp a requested version to what exists; `None` means latest
    fn resolve_version(&self, version: Option<Version>) -> Option<Version> {
        let latest = self.latest_version();
        if latest == INVALID_VERSION {
            return None;
        }
        match version {
            None => Some(latest),
            Some(v) if v < 0 => None,
            Some(v) => Some(v.min(latest)),
        }
    }

    /// Last version committed at or before `timestamp_us`
    fn version_at_time(&self, timestamp_us: u64) -> Option<Version> {
        let count = self
            .log
            .partition_point(|record| record.object.timestamp_us <= timestamp_us);
        if count == 0 {
            None
        } else {
            Some((count - 1) as Version)
        }
    }

    fn record(&self, version: Version) -> Option<&Committed> {
        usize::try_from(version).ok().and_then(|i| self.log.get(i))
    }

    /// Record for `key` as of `version`, tombstones included
    fn record_for_key(&self, key: &str, version: Version) -> Option<&Committed> {
        let mut cursor = *self.latest_by_key.get(key)?;
        while cursor != INVALID_VERSION {
            let record = self.record(cursor)?;
            if cursor <= version {
                return Some(record);
            }
            cursor = record.object.previous_version_by_key;
        }
        None
    }

    fn get(&self, key: &str, version: Option<Version>) -> Option<Object> {
        let version = self.resolve_version(version)?;
        self.record_for_key(key, version)
            .filter(|record| !record.removed)
            .map(|record| record.object.clone())
    }

    fn list_keys(&self, version: Option<Version>) -> Vec<ObjectKey> {
        let Some(version) = self.resolve_version(version) else {
            return Vec::new();
        };
        let mut live = BTreeSet::new();
        for record in &self.log[..=version as usize] {
            if record.removed {
                live.remove(&record.object.key);
            } else {
                live.insert(record.object.key.clone());
            }
        }
        live.into_iter().collect()
    }
}

impl ShardStore for VersionedStore {
    fn commit(&mut self, op: &Operation, timestamp_us: u64) -> Result<Committed> {
        let (mut object, removed) = match op {
            Operation::Put(object) => (object.clone(), false),
            Operation::Remove(key) => (Object::new(key.clone(), bytes::Bytes::new()), true),
            other => {
                return Err(Error::Internal(format!(
                    "{} is not a mutation",
                    other.kind()
                )))
            }
        };

        let version = self.next_version();
        // timestamps never go backwards within a shard
        let floor = self
            .log
            .last()
            .map(|record| record.object.timestamp_us)
            .unwrap_or(0);

        object.version = version;
        object.timestamp_us = timestamp_us.max(floor);
        object.previous_version = version - 1;
        object.previous_version_by_key = self
            .latest_by_key
            .get(&object.key)
            .copied()
            .unwrap_or(INVALID_VERSION);

        self.latest_by_key.insert(object.key.clone(), version);
        let committed = Committed { object, removed };
        self.log.push(committed.clone());
        Ok(committed)
    }

    fn query(&self, op: &Operation) -> Result<Reply> {
        let reply = match op {
            Operation::Get { key, version } => Reply::Object(self.get(key, *version)),
            Operation::GetRecord { key, version } => Reply::Record(
                self.resolve_version(*version)
                    .and_then(|v| self.record_for_key(key, v))
                    .cloned(),
            ),
            Operation::GetByTime { key, timestamp_us } => Reply::Object(
                self.version_at_time(*timestamp_us)
                    .and_then(|v| self.get(key, Some(v))),
            ),
            Operation::GetSize { key, version } => {
                Reply::Size(self.get(key, *version).map(|o| o.size()).unwrap_or(0))
            }
            Operation::GetSizeByTime { key, timestamp_us } => Reply::Size(
                self.version_at_time(*timestamp_us)
                    .and_then(|v| self.get(key, Some(v)))
                    .map(|o| o.size())
                    .unwrap_or(0),
            ),
            Operation::ListKeys { version } => Reply::Keys(self.list_keys(*version)),
            Operation::ListKeysByTime { timestamp_us } => Reply::Keys(
                self.version_at_time(*timestamp_us)
                    .map(|v| self.list_keys(Some(v)))
                    .unwrap_or_default(),
            ),
            Operation::Put(_) | Operation::Remove(_) => {
                return Err(Error::Internal(format!(
                    "{} must be committed, not queried",
                    op.kind()
                )))
            }
        };
        Ok(reply)
    }

    fn latest_version(&self) -> Version {
        self.next_version() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(store: &mut VersionedStore, key: &str, value: &str, ts: u64) -> Committed {
        store
            .commit(&Operation::Put(Object::new(key, value.to_string())), ts)
            .unwrap()
    }

    fn get(store: &VersionedStore, key: &str, version: Option<Version>) -> Option<Object> {
        match store
            .query(&Operation::Get {
                key: key.into(),
                version,
            })
            .unwrap()
        {
            Reply::Object(o) => o,
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_versions_and_history() {
        let mut store = VersionedStore::new();
        assert_eq!(store.latest_version(), INVALID_VERSION);

        let a1 = put(&mut store, "a", "one", 100);
        let b1 = put(&mut store, "b", "x", 200);
        let a2 = put(&mut store, "a", "two", 300);

        assert_eq!(a1.object.version, 0);
        assert_eq!(b1.object.version, 1);
        assert_eq!(a2.object.version, 2);
        assert_eq!(a2.object.previous_version, 1);
        assert_eq!(a2.object.previous_version_by_key, 0);
        assert_eq!(a1.object.previous_version_by_key, INVALID_VERSION);

        assert_eq!(&get(&store, "a", None).unwrap().value[..], b"two");
        assert_eq!(&get(&store, "a", Some(1)).unwrap().value[..], b"one");
        assert!(get(&store, "b", Some(0)).is_none());
        assert!(get(&store, "missing", None).is_none());
    }

    #[test]
    fn test_remove_is_a_tombstone() {
        let mut store = VersionedStore::new();
        put(&mut store, "a", "one", 10);
        let removed = store.commit(&Operation::Remove("a".into()), 20).unwrap();
        assert!(removed.removed);
        assert_eq!(removed.object.previous_version_by_key, 0);

        assert!(get(&store, "a", None).is_none());
        assert!(get(&store, "a", Some(0)).is_some());
        assert_eq!(
            store.query(&Operation::ListKeys { version: None }).unwrap(),
            Reply::Keys(vec![])
        );
        assert_eq!(
            store.query(&Operation::ListKeys { version: Some(0) }).unwrap(),
            Reply::Keys(vec!["a".to_string()])
        );
    }

    #[test]
    fn test_record_reads_include_tombstones() {
        let mut store = VersionedStore::new();
        put(&mut store, "a", "one", 10);
        store.commit(&Operation::Remove("a".into()), 20).unwrap();

        let record = |version| match store
            .query(&Operation::GetRecord {
                key: "a".into(),
                version,
            })
            .unwrap()
        {
            Reply::Record(record) => record,
            other => panic!("unexpected reply {:?}", other),
        };
        let tombstone = record(None).unwrap();
        assert!(tombstone.removed);
        assert_eq!(tombstone.object.version, 1);
        assert_eq!(tombstone.object.previous_version_by_key, 0);

        let live = record(Some(0)).unwrap();
        assert!(!live.removed);
        assert_eq!(&live.object.value[..], b"one");
    }

    #[test]
    fn test_reads_by_time() {
        let mut store = VersionedStore::new();
        put(&mut store, "a", "one", 100);
        put(&mut store, "a", "three", 300);
        put(&mut store, "b", "bb", 400);

        let at = |ts| match store
            .query(&Operation::GetByTime {
                key: "a".into(),
                timestamp_us: ts,
            })
            .unwrap()
        {
            Reply::Object(o) => o.map(|o| o.value),
            other => panic!("unexpected reply {:?}", other),
        };
        assert!(at(50).is_none());
        assert_eq!(&at(150).unwrap()[..], b"one");
        assert_eq!(&at(1000).unwrap()[..], b"three");

        assert_eq!(
            store
                .query(&Operation::GetSizeByTime {
                    key: "a".into(),
                    timestamp_us: 350
                })
                .unwrap(),
            Reply::Size(5)
        );
        assert_eq!(
            store
                .query(&Operation::ListKeysByTime { timestamp_us: 350 })
                .unwrap(),
            Reply::Keys(vec!["a".to_string()])
        );
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let mut store = VersionedStore::new();
        put(&mut store, "a", "1", 500);
        let second = put(&mut store, "b", "2", 100);
        assert_eq!(second.object.timestamp_us, 500);
    }

    #[test]
    fn test_wrong_operation_kind() {
        let mut store = VersionedStore::new();
        assert!(store
            .commit(&Operation::ListKeys { version: None }, 0)
            .is_err());
        assert!(store.query(&Operation::Remove("a".into())).is_err());
    }
}
