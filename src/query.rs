//! Query Helpers
//!
//! Iterators over routed reads: every object of a shard or subgroup at a
//! chosen point in history, and the version chain of one key. Each step
//! is a blocking routed call, so these are for plain threads, not async
//! tasks.

use crate::error::Result;
use crate::routing::ServiceClient;
use crate::store::Committed;
use crate::types::{
    DataType, Object, ObjectKey, RoutingKey, ShardIndex, SubgroupIndex, Version, INVALID_VERSION,
};

/// Point in a shard's history to read at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPoint {
    #[default]
    Latest,
    Version(Version),
    /// Microseconds since the Unix epoch
    Time(u64),
}

impl ReadPoint {
    fn list_keys(self, client: &ServiceClient, key: RoutingKey) -> Result<Vec<ObjectKey>> {
        match self {
            ReadPoint::Latest => client.list_keys(key, None)?.wait(),
            ReadPoint::Version(v) => client.list_keys(key, Some(v))?.wait(),
            ReadPoint::Time(ts) => client.list_keys_by_time(key, ts)?.wait(),
        }
    }

    fn get(self, client: &ServiceClient, key: RoutingKey, object_key: ObjectKey) -> Result<Option<Object>> {
        match self {
            ReadPoint::Latest => client.get(key, object_key, None)?.wait(),
            ReadPoint::Version(v) => client.get(key, object_key, Some(v))?.wait(),
            ReadPoint::Time(ts) => client.get_by_time(key, object_key, ts)?.wait(),
        }
    }
}

/// Every object of one shard
///
/// Keys are listed up front; objects are fetched one call per step.
/// A key removed between the listing and its fetch is skipped.
pub struct ShardScan<'a> {
    client: &'a ServiceClient,
    key: RoutingKey,
    point: ReadPoint,
    keys: std::vec::IntoIter<ObjectKey>,
    failed: bool,
}

impl<'a> ShardScan<'a> {
    pub fn new(client: &'a ServiceClient, key: RoutingKey, point: ReadPoint) -> Result<Self> {
        let keys = point.list_keys(client, key)?;
        tracing::debug!(%key, keys = keys.len(), "shard scan");
        Ok(Self {
            client,
            key,
            point,
            keys: keys.into_iter(),
            failed: false,
        })
    }

    /// Keys not fetched yet
    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

impl Iterator for ShardScan<'_> {
    type Item = Result<Object>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for object_key in self.keys.by_ref() {
            match self.point.get(self.client, self.key, object_key) {
                Ok(Some(object)) => return Some(Ok(object)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Versions of one key, newest first
///
/// Starts at the key's state as of `from` (latest when `None`) and follows
/// `previous_version_by_key` back to the key's first write. Removes are
/// stepped over, so versions written before a remove are still listed.
pub struct VersionHistory<'a> {
    client: &'a ServiceClient,
    key: RoutingKey,
    object_key: ObjectKey,
    next: Option<Option<Version>>,
}

impl<'a> VersionHistory<'a> {
    pub fn new(
        client: &'a ServiceClient,
        key: RoutingKey,
        object_key: impl Into<ObjectKey>,
        from: Option<Version>,
    ) -> Self {
        Self {
            client,
            key,
            object_key: object_key.into(),
            next: Some(from),
        }
    }

    fn record(&self, version: Option<Version>) -> Result<Option<Committed>> {
        self.client
            .get_record(self.key, self.object_key.clone(), version)?
            .wait()
    }
}

impl Iterator for VersionHistory<'_> {
    type Item = Result<Object>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let version = self.next.take()?;
            let record = match self.record(version) {
                Ok(Some(record)) => record,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            let previous = record.object.previous_version_by_key;
            if previous != INVALID_VERSION {
                self.next = Some(Some(previous));
            }
            if !record.removed {
                return Some(Ok(record.object));
            }
        }
    }
}

/// Every object of a subgroup, shard by shard
pub struct SubgroupScan<'a> {
    client: &'a ServiceClient,
    data_type: DataType,
    subgroup: SubgroupIndex,
    point: ReadPoint,
    shards: std::ops::Range<ShardIndex>,
    current: Option<(ShardIndex, ShardScan<'a>)>,
    failed: bool,
}

impl<'a> SubgroupScan<'a> {
    pub fn new(client: &'a ServiceClient, data_type: DataType, subgroup: SubgroupIndex, point: ReadPoint) -> Self {
        let shards = 0..client.get_number_of_shards(data_type, subgroup);
        Self {
            client,
            data_type,
            subgroup,
            point,
            shards,
            current: None,
            failed: false,
        }
    }
}

impl Iterator for SubgroupScan<'_> {
    type Item = Result<(ShardIndex, Object)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some((shard, scan)) = self.current.as_mut() {
                match scan.next() {
                    Some(Ok(object)) => return Some(Ok((*shard, object))),
                    Some(Err(e)) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }

            let shard = self.shards.next()?;
            let key = RoutingKey::new(self.data_type, self.subgroup, shard);
            match ShardScan::new(self.client, key, self.point) {
                Ok(scan) => self.current = Some((shard, scan)),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
