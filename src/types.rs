//! Core Types
//!
//! Identities and addressing shared by the routing engine, the action
//! dispatcher and the substrate interfaces.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Stable identity of a group participant
pub type NodeId = u32;

/// Sentinel for "no node"
pub const INVALID_NODE_ID: NodeId = NodeId::MAX;

/// Index of a subgroup within its data type
pub type SubgroupIndex = u32;

/// Index of a shard within its subgroup
pub type ShardIndex = u32;

/// Shard-wide version number of a committed mutation
pub type Version = i64;

/// Sentinel for "no version" (e.g. the first write of a key)
pub const INVALID_VERSION: Version = -1;

/// Object key
pub type ObjectKey = String;

/// Identifier of a registered data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataType(pub u32);

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type {}", self.0)
    }
}

/// Addressing tuple for every routing, policy and cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingKey {
    pub data_type: DataType,
    pub subgroup: SubgroupIndex,
    pub shard: ShardIndex,
}

impl RoutingKey {
    pub fn new(data_type: DataType, subgroup: SubgroupIndex, shard: ShardIndex) -> Self {
        Self {
            data_type,
            subgroup,
            shard,
        }
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/subgroup {}/shard {}",
            self.data_type, self.subgroup, self.shard
        )
    }
}

/// A stored object as returned by reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub key: ObjectKey,
    pub value: Bytes,
    /// Version assigned when the object was committed
    pub version: Version,
    /// Commit time in microseconds since the Unix epoch
    pub timestamp_us: u64,
    /// Shard version preceding this one (any key)
    pub previous_version: Version,
    /// Previous version of this same key
    pub previous_version_by_key: Version,
}

impl Object {
    /// Create an object to be written; version fields are assigned on commit
    pub fn new(key: impl Into<ObjectKey>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            version: INVALID_VERSION,
            timestamp_us: 0,
            previous_version: INVALID_VERSION,
            previous_version_by_key: INVALID_VERSION,
        }
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> u64 {
        self.value.len() as u64
    }
}

/// Outcome of a committed put or remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub version: Version,
    pub timestamp_us: u64,
}

/// Deferred unit of work produced by a local commit
///
/// Owned by the action dispatcher from `post` until a worker hands it to
/// the handler; never persisted or retried.
#[derive(Debug, Clone)]
pub struct Action {
    pub id: uuid::Uuid,
    pub key: RoutingKey,
    pub object_key: ObjectKey,
    pub version: Version,
    pub timestamp_us: u64,
    /// Node on which the mutation committed
    pub origin: NodeId,
    /// New value, `None` for a remove
    pub value: Option<Bytes>,
}

impl Action {
    pub fn new(key: RoutingKey, object: &Object, origin: NodeId, removed: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            key,
            object_key: object.key.clone(),
            version: object.version,
            timestamp_us: object.timestamp_us,
            origin,
            value: if removed { None } else { Some(object.value.clone()) },
        }
    }

    pub fn is_remove(&self) -> bool {
        self.value.is_none()
    }
}

/// Current wall clock in microseconds since the Unix epoch
pub fn now_us() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_routing_key_equality_covers_all_fields() {
        let a = RoutingKey::new(DataType(1), 0, 0);
        let b = RoutingKey::new(DataType(1), 0, 1);
        let c = RoutingKey::new(DataType(2), 0, 0);
        let d = RoutingKey::new(DataType(1), 1, 0);

        let set: HashSet<_> = [a, b, c, d, a].into_iter().collect();
        assert_eq!(set.len(), 4);
        assert_eq!(a, RoutingKey::new(DataType(1), 0, 0));
    }

    #[test]
    fn test_action_from_object() {
        let mut obj = Object::new("k1", "hello");
        obj.version = 4;
        obj.timestamp_us = 99;
        let key = RoutingKey::new(DataType(0), 0, 0);

        let put = Action::new(key, &obj, 3, false);
        assert_eq!(put.version, 4);
        assert_eq!(put.origin, 3);
        assert_eq!(put.value.as_deref(), Some(&b"hello"[..]));
        assert!(!put.is_remove());

        let remove = Action::new(key, &obj, 3, true);
        assert!(remove.is_remove());
        assert_ne!(put.id, remove.id);
    }
}
