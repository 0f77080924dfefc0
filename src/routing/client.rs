//! Service Client
//!
//! Classifies the caller's topology for every operation and picks the
//! destination node:
//!
//! - shard member, mutation on its own shard: ordered call
//! - anything else: point-to-point call to a member chosen by the key's
//!   selection policy, over the group transport for members and the
//!   client transport for external callers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;

use super::cache::{MemberCache, MemberList};
use super::policy::{PolicyEntry, PolicyState, PolicyTable, SelectionPolicy};
use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::store::Committed;
use crate::substrate::{ClientTransport, GroupTransport, Operation, PendingResult, Reply, Route};
use crate::types::{
    DataType, NodeId, Object, ObjectKey, RoutingKey, ShardIndex, SubgroupIndex, Version,
    WriteReceipt,
};

/// How this process reaches the group
#[derive(Clone)]
pub enum Caller {
    /// Holds group membership
    Member(Arc<dyn GroupTransport>),
    /// External client without membership
    External(Arc<dyn ClientTransport>),
}

impl Caller {
    fn transport(&self) -> &dyn ClientTransport {
        match self {
            Caller::Member(group) => group.as_ref(),
            Caller::External(client) => client.as_ref(),
        }
    }
}

/// Routing engine entry point
pub struct ServiceClient {
    caller: Caller,
    registry: Arc<TypeRegistry>,
    policies: PolicyTable,
    members: MemberCache,
    closed: AtomicBool,
}

impl ServiceClient {
    pub fn new(caller: Caller, registry: Arc<TypeRegistry>, default_policy: SelectionPolicy) -> Self {
        Self {
            caller,
            registry,
            policies: PolicyTable::new(default_policy),
            members: MemberCache::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Client for a group member
    pub fn member(group: Arc<dyn GroupTransport>, registry: Arc<TypeRegistry>, default_policy: SelectionPolicy) -> Self {
        Self::new(Caller::Member(group), registry, default_policy)
    }

    /// Client for a caller outside the group
    pub fn external(client: Arc<dyn ClientTransport>, registry: Arc<TypeRegistry>, default_policy: SelectionPolicy) -> Self {
        Self::new(Caller::External(client), registry, default_policy)
    }

    pub fn is_group_member(&self) -> bool {
        matches!(self.caller, Caller::Member(_))
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn get_my_id(&self) -> NodeId {
        self.caller.transport().my_id()
    }

    pub fn get_members(&self) -> Vec<NodeId> {
        self.caller.transport().members()
    }

    pub fn get_shard_members(&self, key: RoutingKey) -> Vec<NodeId> {
        self.caller
            .transport()
            .shard_members(key.data_type, key.subgroup, key.shard)
    }

    pub fn get_number_of_subgroups(&self, data_type: DataType) -> u32 {
        self.caller.transport().number_of_subgroups(data_type)
    }

    pub fn get_number_of_shards(&self, data_type: DataType, subgroup: SubgroupIndex) -> u32 {
        self.caller.transport().number_of_shards(data_type, subgroup)
    }

    /// Refuse further routed calls and forget cached membership
    ///
    /// Called once the owning service is leaving the group.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.members.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ========== Member Selection ==========

    /// Bind a selection policy to `key`; `node` is used by `UserSpecified`
    pub fn set_policy(&self, key: RoutingKey, policy: SelectionPolicy, node: NodeId) {
        tracing::debug!(%key, %policy, node, "member selection policy set");
        self.policies.set(key, policy, node);
    }

    /// Bind a policy given by its wire value
    ///
    /// An unknown value is the fatal `UnknownPolicy` error and leaves the
    /// table untouched.
    pub fn set_policy_value(&self, key: RoutingKey, raw: u8, node: NodeId) -> Result<()> {
        let policy = SelectionPolicy::try_from(raw)?;
        self.set_policy(key, policy, node);
        Ok(())
    }

    /// Current policy and state for `key`, or the default
    pub fn get_policy(&self, key: RoutingKey) -> (SelectionPolicy, PolicyState) {
        let PolicyEntry { policy, state } = self.policies.get(&key);
        (policy, state)
    }

    /// Re-read shard membership from the substrate into the cache
    pub fn refresh_member_cache_entry(&self, key: RoutingKey) -> MemberList {
        let members = self.get_shard_members(key);
        tracing::debug!(%key, members = ?members, "member cache refreshed");
        self.members.replace(key, members)
    }

    /// Pick the destination node for `key`
    ///
    /// With `retry` the member list is refreshed first and `FixedRandom`
    /// re-picks.
    pub fn pick_member(&self, key: RoutingKey, retry: bool) -> Result<NodeId> {
        let PolicyEntry { policy, state } = self.policies.get(&key);

        if policy == SelectionPolicy::UserSpecified {
            return Ok(state.node());
        }

        let members = match self.members.get(&key) {
            Some(members) if !retry => members,
            _ => self.refresh_member_cache_entry(key),
        };
        if members.is_empty() {
            // not cached, so the next call asks the substrate again
            self.members.invalidate(&key);
            return Err(Error::NoMembers(key));
        }

        let node = match policy {
            SelectionPolicy::FirstMember => members[0],
            SelectionPolicy::LastMember => members[members.len() - 1],
            SelectionPolicy::Random => random_member(&members),
            SelectionPolicy::FixedRandom => match state {
                PolicyState::Node(node) if !retry => node,
                _ => {
                    let node = random_member(&members);
                    self.policies.remember_pick(key, node);
                    node
                }
            },
            SelectionPolicy::RoundRobin => members[self.policies.advance_cursor(key, members.len())],
            SelectionPolicy::UserSpecified => state.node(),
        };
        Ok(node)
    }

    // ========== Routing ==========

    /// Route `op` to the shard at `key`
    pub fn route(&self, key: RoutingKey, op: Operation) -> Result<PendingResult<Reply>> {
        if self.is_closed() {
            return Err(Error::ShuttingDown);
        }
        self.registry.descriptor(key.data_type)?;

        match &self.caller {
            Caller::Member(group) => {
                if op.is_mutating() && group.my_shard(key.data_type, key.subgroup) == Some(key.shard) {
                    tracing::trace!(%key, op = %op.kind(), "ordered call");
                    return Ok(group.ordered_call(key, op).routed(Route::Ordered));
                }
                // reads go point to point even on the caller's own shard
                let node = self.pick_member(key, false)?;
                tracing::trace!(%key, op = %op.kind(), node, "p2p call as group member");
                Ok(group.p2p_call(node, key, op).routed(Route::PointToPoint(node)))
            }
            Caller::External(client) => {
                let node = self.pick_member(key, false)?;
                tracing::trace!(%key, op = %op.kind(), node, "p2p call as external client");
                Ok(client.p2p_call(node, key, op).routed(Route::PointToPoint(node)))
            }
        }
    }

    pub fn put(&self, key: RoutingKey, object: Object) -> Result<PendingResult<WriteReceipt>> {
        Ok(self.route(key, Operation::Put(object))?.typed())
    }

    pub fn remove(&self, key: RoutingKey, object_key: impl Into<ObjectKey>) -> Result<PendingResult<WriteReceipt>> {
        Ok(self.route(key, Operation::Remove(object_key.into()))?.typed())
    }

    /// Read `object_key` at `version`, or the latest when `None`
    pub fn get(
        &self,
        key: RoutingKey,
        object_key: impl Into<ObjectKey>,
        version: Option<Version>,
    ) -> Result<PendingResult<Option<Object>>> {
        let op = Operation::Get {
            key: object_key.into(),
            version,
        };
        Ok(self.route(key, op)?.typed())
    }

    /// Record of `object_key` at `version`; a removed key yields its tombstone
    pub fn get_record(
        &self,
        key: RoutingKey,
        object_key: impl Into<ObjectKey>,
        version: Option<Version>,
    ) -> Result<PendingResult<Option<Committed>>> {
        let op = Operation::GetRecord {
            key: object_key.into(),
            version,
        };
        Ok(self.route(key, op)?.typed())
    }

    pub fn get_by_time(
        &self,
        key: RoutingKey,
        object_key: impl Into<ObjectKey>,
        timestamp_us: u64,
    ) -> Result<PendingResult<Option<Object>>> {
        let op = Operation::GetByTime {
            key: object_key.into(),
            timestamp_us,
        };
        Ok(self.route(key, op)?.typed())
    }

    pub fn get_size(
        &self,
        key: RoutingKey,
        object_key: impl Into<ObjectKey>,
        version: Option<Version>,
    ) -> Result<PendingResult<u64>> {
        let op = Operation::GetSize {
            key: object_key.into(),
            version,
        };
        Ok(self.route(key, op)?.typed())
    }

    pub fn get_size_by_time(
        &self,
        key: RoutingKey,
        object_key: impl Into<ObjectKey>,
        timestamp_us: u64,
    ) -> Result<PendingResult<u64>> {
        let op = Operation::GetSizeByTime {
            key: object_key.into(),
            timestamp_us,
        };
        Ok(self.route(key, op)?.typed())
    }

    pub fn list_keys(&self, key: RoutingKey, version: Option<Version>) -> Result<PendingResult<Vec<ObjectKey>>> {
        Ok(self.route(key, Operation::ListKeys { version })?.typed())
    }

    pub fn list_keys_by_time(&self, key: RoutingKey, timestamp_us: u64) -> Result<PendingResult<Vec<ObjectKey>>> {
        Ok(self.route(key, Operation::ListKeysByTime { timestamp_us })?.typed())
    }

    /// Shard this process belongs to within a subgroup, if it is a member
    pub fn my_shard(&self, data_type: DataType, subgroup: SubgroupIndex) -> Option<ShardIndex> {
        match &self.caller {
            Caller::Member(group) => group.my_shard(data_type, subgroup),
            Caller::External(_) => None,
        }
    }
}

fn random_member(members: &[NodeId]) -> NodeId {
    members[rand::thread_rng().gen_range(0..members.len())]
}
