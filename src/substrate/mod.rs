//! Replication Substrate Interfaces
//!
//! Narrow view of the group-membership, ordered-multicast and
//! point-to-point transport layer. The routing engine only ever talks to
//! these traits; `local` provides an in-process implementation.

mod pending;
pub mod local;

pub use pending::{FromReply, PendingResult, ReplySender, Route};
pub use local::{LocalClient, LocalCluster, LocalMember};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::Committed;
use crate::types::{
    Action, DataType, NodeId, Object, ObjectKey, RoutingKey, ShardIndex, SubgroupIndex, Version,
    WriteReceipt,
};

/// Kind of a routed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Put,
    Remove,
    Get,
    GetRecord,
    GetByTime,
    GetSize,
    GetSizeByTime,
    ListKeys,
    ListKeysByTime,
}

impl OperationKind {
    /// Only mutations travel the ordered path
    pub fn is_mutating(&self) -> bool {
        matches!(self, OperationKind::Put | OperationKind::Remove)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Put => "put",
            OperationKind::Remove => "remove",
            OperationKind::Get => "get",
            OperationKind::GetRecord => "get_record",
            OperationKind::GetByTime => "get_by_time",
            OperationKind::GetSize => "get_size",
            OperationKind::GetSizeByTime => "get_size_by_time",
            OperationKind::ListKeys => "list_keys",
            OperationKind::ListKeysByTime => "list_keys_by_time",
        };
        f.write_str(name)
    }
}

/// A call against one shard's store
///
/// A `version` of `None` reads the latest state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Put(Object),
    Remove(ObjectKey),
    Get {
        key: ObjectKey,
        version: Option<Version>,
    },
    /// Like `Get`, but a remove answers with its tombstone
    GetRecord {
        key: ObjectKey,
        version: Option<Version>,
    },
    GetByTime {
        key: ObjectKey,
        timestamp_us: u64,
    },
    GetSize {
        key: ObjectKey,
        version: Option<Version>,
    },
    GetSizeByTime {
        key: ObjectKey,
        timestamp_us: u64,
    },
    ListKeys {
        version: Option<Version>,
    },
    ListKeysByTime {
        timestamp_us: u64,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Put(_) => OperationKind::Put,
            Operation::Remove(_) => OperationKind::Remove,
            Operation::Get { .. } => OperationKind::Get,
            Operation::GetRecord { .. } => OperationKind::GetRecord,
            Operation::GetByTime { .. } => OperationKind::GetByTime,
            Operation::GetSize { .. } => OperationKind::GetSize,
            Operation::GetSizeByTime { .. } => OperationKind::GetSizeByTime,
            Operation::ListKeys { .. } => OperationKind::ListKeys,
            Operation::ListKeysByTime { .. } => OperationKind::ListKeysByTime,
        }
    }

    pub fn is_mutating(&self) -> bool {
        self.kind().is_mutating()
    }
}

/// Reply to an `Operation`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Written(WriteReceipt),
    Object(Option<Object>),
    Record(Option<Committed>),
    Size(u64),
    Keys(Vec<ObjectKey>),
}

impl Reply {
    pub fn name(&self) -> &'static str {
        match self {
            Reply::Written(_) => "Written",
            Reply::Object(_) => "Object",
            Reply::Record(_) => "Record",
            Reply::Size(_) => "Size",
            Reply::Keys(_) => "Keys",
        }
    }
}

/// Invoked once per local commit, on a substrate-owned thread
///
/// Must not block; the only expected work is a non-blocking enqueue.
pub type CommitCallback = Arc<dyn Fn(Action) + Send + Sync>;

/// Transport available to every caller, including external clients
pub trait ClientTransport: Send + Sync {
    /// This participant's node id
    fn my_id(&self) -> NodeId;

    /// All current group members
    fn members(&self) -> Vec<NodeId>;

    /// Members of one shard; empty when the shard does not exist
    fn shard_members(
        &self,
        data_type: DataType,
        subgroup: SubgroupIndex,
        shard: ShardIndex,
    ) -> Vec<NodeId>;

    /// Number of subgroups of a data type
    fn number_of_subgroups(&self, data_type: DataType) -> u32;

    /// Number of shards in a subgroup
    fn number_of_shards(&self, data_type: DataType, subgroup: SubgroupIndex) -> u32;

    /// Direct call to one node hosting `key`
    fn p2p_call(&self, node: NodeId, key: RoutingKey, op: Operation) -> PendingResult<Reply>;
}

/// Transport held by group members
pub trait GroupTransport: ClientTransport {
    /// Shard this node belongs to within a subgroup, if any
    fn my_shard(&self, data_type: DataType, subgroup: SubgroupIndex) -> Option<ShardIndex>;

    /// Totally ordered, durable call across the replicas of the caller's own shard
    fn ordered_call(&self, key: RoutingKey, op: Operation) -> PendingResult<Reply>;

    /// Register a handler for mutations committed on this node
    fn subscribe_local_commit(&self, callback: CommitCallback);

    /// Wait until every member reached the barrier
    fn barrier_sync(&self) -> Result<()>;

    /// Leave the group
    fn leave(&self) -> Result<()>;
}
