//! In-Process Substrate
//!
//! A whole group inside one process. Nodes join a shared `LocalCluster`,
//! get shards assigned in join order and host one store per shard replica.
//! Ordered calls commit on every replica of a shard under one lock, so all
//! replicas see the same total order. Calls complete before they return.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use super::{ClientTransport, CommitCallback, GroupTransport, Operation, PendingResult, Reply};
use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::layout::SubgroupInfo;
use crate::registry::{FactoryContext, TypeRegistry};
use crate::store::ShardStore;
use crate::types::{
    now_us, Action, DataType, NodeId, RoutingKey, ShardIndex, SubgroupIndex, INVALID_NODE_ID,
};

/// Default time a node waits at the barrier for the rest of the group
pub const DEFAULT_BARRIER_TIMEOUT: Duration = Duration::from_secs(5);

type Replicas = BTreeMap<NodeId, Box<dyn ShardStore>>;

/// Membership view shared by every handle
#[derive(Default)]
struct View {
    /// Current members in join order
    members: Vec<NodeId>,
    shards: HashMap<RoutingKey, Vec<NodeId>>,
    assignment: HashMap<(NodeId, DataType, SubgroupIndex), ShardIndex>,
    subscribers: HashMap<NodeId, Vec<CommitCallback>>,
    unreachable: HashSet<NodeId>,
}

impl View {
    fn is_member(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }
}

#[derive(Default)]
struct Barrier {
    generation: u64,
    arrived: HashSet<NodeId>,
}

struct ClusterState {
    info: SubgroupInfo,
    registry: Arc<TypeRegistry>,
    view: RwLock<View>,
    /// One lock per shard; holds the replica of every shard member
    replicas: HashMap<RoutingKey, Mutex<Replicas>>,
    barrier: Mutex<Barrier>,
    barrier_done: Condvar,
    barrier_timeout: Duration,
}

impl ClusterState {
    fn members(&self) -> Vec<NodeId> {
        self.view.read().members.clone()
    }

    fn shard_members(&self, key: RoutingKey) -> Vec<NodeId> {
        self.view.read().shards.get(&key).cloned().unwrap_or_default()
    }

    fn my_shard(&self, node: NodeId, data_type: DataType, subgroup: SubgroupIndex) -> Option<ShardIndex> {
        self.view.read().assignment.get(&(node, data_type, subgroup)).copied()
    }

    /// Pick the shard `node` joins in one subgroup
    ///
    /// Shards are filled to their minimum first, then up to capacity.
    fn assign(&self, view: &View, data_type: DataType, subgroup: SubgroupIndex) -> Option<ShardIndex> {
        let policy = self.info.subgroups(data_type).get(subgroup as usize)?;
        let count = |shard: ShardIndex| {
            view.shards
                .get(&RoutingKey::new(data_type, subgroup, shard))
                .map(|m| m.len() as u32)
                .unwrap_or(0)
        };
        let shards = 0..policy.num_shards();
        shards
            .clone()
            .find(|&shard| count(shard) < policy.min_nodes_by_shard[shard as usize])
            .or_else(|| shards.clone().find(|&shard| count(shard) < policy.capacity(shard)))
    }

    fn join(&self, node: NodeId, service: Option<Arc<ServiceContext>>) -> Result<Vec<RoutingKey>> {
        if node == INVALID_NODE_ID {
            return Err(Error::Config("node id is reserved for external clients".into()));
        }

        let keys = {
            let mut view = self.view.write();
            if view.is_member(node) {
                return Err(Error::Internal(format!("node {} already joined", node)));
            }

            let mut keys = Vec::new();
            for descriptor in self.registry.iter() {
                let data_type = descriptor.data_type;
                for subgroup in 0..self.info.subgroups(data_type).len() as SubgroupIndex {
                    if let Some(shard) = self.assign(&view, data_type, subgroup) {
                        let key = RoutingKey::new(data_type, subgroup, shard);
                        view.shards.entry(key).or_default().push(node);
                        view.assignment.insert((node, data_type, subgroup), shard);
                        keys.push(key);
                    }
                }
            }
            view.members.push(node);
            view.unreachable.remove(&node);
            keys
        };

        let ctx = FactoryContext { node, service };
        for key in &keys {
            let store = self.registry.create_store(*key, &ctx)?;
            if let Some(replicas) = self.replicas.get(key) {
                replicas.lock().insert(node, store);
            }
        }

        tracing::info!(node, shards = keys.len(), "node joined local cluster");
        Ok(keys)
    }

    /// Drop `node` from every view; its replicas and subscribers go with it
    fn remove(&self, node: NodeId) -> bool {
        let keys: Vec<RoutingKey> = {
            let mut view = self.view.write();
            if !view.is_member(node) {
                return false;
            }
            view.members.retain(|n| *n != node);
            view.subscribers.remove(&node);
            view.unreachable.remove(&node);
            view.assignment.retain(|(n, _, _), _| *n != node);
            let mut keys = Vec::new();
            for (key, members) in view.shards.iter_mut() {
                if let Some(pos) = members.iter().position(|n| *n == node) {
                    members.remove(pos);
                    keys.push(*key);
                }
            }
            keys
        };

        for key in &keys {
            if let Some(replicas) = self.replicas.get(key) {
                replicas.lock().remove(&node);
            }
        }

        // a departure may complete a barrier the node never reached
        {
            let mut barrier = self.barrier.lock();
            barrier.arrived.remove(&node);
            self.try_release(&mut barrier);
        }

        tracing::info!(node, "node left local cluster");
        true
    }

    /// Commit `op` on every replica of `key`
    ///
    /// The receipt handed back is the one of `serving`'s replica. A replica
    /// whose store fails to apply the commit is fenced off the shard: it
    /// stops serving, so replicas never diverge silently.
    fn commit(&self, serving: NodeId, key: RoutingKey, op: &Operation) -> Result<Reply> {
        if !op.is_mutating() {
            return Err(Error::Internal(format!("{} is not a mutation", op.kind())));
        }
        let replicas = self.replicas.get(&key).ok_or(Error::NodeNotInShard { node: serving, key })?;
        let mut replicas = replicas.lock();
        if !replicas.contains_key(&serving) {
            return Err(Error::NodeNotInShard { node: serving, key });
        }

        let timestamp_us = now_us();
        let mut reply = None;
        let mut committed = Vec::with_capacity(replicas.len());
        let mut fenced = Vec::new();
        for (node, store) in replicas.iter_mut() {
            match store.commit(op, timestamp_us) {
                Ok(result) => {
                    if *node == serving {
                        reply = Some(Ok(Reply::Written(result.receipt())));
                    }
                    committed.push((*node, result));
                }
                Err(e) => {
                    tracing::error!(%key, node = *node, error = %e, "replica failed to apply commit, fencing it");
                    fenced.push(*node);
                    if *node == serving {
                        reply = Some(Err(e));
                    }
                }
            }
        }
        for node in &fenced {
            replicas.remove(node);
        }

        let subscribers: Vec<(NodeId, Vec<CommitCallback>)> = {
            let view = self.view.read();
            committed
                .iter()
                .filter_map(|(node, _)| view.subscribers.get(node).map(|s| (*node, s.clone())))
                .collect()
        };
        // still under the shard lock, so each node sees commits in order
        for (node, callbacks) in subscribers {
            let Some((_, result)) = committed.iter().find(|(n, _)| *n == node) else {
                continue;
            };
            for callback in callbacks {
                callback(Action::new(key, &result.object, node, result.removed));
            }
        }

        tracing::trace!(%key, op = %op.kind(), replicas = committed.len(), "ordered commit");
        reply.unwrap_or(Err(Error::NodeNotInShard { node: serving, key }))
    }

    fn query(&self, node: NodeId, key: RoutingKey, op: &Operation) -> Result<Reply> {
        let replicas = self.replicas.get(&key).ok_or(Error::NodeNotInShard { node, key })?;
        let replicas = replicas.lock();
        let store = replicas.get(&node).ok_or(Error::NodeNotInShard { node, key })?;
        store.query(op)
    }

    fn p2p(&self, node: NodeId, key: RoutingKey, op: Operation) -> Result<Reply> {
        {
            let view = self.view.read();
            if view.unreachable.contains(&node) {
                return Err(Error::NodeUnreachable(node));
            }
            let in_shard = view.shards.get(&key).map(|m| m.contains(&node)).unwrap_or(false);
            if !in_shard {
                return Err(Error::NodeNotInShard { node, key });
            }
        }

        if op.is_mutating() {
            self.commit(node, key, &op)
        } else {
            self.query(node, key, &op)
        }
    }

    /// Advance the barrier once every current member arrived
    fn try_release(&self, barrier: &mut Barrier) {
        if barrier.arrived.is_empty() {
            return;
        }
        let members = self.members();
        if members.iter().all(|n| barrier.arrived.contains(n)) {
            barrier.generation += 1;
            barrier.arrived.clear();
            self.barrier_done.notify_all();
        }
    }

    fn barrier_sync(&self, node: NodeId) -> Result<()> {
        let mut barrier = self.barrier.lock();
        let generation = barrier.generation;
        barrier.arrived.insert(node);
        self.try_release(&mut barrier);

        while barrier.generation == generation {
            if self
                .barrier_done
                .wait_for(&mut barrier, self.barrier_timeout)
                .timed_out()
                && barrier.generation == generation
            {
                barrier.arrived.remove(&node);
                return Err(Error::CallTimeout(self.barrier_timeout));
            }
        }
        Ok(())
    }
}

/// In-process group
#[derive(Clone)]
pub struct LocalCluster {
    state: Arc<ClusterState>,
}

impl LocalCluster {
    pub fn new(info: SubgroupInfo, registry: Arc<TypeRegistry>) -> Self {
        Self::with_barrier_timeout(info, registry, DEFAULT_BARRIER_TIMEOUT)
    }

    pub fn with_barrier_timeout(info: SubgroupInfo, registry: Arc<TypeRegistry>, barrier_timeout: Duration) -> Self {
        let replicas = info
            .shard_keys()
            .into_iter()
            .map(|key| (key, Mutex::new(Replicas::new())))
            .collect();
        Self {
            state: Arc::new(ClusterState {
                info,
                registry,
                view: RwLock::new(View::default()),
                replicas,
                barrier: Mutex::new(Barrier::default()),
                barrier_done: Condvar::new(),
                barrier_timeout,
            }),
        }
    }

    /// Add node `id` to the group
    ///
    /// Replicas are created empty; there is no state transfer.
    pub fn join(&self, id: NodeId, service: Option<Arc<ServiceContext>>) -> Result<Arc<LocalMember>> {
        self.state.join(id, service)?;
        Ok(Arc::new(LocalMember {
            id,
            cluster: Arc::clone(&self.state),
        }))
    }

    /// Handle for a caller that holds no membership
    pub fn external_client(&self) -> Arc<LocalClient> {
        Arc::new(LocalClient {
            cluster: Arc::clone(&self.state),
        })
    }

    /// Make point-to-point calls to `node` fail
    pub fn set_unreachable(&self, node: NodeId, unreachable: bool) {
        let mut view = self.state.view.write();
        if unreachable {
            view.unreachable.insert(node);
        } else {
            view.unreachable.remove(&node);
        }
        tracing::debug!(node, unreachable, "reachability changed");
    }

    /// Evict `node` as if it had failed
    pub fn remove_node(&self, node: NodeId) -> bool {
        self.state.remove(node)
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.state.members()
    }

    pub fn shard_members(&self, key: RoutingKey) -> Vec<NodeId> {
        self.state.shard_members(key)
    }

    pub fn info(&self) -> &SubgroupInfo {
        &self.state.info
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.state.registry
    }
}

/// Group member handle
pub struct LocalMember {
    id: NodeId,
    cluster: Arc<ClusterState>,
}

impl LocalMember {
    fn ensure_member(&self) -> Result<()> {
        if self.cluster.view.read().is_member(self.id) {
            Ok(())
        } else {
            Err(Error::NotInGroup(self.id))
        }
    }
}

impl ClientTransport for LocalMember {
    fn my_id(&self) -> NodeId {
        self.id
    }

    fn members(&self) -> Vec<NodeId> {
        self.cluster.members()
    }

    fn shard_members(&self, data_type: DataType, subgroup: SubgroupIndex, shard: ShardIndex) -> Vec<NodeId> {
        self.cluster.shard_members(RoutingKey::new(data_type, subgroup, shard))
    }

    fn number_of_subgroups(&self, data_type: DataType) -> u32 {
        self.cluster.info.number_of_subgroups(data_type)
    }

    fn number_of_shards(&self, data_type: DataType, subgroup: SubgroupIndex) -> u32 {
        self.cluster.info.number_of_shards(data_type, subgroup)
    }

    fn p2p_call(&self, node: NodeId, key: RoutingKey, op: Operation) -> PendingResult<Reply> {
        let result = self.ensure_member().and_then(|_| self.cluster.p2p(node, key, op));
        PendingResult::ready(result)
    }
}

impl GroupTransport for LocalMember {
    fn my_shard(&self, data_type: DataType, subgroup: SubgroupIndex) -> Option<ShardIndex> {
        self.cluster.my_shard(self.id, data_type, subgroup)
    }

    fn ordered_call(&self, key: RoutingKey, op: Operation) -> PendingResult<Reply> {
        let result = self.ensure_member().and_then(|_| {
            if self.my_shard(key.data_type, key.subgroup) != Some(key.shard) {
                return Err(Error::NotAShardMember { node: self.id, key });
            }
            self.cluster.commit(self.id, key, &op)
        });
        PendingResult::ready(result)
    }

    fn subscribe_local_commit(&self, callback: CommitCallback) {
        let mut view = self.cluster.view.write();
        if !view.is_member(self.id) {
            tracing::warn!(node = self.id, "commit subscription ignored: node is not in the group");
            return;
        }
        view.subscribers.entry(self.id).or_default().push(callback);
    }

    fn barrier_sync(&self) -> Result<()> {
        self.ensure_member()?;
        self.cluster.barrier_sync(self.id)
    }

    fn leave(&self) -> Result<()> {
        if self.cluster.remove(self.id) {
            Ok(())
        } else {
            Err(Error::NotInGroup(self.id))
        }
    }
}

/// External client handle; its id is `INVALID_NODE_ID`
pub struct LocalClient {
    cluster: Arc<ClusterState>,
}

impl ClientTransport for LocalClient {
    fn my_id(&self) -> NodeId {
        INVALID_NODE_ID
    }

    fn members(&self) -> Vec<NodeId> {
        self.cluster.members()
    }

    fn shard_members(&self, data_type: DataType, subgroup: SubgroupIndex, shard: ShardIndex) -> Vec<NodeId> {
        self.cluster.shard_members(RoutingKey::new(data_type, subgroup, shard))
    }

    fn number_of_subgroups(&self, data_type: DataType) -> u32 {
        self.cluster.info.number_of_subgroups(data_type)
    }

    fn number_of_shards(&self, data_type: DataType, subgroup: SubgroupIndex) -> u32 {
        self.cluster.info.number_of_shards(data_type, subgroup)
    }

    fn p2p_call(&self, node: NodeId, key: RoutingKey, op: Operation) -> PendingResult<Reply> {
        PendingResult::ready(self.cluster.p2p(node, key, op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{plan, AllocationMode, DataTypeLayout, Layout, SubgroupLayout};
    use crate::types::{Object, WriteReceipt};

    fn cluster(min: u32, max: u32, shards: usize, mode: AllocationMode) -> LocalCluster {
        let registry = Arc::new(TypeRegistry::builder().register("objects").build().unwrap());
        let layout = Layout(vec![DataTypeLayout {
            subgroups: vec![SubgroupLayout::uniform(shards, min, max, mode)],
            ..Default::default()
        }]);
        let info = plan(&layout, &registry).unwrap();
        LocalCluster::with_barrier_timeout(info, registry, Duration::from_millis(200))
    }

    fn shard(i: ShardIndex) -> RoutingKey {
        RoutingKey::new(DataType(0), 0, i)
    }

    fn put(member: &LocalMember, key: RoutingKey, k: &str) -> WriteReceipt {
        match member.ordered_call(key, Operation::Put(Object::new(k, "v"))).wait().unwrap() {
            Reply::Written(receipt) => receipt,
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_fixed_assignment_fills_minimums_first() {
        let cluster = cluster(2, 3, 2, AllocationMode::Fixed);
        let members: Vec<_> = (0..5).map(|id| cluster.join(id, None).unwrap()).collect();

        assert_eq!(cluster.shard_members(shard(0)), vec![0, 1]);
        assert_eq!(cluster.shard_members(shard(1)), vec![2, 3]);
        // fixed shards stop at their minimum
        assert_eq!(members[4].my_shard(DataType(0), 0), None);
        assert_eq!(cluster.members(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_flexible_assignment_grows_to_max() {
        let cluster = cluster(1, 2, 2, AllocationMode::Flexible);
        for id in 0..5 {
            cluster.join(id, None).unwrap();
        }
        assert_eq!(cluster.shard_members(shard(0)), vec![0, 2]);
        assert_eq!(cluster.shard_members(shard(1)), vec![1, 3]);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let cluster = cluster(1, 1, 1, AllocationMode::Fixed);
        cluster.join(1, None).unwrap();
        assert!(cluster.join(1, None).is_err());
        assert!(cluster.join(INVALID_NODE_ID, None).is_err());
    }

    #[test]
    fn test_ordered_call_replicates_in_one_order() {
        let cluster = cluster(3, 3, 1, AllocationMode::Fixed);
        let members: Vec<_> = (0..3).map(|id| cluster.join(id, None).unwrap()).collect();

        for i in 0..10 {
            let receipt = put(&members[i % 3], shard(0), &format!("k{}", i));
            assert_eq!(receipt.version, i as i64);
        }

        for member in &members {
            let keys = member
                .p2p_call(member.my_id(), shard(0), Operation::ListKeys { version: None })
                .wait()
                .unwrap();
            match keys {
                Reply::Keys(keys) => assert_eq!(keys.len(), 10),
                other => panic!("unexpected reply {:?}", other),
            }
        }
    }

    #[test]
    fn test_ordered_call_requires_membership() {
        let cluster = cluster(1, 1, 2, AllocationMode::Fixed);
        let a = cluster.join(0, None).unwrap();
        cluster.join(1, None).unwrap();

        let err = a
            .ordered_call(shard(1), Operation::Remove("x".into()))
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::NotAShardMember { node: 0, .. }));
    }

    #[test]
    fn test_p2p_failures() {
        let cluster = cluster(1, 1, 2, AllocationMode::Fixed);
        let a = cluster.join(0, None).unwrap();
        cluster.join(1, None).unwrap();

        let read = || Operation::Get { key: "k".into(), version: None };
        assert!(matches!(
            a.p2p_call(0, shard(1), read()).wait(),
            Err(Error::NodeNotInShard { node: 0, .. })
        ));

        cluster.set_unreachable(1, true);
        assert!(matches!(a.p2p_call(1, shard(1), read()).wait(), Err(Error::NodeUnreachable(1))));
        cluster.set_unreachable(1, false);
        assert!(a.p2p_call(1, shard(1), read()).wait().is_ok());
    }

    #[test]
    fn test_leave_updates_views() {
        let cluster = cluster(2, 2, 1, AllocationMode::Fixed);
        let a = cluster.join(0, None).unwrap();
        let b = cluster.join(1, None).unwrap();
        put(&a, shard(0), "k");

        b.leave().unwrap();
        assert_eq!(cluster.shard_members(shard(0)), vec![0]);
        assert_eq!(b.my_shard(DataType(0), 0), None);
        assert!(matches!(b.leave(), Err(Error::NotInGroup(1))));
        assert!(matches!(
            b.ordered_call(shard(0), Operation::Remove("k".into())).wait(),
            Err(Error::NotInGroup(1))
        ));

        // the survivor keeps its history
        assert_eq!(put(&a, shard(0), "j").version, 1);
    }

    #[test]
    fn test_barrier_waits_for_every_member() {
        let cluster = cluster(2, 2, 1, AllocationMode::Fixed);
        let a = cluster.join(0, None).unwrap();
        let b = cluster.join(1, None).unwrap();

        let waiter = std::thread::spawn(move || a.barrier_sync());
        std::thread::sleep(Duration::from_millis(20));
        b.barrier_sync().unwrap();
        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn test_barrier_times_out_and_leave_releases() {
        let cluster = cluster(2, 2, 1, AllocationMode::Fixed);
        let a = cluster.join(0, None).unwrap();
        let b = cluster.join(1, None).unwrap();

        assert!(matches!(a.barrier_sync(), Err(Error::CallTimeout(_))));

        let waiter = std::thread::spawn({
            let a = Arc::clone(&a);
            move || a.barrier_sync()
        });
        std::thread::sleep(Duration::from_millis(20));
        b.leave().unwrap();
        waiter.join().unwrap().unwrap();
    }

    struct FailingStore;

    impl ShardStore for FailingStore {
        fn commit(&mut self, _op: &Operation, _timestamp_us: u64) -> Result<crate::store::Committed> {
            Err(Error::Internal("disk full".into()))
        }

        fn query(&self, op: &Operation) -> Result<Reply> {
            crate::store::VersionedStore::new().query(op)
        }

        fn latest_version(&self) -> crate::types::Version {
            crate::types::INVALID_VERSION
        }
    }

    #[test]
    fn test_failed_replica_is_fenced() {
        let registry = Arc::new(
            TypeRegistry::builder()
                .register_with("objects", |_, ctx: &FactoryContext| -> Box<dyn ShardStore> {
                    if ctx.node == 1 {
                        Box::new(FailingStore)
                    } else {
                        Box::new(crate::store::VersionedStore::new())
                    }
                })
                .build()
                .unwrap(),
        );
        let layout = Layout(vec![DataTypeLayout {
            subgroups: vec![SubgroupLayout::uniform(1, 3, 3, AllocationMode::Fixed)],
            ..Default::default()
        }]);
        let cluster = LocalCluster::new(plan(&layout, &registry).unwrap(), Arc::clone(&registry));
        let members: Vec<_> = (0..3).map(|id| cluster.join(id, None).unwrap()).collect();

        let receipt = put(&members[0], shard(0), "a");
        assert_eq!(receipt.version, 0);

        // the healthy replicas agree, the failed one no longer serves
        let read = || Operation::Get { key: "a".into(), version: None };
        for node in [0, 2] {
            match members[0].p2p_call(node, shard(0), read()).wait().unwrap() {
                Reply::Object(Some(object)) => assert_eq!(object.version, 0),
                other => panic!("unexpected reply {:?}", other),
            }
        }
        assert!(matches!(
            members[0].p2p_call(1, shard(0), read()).wait(),
            Err(Error::NodeNotInShard { node: 1, .. })
        ));

        // a commit through a fenced replica fails
        assert!(members[1]
            .ordered_call(shard(0), Operation::Put(Object::new("b", "v")))
            .wait()
            .is_err());
    }

    #[test]
    fn test_reads_are_not_committed() {
        let cluster = cluster(1, 1, 1, AllocationMode::Fixed);
        let a = cluster.join(0, None).unwrap();
        assert!(a
            .ordered_call(shard(0), Operation::ListKeys { version: None })
            .wait()
            .is_err());
        assert_eq!(put(&a, shard(0), "a").version, 0);
    }

    #[test]
    fn test_external_client_reads_and_writes() {
        let cluster = cluster(1, 1, 1, AllocationMode::Fixed);
        cluster.join(3, None).unwrap();
        let client = cluster.external_client();
        assert_eq!(client.my_id(), INVALID_NODE_ID);
        assert_eq!(client.number_of_shards(DataType(0), 0), 1);
        assert_eq!(client.number_of_subgroups(DataType(0)), 1);
        assert_eq!(client.number_of_subgroups(DataType(5)), 0);

        client
            .p2p_call(3, shard(0), Operation::Put(Object::new("a", "xyz")))
            .wait()
            .unwrap();
        let size = client
            .p2p_call(3, shard(0), Operation::GetSize { key: "a".into(), version: None })
            .wait()
            .unwrap();
        assert_eq!(size, Reply::Size(3));
    }
}
