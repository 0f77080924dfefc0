//! Shardline - Routing and Dispatch Core for Sharded, Replicated Services
//!
//! Decides, for every client operation on a sharded and replicated
//! dataset, which node executes it and how, and runs application logic
//! for locally committed mutations off the replication path.
//!
//! # Architecture
//!
//! Each data type is split into subgroups, each subgroup into shards, and
//! each shard is replicated on a set of nodes. A `ServiceClient` routes
//! mutations on the caller's own shard through the substrate's ordered
//! path, and everything else point to point to a member picked by the
//! key's selection policy. Commits feed an `ActionDispatcher` worker pool.
//! A `Service` owns both and shuts them down in order.
//!
//! # Features
//!
//! - Six member selection policies with per-key state
//! - Member cache refreshed on first use and on retry
//! - Drain-on-shutdown worker pool for deferred actions
//! - Allocation planner for shard layouts
//! - Versioned in-memory shard store with reads by version and time
//! - In-process substrate for tests and simulation

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod layout;
pub mod query;
pub mod registry;
pub mod routing;
pub mod service;
pub mod store;
pub mod substrate;
pub mod tuning;
pub mod types;

pub use config::ShardlineConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ShardlineConfig;
    pub use crate::context::ServiceContext;
    pub use crate::dispatcher::{ActionDispatcher, OffCriticalHandler};
    pub use crate::error::{Error, Result};
    pub use crate::layout::{plan, Layout, SubgroupInfo};
    pub use crate::query::{ReadPoint, ShardScan, SubgroupScan, VersionHistory};
    pub use crate::registry::TypeRegistry;
    pub use crate::routing::{SelectionPolicy, ServiceClient};
    pub use crate::service::{Service, ServiceState};
    pub use crate::substrate::{ClientTransport, GroupTransport, LocalCluster, PendingResult};
    pub use crate::types::{Action, DataType, NodeId, Object, RoutingKey, INVALID_NODE_ID};
}
