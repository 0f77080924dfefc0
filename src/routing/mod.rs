//! Routing Engine
//!
//! Resolves a (data type, subgroup, shard) coordinate to a destination node
//! under a per-key selection policy, with a member cache refreshed on
//! retry.

mod cache;
mod client;
mod policy;

pub use cache::{MemberCache, MemberList};
pub use client::{Caller, ServiceClient};
pub use policy::{
    PolicyEntry, PolicyState, PolicyTable, SelectionPolicy, DEFAULT_SELECTION_POLICY,
};
