//! Member Selection Policies
//!
//! Per-key selection policy and its mutable state.

use std::collections::HashMap;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{NodeId, RoutingKey, INVALID_NODE_ID};

/// Algorithm used to choose a destination node within a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u8)]
pub enum SelectionPolicy {
    /// Always the first member of the shard
    FirstMember = 0,
    /// Always the last member of the shard
    LastMember = 1,
    /// A uniformly random member on every call
    Random = 2,
    /// A random member picked once and reused until a retry
    FixedRandom = 3,
    /// Cycle through the members
    RoundRobin = 4,
    /// A node bound by the application
    UserSpecified = 5,
}

/// Policy used for keys nobody configured
pub const DEFAULT_SELECTION_POLICY: SelectionPolicy = SelectionPolicy::RoundRobin;

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPolicy::FirstMember => "FirstMember",
            SelectionPolicy::LastMember => "LastMember",
            SelectionPolicy::Random => "Random",
            SelectionPolicy::FixedRandom => "FixedRandom",
            SelectionPolicy::RoundRobin => "RoundRobin",
            SelectionPolicy::UserSpecified => "UserSpecified",
        }
    }

    /// Whether the policy needs the shard's member list
    pub fn uses_member_list(&self) -> bool {
        !matches!(self, SelectionPolicy::UserSpecified)
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for SelectionPolicy {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SelectionPolicy::FirstMember),
            1 => Ok(SelectionPolicy::LastMember),
            2 => Ok(SelectionPolicy::Random),
            3 => Ok(SelectionPolicy::FixedRandom),
            4 => Ok(SelectionPolicy::RoundRobin),
            5 => Ok(SelectionPolicy::UserSpecified),
            other => Err(Error::UnknownPolicy(other.to_string())),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "firstmember" | "first" => Ok(SelectionPolicy::FirstMember),
            "lastmember" | "last" => Ok(SelectionPolicy::LastMember),
            "random" => Ok(SelectionPolicy::Random),
            "fixedrandom" => Ok(SelectionPolicy::FixedRandom),
            "roundrobin" => Ok(SelectionPolicy::RoundRobin),
            "userspecified" | "user" => Ok(SelectionPolicy::UserSpecified),
            _ => Err(Error::UnknownPolicy(s.to_string())),
        }
    }
}

impl TryFrom<String> for SelectionPolicy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SelectionPolicy> for String {
    fn from(policy: SelectionPolicy) -> Self {
        policy.as_str().to_string()
    }
}

/// Mutable state bound to a key's policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Nothing picked or bound yet
    Unset,
    /// A bound node (`UserSpecified`) or the remembered pick (`FixedRandom`)
    Node(NodeId),
    /// Index returned by the last `RoundRobin` pick
    Cursor(usize),
}

impl PolicyState {
    /// The bound node, or `INVALID_NODE_ID`
    pub fn node(&self) -> NodeId {
        match self {
            PolicyState::Node(id) => *id,
            _ => INVALID_NODE_ID,
        }
    }
}

/// Policy and state for one routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEntry {
    pub policy: SelectionPolicy,
    pub state: PolicyState,
}

impl PolicyEntry {
    pub fn new(policy: SelectionPolicy, node: NodeId) -> Self {
        let state = match policy {
            SelectionPolicy::UserSpecified | SelectionPolicy::FixedRandom
                if node != INVALID_NODE_ID =>
            {
                PolicyState::Node(node)
            }
            _ => PolicyState::Unset,
        };
        Self { policy, state }
    }
}

/// Policy store keyed by routing key
///
/// Reads run in parallel; writes hold the lock only for the map update.
pub struct PolicyTable {
    default_policy: SelectionPolicy,
    entries: RwLock<HashMap<RoutingKey, PolicyEntry>>,
}

impl PolicyTable {
    pub fn new(default_policy: SelectionPolicy) -> Self {
        Self {
            default_policy,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_policy(&self) -> SelectionPolicy {
        self.default_policy
    }

    /// Overwrite the policy for `key`
    pub fn set(&self, key: RoutingKey, policy: SelectionPolicy, node: NodeId) {
        let entry = PolicyEntry::new(policy, node);
        self.entries.write().insert(key, entry);
    }

    /// Current policy for `key`, or the default
    pub fn get(&self, key: &RoutingKey) -> PolicyEntry {
        self.entries
            .read()
            .get(key)
            .copied()
            .unwrap_or_else(|| PolicyEntry::new(self.default_policy, INVALID_NODE_ID))
    }

    /// Advance the round-robin cursor for `key` and return the new position
    ///
    /// The read-modify-write happens under the exclusive lock so concurrent
    /// callers never observe the same cursor value. An unset cursor moves to 0.
    pub fn advance_cursor(&self, key: RoutingKey, len: usize) -> usize {
        debug_assert!(len > 0);
        let mut entries = self.entries.write();
        let default_policy = self.default_policy;
        let entry = entries
            .entry(key)
            .or_insert_with(|| PolicyEntry::new(default_policy, INVALID_NODE_ID));

        let next = match entry.state {
            PolicyState::Cursor(last) => last.wrapping_add(1) % len,
            _ => 0,
        };
        if entry.policy == SelectionPolicy::RoundRobin {
            entry.state = PolicyState::Cursor(next);
        }
        next
    }

    /// Remember a `FixedRandom` pick, unless the policy changed meanwhile
    pub fn remember_pick(&self, key: RoutingKey, node: NodeId) {
        let mut entries = self.entries.write();
        let default_policy = self.default_policy;
        let entry = entries
            .entry(key)
            .or_insert_with(|| PolicyEntry::new(default_policy, INVALID_NODE_ID));
        if entry.policy == SelectionPolicy::FixedRandom {
            entry.state = PolicyState::Node(node);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
