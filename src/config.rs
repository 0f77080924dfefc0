//! Shardline Configuration
//!
//! This module provides configuration structures for a shardline node:
//! dispatcher sizing, member selection policies, logging and the shard
//! layout fed to the allocation planner.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::layout::Layout;
use crate::registry::TypeRegistry;
use crate::routing::{SelectionPolicy, DEFAULT_SELECTION_POLICY};
use crate::types::{NodeId, RoutingKey, ShardIndex, SubgroupIndex, INVALID_NODE_ID};

/// Main shardline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardlineConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Off-critical-path dispatcher configuration
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Member selection configuration
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Shard layout, one entry per registered data type
    #[serde(default)]
    pub layout: Layout,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier within the group
    #[serde(default)]
    pub id: NodeId,

    /// Prefix for the names of threads this node spawns
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

/// Action dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Worker threads (0 = auto-tune from CPU cores)
    #[serde(default)]
    pub pool_size: usize,

    /// How long shutdown waits for the rest of the group at the barrier
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,
}

/// Member selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Policy for keys without an explicit entry
    #[serde(default = "default_policy_name")]
    pub default_policy: String,

    /// Per-shard policy overrides
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

/// Policy bound to one shard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Registered data type name
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub subgroup: SubgroupIndex,

    #[serde(default)]
    pub shard: ShardIndex,

    /// Policy name (first_member, last_member, random, fixed_random,
    /// round_robin, user_specified)
    pub policy: String,

    /// Target node for user_specified
    #[serde(default)]
    pub node: Option<NodeId>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_thread_name() -> String {
    "shardline".to_string()
}

fn default_barrier_timeout_ms() -> u64 {
    5000
}

fn default_policy_name() -> String {
    DEFAULT_SELECTION_POLICY.as_str().to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: 0,
            thread_name: default_thread_name(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: 0,
            barrier_timeout_ms: default_barrier_timeout_ms(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_policy: default_policy_name(),
            policies: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ShardlineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ShardlineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: ShardlineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// An unknown policy name is reported as the fatal `UnknownPolicy`.
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id == INVALID_NODE_ID {
            return Err(crate::Error::Config(format!(
                "node.id {} is reserved for external clients",
                INVALID_NODE_ID
            )));
        }

        if self.node.thread_name.is_empty() {
            return Err(crate::Error::Config("node.thread_name cannot be empty".into()));
        }

        if self.layout.is_empty() {
            return Err(crate::Error::Config(
                "at least one [[layout]] entry is required".into(),
            ));
        }

        self.default_policy()?;
        for entry in &self.routing.policies {
            let policy: SelectionPolicy = entry.policy.parse()?;
            if policy == SelectionPolicy::UserSpecified && entry.node.is_none() {
                return Err(crate::Error::Config(format!(
                    "user_specified policy for {}/{}/{} needs a node",
                    entry.type_name, entry.subgroup, entry.shard
                )));
            }
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(crate::Error::Config(format!(
                    "logging.format must be pretty or json, got '{}'",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Policy for keys without an explicit entry
    pub fn default_policy(&self) -> crate::Result<SelectionPolicy> {
        self.routing.default_policy.parse()
    }

    /// Resolve policy entries against the registered data types
    pub fn policy_bindings(
        &self,
        registry: &TypeRegistry,
    ) -> crate::Result<Vec<(RoutingKey, SelectionPolicy, NodeId)>> {
        self.routing
            .policies
            .iter()
            .map(|entry| {
                let data_type = registry.by_name(&entry.type_name).ok_or_else(|| {
                    crate::Error::Config(format!(
                        "routing policy names unknown data type '{}'",
                        entry.type_name
                    ))
                })?;
                let policy: SelectionPolicy = entry.policy.parse()?;
                Ok((
                    RoutingKey::new(data_type, entry.subgroup, entry.shard),
                    policy,
                    entry.node.unwrap_or(INVALID_NODE_ID),
                ))
            })
            .collect()
    }

    /// Dispatcher pool size, auto-tuned when set to 0
    pub fn pool_size(&self) -> usize {
        if self.dispatcher.pool_size > 0 {
            self.dispatcher.pool_size
        } else {
            crate::tuning::auto_tune().pool_size
        }
    }

    /// Get the barrier timeout as Duration
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatcher.barrier_timeout_ms)
    }

    /// Sample configuration written by `shardline init`
    pub fn sample(node_id: NodeId) -> String {
        format!(
            r#"# Shardline Configuration
# Generated configuration file

[node]
id = {node_id}
thread_name = "shardline"

[dispatcher]
# 0 = one worker per four CPU cores
pool_size = 0
barrier_timeout_ms = 5000

[routing]
default_policy = "round_robin"

# [[routing.policies]]
# type = "objects"
# subgroup = 0
# shard = 0
# policy = "user_specified"
# node = 1

[logging]
level = "info"
format = "pretty"

[[layout]]
name = "objects"

[[layout.subgroups]]
min_nodes_by_shard = [2, 2]
max_nodes_by_shard = [3, 3]
mode = "flexible"
"#
        )
    }
}

/// Default configuration file path
pub fn default_config_path() -> PathBuf {
    PathBuf::from("shardline.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::AllocationMode;
    use crate::types::DataType;
    use std::io::Write;

    const CONFIG: &str = r#"
[node]
id = 3

[dispatcher]
pool_size = 4

[routing]
default_policy = "first_member"

[[routing.policies]]
type = "objects"
shard = 1
policy = "user_specified"
node = 7

[[layout]]
name = "objects"

[[layout.subgroups]]
min_nodes_by_shard = [1, 1]
max_nodes_by_shard = [2, 2]
mode = "flexible"
"#;

    #[test]
    fn test_parse_config() {
        let config = ShardlineConfig::from_str(CONFIG).unwrap();
        assert_eq!(config.node.id, 3);
        assert_eq!(config.node.thread_name, "shardline");
        assert_eq!(config.pool_size(), 4);
        assert_eq!(config.default_policy().unwrap(), SelectionPolicy::FirstMember);
        assert_eq!(config.layout.len(), 1);
        assert_eq!(config.layout.0[0].subgroups[0].mode, AllocationMode::Flexible);
        assert_eq!(config.logging.format, "pretty");

        let registry = TypeRegistry::builder().register("objects").build().unwrap();
        let bindings = config.policy_bindings(&registry).unwrap();
        assert_eq!(
            bindings,
            vec![(
                RoutingKey::new(DataType(0), 0, 1),
                SelectionPolicy::UserSpecified,
                7
            )]
        );
    }

    #[test]
    fn test_unknown_policy_is_fatal() {
        let toml = CONFIG.replace("first_member", "closest_member");
        let err = ShardlineConfig::from_str(&toml).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, crate::Error::UnknownPolicy(_)));
    }

    #[test]
    fn test_user_specified_needs_node() {
        let toml = CONFIG.replace("node = 7\n", "");
        assert!(matches!(
            ShardlineConfig::from_str(&toml),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_layout_required() {
        assert!(matches!(
            ShardlineConfig::from_str("[node]\nid = 1\n"),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_type_in_policy() {
        let config = ShardlineConfig::from_str(CONFIG).unwrap();
        let registry = TypeRegistry::builder().register("other").build().unwrap();
        assert!(config.policy_bindings(&registry).is_err());
    }

    #[test]
    fn test_sample_round_trips_through_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ShardlineConfig::sample(5).as_bytes()).unwrap();

        let config = ShardlineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.node.id, 5);
        assert_eq!(config.default_policy().unwrap(), SelectionPolicy::RoundRobin);
        assert_eq!(config.barrier_timeout(), Duration::from_secs(5));
    }
}
