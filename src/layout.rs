//! Allocation Planner
//!
//! Turns the declarative layout (subgroups and shards per data type) into
//! the per-type allocation policies a substrate needs when the group forms.
//! Pure transformation, no runtime state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::types::{DataType, RoutingKey, ShardIndex, SubgroupIndex};

/// Whether shard membership is pinned to the minimum or may grow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    /// Shards take exactly `min_nodes` members
    #[default]
    Fixed,
    /// Shards accept members up to `max_nodes`
    Flexible,
}

/// Layout of one subgroup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgroupLayout {
    pub min_nodes_by_shard: Vec<u32>,
    pub max_nodes_by_shard: Vec<u32>,
    #[serde(default)]
    pub mode: AllocationMode,
}

impl SubgroupLayout {
    /// `shards` shards of identical size
    pub fn uniform(shards: usize, min_nodes: u32, max_nodes: u32, mode: AllocationMode) -> Self {
        Self {
            min_nodes_by_shard: vec![min_nodes; shards],
            max_nodes_by_shard: vec![max_nodes; shards],
            mode,
        }
    }
}

/// Reference to a subgroup by type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgroupRef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub subgroup: SubgroupIndex,
}

/// Cross-product entry: every member of `source` talks to every shard of `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossProductLayout {
    pub source: SubgroupRef,
    pub target: SubgroupRef,
}

/// Layout entry for one data type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataTypeLayout {
    /// Optional name, checked against the registered type at this position
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "layout")]
    pub subgroups: Vec<SubgroupLayout>,
    #[serde(default)]
    pub cross_product: Option<CrossProductLayout>,
}

/// Ordered layout, one entry per registered data type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout(pub Vec<DataTypeLayout>);

impl Layout {
    /// Parse a layout from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shard sizing for one subgroup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardAllocationPolicy {
    pub min_nodes_by_shard: Vec<u32>,
    pub max_nodes_by_shard: Vec<u32>,
    pub mode: AllocationMode,
}

impl ShardAllocationPolicy {
    pub fn num_shards(&self) -> u32 {
        self.min_nodes_by_shard.len() as u32
    }

    /// Capacity of `shard` under the allocation mode
    pub fn capacity(&self, shard: ShardIndex) -> u32 {
        let i = shard as usize;
        match self.mode {
            AllocationMode::Fixed => self.min_nodes_by_shard[i],
            AllocationMode::Flexible => self.max_nodes_by_shard[i],
        }
    }
}

/// Cross-product policy with resolved data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossProductPolicy {
    pub source: (DataType, SubgroupIndex),
    pub target: (DataType, SubgroupIndex),
}

/// Allocation policy for one data type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// One entry per subgroup
    Sharded(Vec<ShardAllocationPolicy>),
    CrossProduct(CrossProductPolicy),
}

/// Allocation policies for every data type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubgroupInfo {
    policies: HashMap<DataType, AllocationPolicy>,
}

impl SubgroupInfo {
    pub fn policy(&self, data_type: DataType) -> Option<&AllocationPolicy> {
        self.policies.get(&data_type)
    }

    /// Subgroup policies of a sharded type; empty for cross-product types
    pub fn subgroups(&self, data_type: DataType) -> &[ShardAllocationPolicy] {
        match self.policies.get(&data_type) {
            Some(AllocationPolicy::Sharded(subgroups)) => subgroups,
            _ => &[],
        }
    }

    pub fn number_of_subgroups(&self, data_type: DataType) -> u32 {
        self.subgroups(data_type).len() as u32
    }

    pub fn number_of_shards(&self, data_type: DataType, subgroup: SubgroupIndex) -> u32 {
        self.subgroups(data_type)
            .get(subgroup as usize)
            .map(|s| s.num_shards())
            .unwrap_or(0)
    }

    /// Every shard in the deployment, in type/subgroup/shard order
    pub fn shard_keys(&self) -> Vec<RoutingKey> {
        let mut types: Vec<_> = self.policies.keys().copied().collect();
        types.sort();
        let mut keys = Vec::new();
        for data_type in types {
            for (subgroup, policy) in self.subgroups(data_type).iter().enumerate() {
                for shard in 0..policy.num_shards() {
                    keys.push(RoutingKey::new(data_type, subgroup as SubgroupIndex, shard));
                }
            }
        }
        keys
    }
}

/// Build the allocation policies for `registry` from `layout`
///
/// Entry `i` of the layout describes the `i`-th registered data type.
pub fn plan(layout: &Layout, registry: &TypeRegistry) -> Result<SubgroupInfo> {
    if layout.len() != registry.len() {
        return Err(Error::Config(format!(
            "layout describes {} data types but {} are registered",
            layout.len(),
            registry.len()
        )));
    }

    let mut policies = HashMap::with_capacity(layout.len());
    for (entry, descriptor) in layout.0.iter().zip(registry.iter()) {
        if let Some(name) = &entry.name {
            if name != &descriptor.name {
                return Err(Error::Config(format!(
                    "layout entry '{}' is in the position of data type '{}'",
                    name, descriptor.name
                )));
            }
        }

        let policy = match (&entry.cross_product, entry.subgroups.is_empty()) {
            (Some(_), false) => {
                return Err(Error::Config(format!(
                    "data type '{}' cannot have both subgroups and a cross product",
                    descriptor.name
                )))
            }
            (None, true) => {
                return Err(Error::Config(format!(
                    "data type '{}' needs at least one subgroup",
                    descriptor.name
                )))
            }
            (Some(cross), true) => AllocationPolicy::CrossProduct(CrossProductPolicy {
                source: resolve_ref(&cross.source, registry)?,
                target: resolve_ref(&cross.target, registry)?,
            }),
            (None, false) => AllocationPolicy::Sharded(
                entry
                    .subgroups
                    .iter()
                    .enumerate()
                    .map(|(i, subgroup)| shard_policy(&descriptor.name, i, subgroup))
                    .collect::<Result<_>>()?,
            ),
        };
        policies.insert(descriptor.data_type, policy);
    }

    let info = SubgroupInfo { policies };
    check_cross_products(&info, registry)?;
    tracing::trace!(types = registry.len(), "subgroup info created from layout");
    Ok(info)
}

fn shard_policy(type_name: &str, index: usize, layout: &SubgroupLayout) -> Result<ShardAllocationPolicy> {
    if layout.min_nodes_by_shard.is_empty() {
        return Err(Error::Config(format!(
            "{} subgroup {}: at least one shard is required",
            type_name, index
        )));
    }
    if layout.min_nodes_by_shard.len() != layout.max_nodes_by_shard.len() {
        return Err(Error::Config(format!(
            "{} subgroup {}: min_nodes_by_shard and max_nodes_by_shard differ in length",
            type_name, index
        )));
    }
    for (shard, (min, max)) in layout
        .min_nodes_by_shard
        .iter()
        .zip(&layout.max_nodes_by_shard)
        .enumerate()
    {
        if *min == 0 || min > max {
            return Err(Error::Config(format!(
                "{} subgroup {} shard {}: need 1 <= min_nodes ({}) <= max_nodes ({})",
                type_name, index, shard, min, max
            )));
        }
    }
    Ok(ShardAllocationPolicy {
        min_nodes_by_shard: layout.min_nodes_by_shard.clone(),
        max_nodes_by_shard: layout.max_nodes_by_shard.clone(),
        mode: layout.mode,
    })
}

fn resolve_ref(reference: &SubgroupRef, registry: &TypeRegistry) -> Result<(DataType, SubgroupIndex)> {
    let data_type = registry.by_name(&reference.type_name).ok_or_else(|| {
        Error::Config(format!(
            "cross product references unknown data type '{}'",
            reference.type_name
        ))
    })?;
    Ok((data_type, reference.subgroup))
}

fn check_cross_products(info: &SubgroupInfo, registry: &TypeRegistry) -> Result<()> {
    for policy in info.policies.values() {
        if let AllocationPolicy::CrossProduct(cross) = policy {
            for (data_type, subgroup) in [cross.source, cross.target] {
                if (subgroup as usize) >= info.subgroups(data_type).len() {
                    return Err(Error::Config(format!(
                        "cross product references missing subgroup {} of '{}'",
                        subgroup,
                        registry.name(data_type).unwrap_or("?")
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register("volatile")
            .register("persistent")
            .build()
            .unwrap()
    }

    #[test]
    fn test_plan_from_json() {
        let json = r#"[
            {"layout": [{"min_nodes_by_shard": [1, 1], "max_nodes_by_shard": [3, 3]}]},
            {"name": "persistent",
             "layout": [{"min_nodes_by_shard": [2], "max_nodes_by_shard": [4], "mode": "flexible"}]}
        ]"#;
        let layout = Layout::from_json(json).unwrap();
        let info = plan(&layout, &registry()).unwrap();

        assert_eq!(info.number_of_shards(DataType(0), 0), 2);
        assert_eq!(info.number_of_shards(DataType(1), 0), 1);
        assert_eq!(info.number_of_shards(DataType(1), 5), 0);

        let persistent = &info.subgroups(DataType(1))[0];
        assert_eq!(persistent.mode, AllocationMode::Flexible);
        assert_eq!(persistent.capacity(0), 4);
        assert_eq!(info.subgroups(DataType(0))[0].capacity(1), 1);

        assert_eq!(
            info.shard_keys(),
            vec![
                RoutingKey::new(DataType(0), 0, 0),
                RoutingKey::new(DataType(0), 0, 1),
                RoutingKey::new(DataType(1), 0, 0),
            ]
        );
    }

    #[test]
    fn test_entry_count_must_match_registry() {
        let layout = Layout(vec![DataTypeLayout {
            subgroups: vec![SubgroupLayout::uniform(1, 1, 1, AllocationMode::Fixed)],
            ..Default::default()
        }]);
        assert!(matches!(plan(&layout, &registry()), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_shard_sizes() {
        let bad = |min, max| {
            Layout(vec![
                DataTypeLayout {
                    subgroups: vec![SubgroupLayout::uniform(1, min, max, AllocationMode::Fixed)],
                    ..Default::default()
                },
                DataTypeLayout {
                    subgroups: vec![SubgroupLayout::uniform(1, 1, 1, AllocationMode::Fixed)],
                    ..Default::default()
                },
            ])
        };
        assert!(plan(&bad(0, 1), &registry()).is_err());
        assert!(plan(&bad(3, 2), &registry()).is_err());
        assert!(plan(&bad(1, 2), &registry()).is_ok());
    }

    #[test]
    fn test_name_mismatch() {
        let layout = Layout(vec![
            DataTypeLayout {
                name: Some("persistent".into()),
                subgroups: vec![SubgroupLayout::uniform(1, 1, 1, AllocationMode::Fixed)],
                ..Default::default()
            },
            DataTypeLayout {
                subgroups: vec![SubgroupLayout::uniform(1, 1, 1, AllocationMode::Fixed)],
                ..Default::default()
            },
        ]);
        assert!(plan(&layout, &registry()).is_err());
    }

    #[test]
    fn test_cross_product() {
        let layout = Layout(vec![
            DataTypeLayout {
                subgroups: vec![SubgroupLayout::uniform(2, 1, 1, AllocationMode::Fixed)],
                ..Default::default()
            },
            DataTypeLayout {
                cross_product: Some(CrossProductLayout {
                    source: SubgroupRef {
                        type_name: "volatile".into(),
                        subgroup: 0,
                    },
                    target: SubgroupRef {
                        type_name: "volatile".into(),
                        subgroup: 0,
                    },
                }),
                ..Default::default()
            },
        ]);
        let info = plan(&layout, &registry()).unwrap();
        assert!(matches!(
            info.policy(DataType(1)),
            Some(AllocationPolicy::CrossProduct(_))
        ));
        assert!(info.subgroups(DataType(1)).is_empty());

        let mut broken = layout.clone();
        if let Some(cross) = broken.0[1].cross_product.as_mut() {
            cross.target.subgroup = 3;
        }
        assert!(plan(&broken, &registry()).is_err());
    }
}
