//! Data Type Registry
//!
//! Runtime table of the data types a deployment serves. Built once at
//! startup and immutable afterwards; every routed call resolves its data
//! type here first.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::store::{ShardStore, VersionedStore};
use crate::types::{DataType, NodeId, RoutingKey};

/// What a store factory gets to see when a replica is created
pub struct FactoryContext {
    /// Node hosting the replica
    pub node: NodeId,
    /// Shared service context, when the node runs a service
    ///
    /// Stores that keep it must hold a `Weak` reference; the context owns
    /// the transport that owns the store.
    pub service: Option<Arc<ServiceContext>>,
}

/// Builds the store for one shard replica
pub type StoreFactory = Arc<dyn Fn(RoutingKey, &FactoryContext) -> Box<dyn ShardStore> + Send + Sync>;

/// Registry entry for one data type
#[derive(Clone)]
pub struct TypeDescriptor {
    pub data_type: DataType,
    pub name: String,
    pub factory: StoreFactory,
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("data_type", &self.data_type)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registered data types, in registration order
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<TypeDescriptor>,
    by_name: HashMap<String, DataType>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Look up a data type's descriptor
    pub fn descriptor(&self, data_type: DataType) -> Result<&TypeDescriptor> {
        self.types
            .get(data_type.0 as usize)
            .ok_or(Error::UnknownDataType(data_type))
    }

    /// Resolve a data type by name
    pub fn by_name(&self, name: &str) -> Option<DataType> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, data_type: DataType) -> Option<&str> {
        self.descriptor(data_type).ok().map(|d| d.name.as_str())
    }

    /// Create a replica store through the type's factory
    pub fn create_store(&self, key: RoutingKey, ctx: &FactoryContext) -> Result<Box<dyn ShardStore>> {
        let descriptor = self.descriptor(key.data_type)?;
        Ok((descriptor.factory)(key, ctx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Builder for `TypeRegistry`
#[derive(Default)]
pub struct TypeRegistryBuilder {
    types: Vec<TypeDescriptor>,
}

impl TypeRegistryBuilder {
    /// Register a data type backed by the in-memory versioned store
    pub fn register(self, name: impl Into<String>) -> Self {
        self.register_with(name, |_, _| Box::new(VersionedStore::new()))
    }

    /// Register a data type with a custom store factory
    pub fn register_with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(RoutingKey, &FactoryContext) -> Box<dyn ShardStore> + Send + Sync + 'static,
    {
        let data_type = DataType(self.types.len() as u32);
        self.types.push(TypeDescriptor {
            data_type,
            name: name.into(),
            factory: Arc::new(factory),
        });
        self
    }

    pub fn build(self) -> Result<TypeRegistry> {
        let mut by_name = HashMap::with_capacity(self.types.len());
        for descriptor in &self.types {
            if descriptor.name.is_empty() {
                return Err(Error::Config("data type name cannot be empty".into()));
            }
            if by_name
                .insert(descriptor.name.clone(), descriptor.data_type)
                .is_some()
            {
                return Err(Error::Config(format!(
                    "data type '{}' registered twice",
                    descriptor.name
                )));
            }
        }
        Ok(TypeRegistry {
            types: self.types,
            by_name,
        })
    }
}
