//! Provider schemas and the shared cache of them.

use log::{trace, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::addrs::{AbsProviderConfig, ResourceMode};
use crate::value::Type;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default)]
    pub block_types: BTreeMap<String, NestedBlock>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestingMode {
    Single,
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NestedBlock {
    pub nesting: NestingMode,
    pub block: Block,
    #[serde(default)]
    pub min_items: usize,
    #[serde(default)]
    pub max_items: usize,
}

impl Attribute {
    pub fn new(ty: Type) -> Self {
        Attribute {
            ty,
            required: false,
            optional: true,
            computed: false,
        }
    }

    pub fn computed(ty: Type) -> Self {
        Attribute {
            ty,
            required: false,
            optional: false,
            computed: true,
        }
    }
}

impl Block {
    /// The object type a value conforming to this block has: one attribute
    /// per declared attribute and per nested block type.
    pub fn implied_type(&self) -> Type {
        let mut attrs: BTreeMap<String, Type> = self
            .attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.ty.clone()))
            .collect();
        for (name, nested) in &self.block_types {
            let inner = nested.block.implied_type();
            let ty = match nested.nesting {
                NestingMode::Single => inner,
                NestingMode::List => Type::list(inner),
                NestingMode::Set => Type::set(inner),
                NestingMode::Map => Type::map(inner),
            };
            attrs.insert(name.clone(), ty);
        }
        Type::Object(attrs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderSchema {
    #[serde(default)]
    pub resource_types: HashMap<String, Block>,
    #[serde(default)]
    pub data_sources: HashMap<String, Block>,
}

impl ProviderSchema {
    pub fn schema_for_resource(&self, mode: ResourceMode, type_name: &str) -> Option<&Block> {
        match mode {
            ResourceMode::Managed => self.resource_types.get(type_name),
            ResourceMode::Data => self.data_sources.get(type_name),
        }
    }
}

/// Schemas of every provider configuration initialized so far, keyed by the
/// provider address string. Population happens concurrently with lookups,
/// so every access takes the lock.
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: Mutex<HashMap<String, Arc<ProviderSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, provider: &AbsProviderConfig, schema: ProviderSchema) {
        let key = provider.to_string();
        trace!("caching provider schema for {key}");
        self.schemas.lock().insert(key, Arc::new(schema));
    }

    pub fn resource_schema(
        &self,
        provider: &AbsProviderConfig,
        mode: ResourceMode,
        type_name: &str,
    ) -> Option<Block> {
        let guard = self.schemas.lock();
        let Some(schema) = guard.get(&provider.to_string()) else {
            warn!("no schema cached for {provider}");
            return None;
        };
        schema.schema_for_resource(mode, type_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a cache from a JSON document mapping provider address strings
    /// to provider schemas.
    pub fn from_json(src: &str) -> anyhow::Result<Self> {
        let raw: HashMap<String, ProviderSchema> = serde_json::from_str(src)?;
        let cache = SchemaCache::new();
        for (addr, schema) in raw {
            let provider = AbsProviderConfig::parse_legacy(&addr)
                .map_err(|e| anyhow::anyhow!("invalid provider address {addr:?}: {e}"))?;
            cache.insert(&provider, schema);
        }
        Ok(cache)
    }
}
