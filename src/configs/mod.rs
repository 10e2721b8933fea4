//! Static configuration tree: one [`Module`] per module call, nested the
//! same way the calls are.

mod load;

pub use load::load_root_with_loader;

use std::collections::BTreeMap;

use crate::addrs::{ModuleInstance, ProviderConfig, Resource, ResourceMode};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub module: Module,
    /// Child configurations keyed by module call name.
    pub children: BTreeMap<String, Config>,
}

impl Config {
    /// Configuration for the static module reached by following `names`
    /// from this node.
    pub fn descendent<'a, I>(&self, names: I) -> Option<&Config>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut current = self;
        for name in names {
            current = current.children.get(name)?;
        }
        Some(current)
    }

    /// Instance keys are ignored: every instance of a module call shares one
    /// configuration.
    pub fn descendent_for_instance(&self, path: &ModuleInstance) -> Option<&Config> {
        self.descendent(path.names())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub source_dir: String,
    pub locals: BTreeMap<String, Local>,
    /// Managed resources keyed by `type.name`.
    pub managed_resources: BTreeMap<String, ResourceConfig>,
    /// Data resources keyed by `type.name`.
    pub data_resources: BTreeMap<String, ResourceConfig>,
    pub module_calls: BTreeMap<String, ModuleCall>,
}

impl Module {
    pub fn resource_by_addr(&self, addr: &Resource) -> Option<&ResourceConfig> {
        let key = format!("{}.{}", addr.type_name, addr.name);
        match addr.mode {
            ResourceMode::Managed => self.managed_resources.get(&key),
            ResourceMode::Data => self.data_resources.get(&key),
        }
    }

    pub fn add_resource(&mut self, rc: ResourceConfig) {
        let key = format!("{}.{}", rc.type_name, rc.name);
        match rc.mode {
            ResourceMode::Managed => self.managed_resources.insert(key, rc),
            ResourceMode::Data => self.data_resources.insert(key, rc),
        };
    }

    /// Names of declared resources of the given mode and type, in
    /// declaration-key order.
    pub fn resource_names(&self, mode: ResourceMode, type_name: &str) -> Vec<String> {
        let resources = match mode {
            ResourceMode::Managed => &self.managed_resources,
            ResourceMode::Data => &self.data_resources,
        };
        resources
            .values()
            .filter(|rc| rc.type_name == type_name)
            .map(|rc| rc.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub expr: hcl::Expression,
}

#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
    /// Explicit `provider = aws.west` argument, if any.
    pub provider_ref: Option<ProviderConfig>,
    pub count: Option<hcl::Expression>,
    pub for_each: Option<hcl::Expression>,
}

impl ResourceConfig {
    pub fn new(mode: ResourceMode, type_name: impl Into<String>, name: impl Into<String>) -> Self {
        ResourceConfig {
            mode,
            type_name: type_name.into(),
            name: name.into(),
            provider_ref: None,
            count: None,
            for_each: None,
        }
    }

    pub fn addr(&self) -> Resource {
        Resource {
            mode: self.mode,
            type_name: self.type_name.clone(),
            name: self.name.clone(),
        }
    }

    /// The provider configuration responsible for this resource: the
    /// explicit reference, or the default configuration of the implied
    /// provider type.
    pub fn provider_config_addr(&self) -> ProviderConfig {
        self.provider_ref
            .clone()
            .unwrap_or_else(|| ProviderConfig::new(self.addr().implied_provider()))
    }
}

#[derive(Debug, Clone)]
pub struct ModuleCall {
    pub name: String,
    pub source: String,
}
