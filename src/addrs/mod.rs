//! Addresses of the objects a reference can point at.

mod parse;

pub use parse::{parse_module_instance, parse_reference, Reference};

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("invalid provider address {addr:?}: {reason}")]
    InvalidProvider { addr: String, reason: String },
    #[error("invalid module path {path:?}: {reason}")]
    InvalidModulePath { path: String, reason: String },
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static regex"))
}

pub fn is_valid_identifier(s: &str) -> bool {
    identifier_re().is_match(s)
}

/// Repetition key identifying one instance of a `count` or `for_each`
/// object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    #[default]
    NoKey,
    Int(i64),
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::NoKey => Ok(()),
            InstanceKey::Int(i) => write!(f, "[{i}]"),
            InstanceKey::Str(s) => write!(f, "[{s:?}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInstanceStep {
    pub name: String,
    pub key: InstanceKey,
}

/// Path through the dynamic module tree, from the root module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModuleInstance(pub Vec<ModuleInstanceStep>);

impl ModuleInstance {
    pub fn root() -> Self {
        ModuleInstance(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: impl Into<String>, key: InstanceKey) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleInstanceStep {
            name: name.into(),
            key,
        });
        ModuleInstance(steps)
    }

    /// The static module names along the path, with instance keys dropped.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.name.as_str())
    }

    /// Path as stored in legacy state: `["root", "a", "b[0]"]`.
    pub fn legacy_path(&self) -> Vec<String> {
        std::iter::once("root".to_string())
            .chain(self.0.iter().map(|s| format!("{}{}", s.name, s.key)))
            .collect()
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "module.{}{}", step.name, step.key)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceMode {
    Managed,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
}

impl Resource {
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Resource {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Resource {
            mode: ResourceMode::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn instance(&self, key: InstanceKey) -> ResourceInstance {
        ResourceInstance {
            resource: self.clone(),
            key,
        }
    }

    /// Provider type implied by the resource type name, e.g. `aws` for
    /// `aws_instance`.
    pub fn implied_provider(&self) -> String {
        self.type_name
            .split_once('_')
            .map_or(self.type_name.as_str(), |(prefix, _)| prefix)
            .to_string()
    }

    /// Legacy state key prefix shared by all instances of this resource.
    pub fn legacy_state_prefix(&self) -> String {
        match self.mode {
            ResourceMode::Managed => format!("{}.{}", self.type_name, self.name),
            ResourceMode::Data => format!("data.{}.{}", self.type_name, self.name),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceInstance {
    pub resource: Resource,
    pub key: InstanceKey,
}

impl ResourceInstance {
    /// Key of this instance in a legacy module state's resource map.
    /// String keys have no legacy form.
    pub fn legacy_state_key(&self) -> Option<String> {
        let prefix = self.resource.legacy_state_prefix();
        match &self.key {
            InstanceKey::NoKey => Some(prefix),
            InstanceKey::Int(i) => Some(format!("{prefix}.{i}")),
            InstanceKey::Str(_) => None,
        }
    }
}

impl fmt::Display for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resource, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderConfig {
    pub type_name: String,
    pub alias: Option<String>,
}

impl ProviderConfig {
    pub fn new(type_name: impl Into<String>) -> Self {
        ProviderConfig {
            type_name: type_name.into(),
            alias: None,
        }
    }

    pub fn with_alias(type_name: impl Into<String>, alias: impl Into<String>) -> Self {
        ProviderConfig {
            type_name: type_name.into(),
            alias: Some(alias.into()),
        }
    }

    pub fn absolute(&self, module: &ModuleInstance) -> AbsProviderConfig {
        AbsProviderConfig {
            module: module.clone(),
            provider: self.clone(),
        }
    }
}

impl fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "provider.{}.{}", self.type_name, alias),
            None => write!(f, "provider.{}", self.type_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbsProviderConfig {
    pub module: ModuleInstance,
    pub provider: ProviderConfig,
}

impl AbsProviderConfig {
    pub fn root(provider: ProviderConfig) -> Self {
        provider.absolute(&ModuleInstance::root())
    }

    /// Parses the provider string recorded in legacy state, such as
    /// `provider.aws`, `provider.aws.west` or `module.net.provider.aws`.
    pub fn parse_legacy(s: &str) -> Result<Self, AddrError> {
        let invalid = |reason: &str| AddrError::InvalidProvider {
            addr: s.to_string(),
            reason: reason.to_string(),
        };
        let parts: Vec<&str> = s.split('.').collect();
        let mut module = ModuleInstance::root();
        let mut i = 0;
        while parts.get(i) == Some(&"module") {
            let name = parts
                .get(i + 1)
                .ok_or_else(|| invalid("module keyword must be followed by a module name"))?;
            if !is_valid_identifier(name) {
                return Err(invalid("invalid module name"));
            }
            module = module.child(*name, InstanceKey::NoKey);
            i += 2;
        }
        if parts.get(i) != Some(&"provider") {
            return Err(invalid("expected \"provider\""));
        }
        let type_name = parts
            .get(i + 1)
            .ok_or_else(|| invalid("provider keyword must be followed by a provider type"))?;
        if !is_valid_identifier(type_name) {
            return Err(invalid("invalid provider type name"));
        }
        let provider = match parts.get(i + 2) {
            None => ProviderConfig::new(*type_name),
            Some(alias) if is_valid_identifier(alias) && parts.len() == i + 3 => {
                ProviderConfig::with_alias(*type_name, *alias)
            }
            Some(_) => return Err(invalid("unexpected extra segments after provider alias")),
        };
        Ok(AbsProviderConfig { module, provider })
    }
}

impl fmt::Display for AbsProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.provider)
        } else {
            write!(f, "{}.{}", self.module, self.provider)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CountAttr {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputVariable {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalValue {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathAttr {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerraformAttr {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCallInstance {
    pub call: String,
    pub key: InstanceKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCallOutput {
    pub call: ModuleCallInstance,
    pub name: String,
}

/// Everything a reference can point at. Each variant has its own resolver
/// on [`crate::evaluate::Data`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Referenceable {
    CountAttr(CountAttr),
    InputVariable(InputVariable),
    LocalValue(LocalValue),
    ModuleCallInstance(ModuleCallInstance),
    ModuleCallOutput(ModuleCallOutput),
    PathAttr(PathAttr),
    ResourceInstance(ResourceInstance),
    TerraformAttr(TerraformAttr),
    SelfRef,
}

impl fmt::Display for Referenceable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referenceable::CountAttr(a) => write!(f, "count.{}", a.name),
            Referenceable::InputVariable(v) => write!(f, "var.{}", v.name),
            Referenceable::LocalValue(l) => write!(f, "local.{}", l.name),
            Referenceable::ModuleCallInstance(m) => write!(f, "module.{}{}", m.call, m.key),
            Referenceable::ModuleCallOutput(o) => {
                write!(f, "module.{}{}.{}", o.call.call, o.call.key, o.name)
            }
            Referenceable::PathAttr(p) => write!(f, "path.{}", p.name),
            Referenceable::ResourceInstance(r) => write!(f, "{r}"),
            Referenceable::TerraformAttr(t) => write!(f, "terraform.{}", t.name),
            Referenceable::SelfRef => write!(f, "self"),
        }
    }
}
