//! Persisted state in the legacy (version 3) JSON layout.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::addrs::{AbsProviderConfig, AddrError, ModuleInstance};
use crate::flatmap::Flatmap;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("reading state file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding state: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state version {0}, expected 3")]
    UnsupportedVersion(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub version: u64,
    #[serde(default)]
    pub modules: Vec<ModuleState>,
}

impl Default for State {
    fn default() -> Self {
        State {
            version: 3,
            modules: Vec::new(),
        }
    }
}

impl State {
    pub fn from_json(src: &str) -> Result<Self, StateError> {
        let state: State = serde_json::from_str(src)?;
        if state.version != 3 {
            return Err(StateError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }

    pub fn module_by_path(&self, path: &ModuleInstance) -> Option<&ModuleState> {
        let legacy = path.legacy_path();
        self.modules.iter().find(|m| m.path == legacy)
    }

    pub fn module_mut_or_insert(&mut self, path: &ModuleInstance) -> &mut ModuleState {
        let legacy = path.legacy_path();
        let idx = match self.modules.iter().position(|m| m.path == legacy) {
            Some(idx) => idx,
            None => {
                self.modules.push(ModuleState {
                    path: legacy,
                    ..ModuleState::default()
                });
                self.modules.len() - 1
            }
        };
        &mut self.modules[idx]
    }
}

pub fn read_state(path: &Path) -> Result<State, StateError> {
    let src = std::fs::read_to_string(path).map_err(|source| StateError::Io {
        path: path.display().to_string(),
        source,
    })?;
    State::from_json(&src)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub path: Vec<String>,
    /// Local values already evaluated during a previous walk.
    #[serde(default)]
    pub locals: HashMap<String, hcl::Value>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
}

impl ModuleState {
    pub fn set_local(&mut self, name: impl Into<String>, value: hcl::Value) {
        self.locals.insert(name.into(), value);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub primary: Option<InstanceState>,
}

impl ResourceState {
    pub fn provider_addr(&self) -> Result<AbsProviderConfig, AddrError> {
        AbsProviderConfig::parse_legacy(&self.provider)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: Flatmap,
}
