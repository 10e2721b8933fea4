use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::evaluate::WalkOperation;

/// Settings read from `tfscope.toml`. Command line flags take precedence.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Root module directory or `.hcl` file.
    #[serde(default = "default_config")]
    pub config: PathBuf,
    /// Legacy JSON state file
    pub state: Option<PathBuf>,
    /// Provider schemas, keyed by provider address
    pub schemas: Option<PathBuf>,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub operation: WalkOperation,
}

fn default_config() -> PathBuf {
    PathBuf::from(".")
}

fn default_workspace() -> String {
    "default".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            config: default_config(),
            state: None,
            schemas: None,
            workspace: default_workspace(),
            operation: WalkOperation::default(),
        }
    }
}

/// Load settings from tfscope.toml in the working directory
pub fn load_settings() -> Result<Option<Settings>> {
    load_settings_from_path(Path::new("tfscope.toml"))
}

pub fn load_settings_from_path(path: &Path) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings file {}", path.display()))?;
    let settings: Settings = toml::from_str(&content)
        .with_context(|| format!("parsing settings file {}", path.display()))?;
    Ok(Some(settings))
}
