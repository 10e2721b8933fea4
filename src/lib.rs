pub mod addrs;
pub mod configs;
pub mod diagnostics;
pub mod evaluate;
pub mod flatmap;
pub mod schema;
pub mod settings;
pub mod states;
pub mod suggest;
pub mod value;

use anyhow::Result;
use std::path::Path;

pub use addrs::{parse_module_instance, parse_reference, Reference, Referenceable};
pub use configs::Config;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use evaluate::{ContextMeta, Evaluator, Scope, WalkOperation};
pub use flatmap::{value_from_flatmap, Flatmap, FlatmapError};
pub use schema::SchemaCache;
pub use states::State;
pub use value::{Type, Value};

// Loader abstraction: lets callers control how files are read.
pub trait Loader {
    fn load(&self, path: &Path) -> Result<String>;
}

// Parse the configuration tree starting at `root_path` using a Loader.
pub fn load_config(root_path: &Path, loader: &dyn Loader) -> Result<Config> {
    configs::load_root_with_loader(root_path, loader)
}
