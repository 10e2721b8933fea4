use anyhow::{bail, Context, Result};
use log::debug;
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

use super::{Config, Local, ModuleCall, ResourceConfig};
use crate::addrs::{is_valid_identifier, ProviderConfig, ResourceMode};
use crate::Loader;

pub fn find_attr<'a>(body: &'a hcl::Body, name: &str) -> Option<&'a hcl::Attribute> {
    body.attributes().find(|a| a.key() == name)
}

/// Joins a module `source` onto `base`, dropping `.` components.
pub fn resolve_module_path(base: &Path, source: &str) -> PathBuf {
    let p = Path::new(source);
    let joined = if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    };
    joined.components().collect()
}

/// Loads the configuration tree rooted at `path` (a `.hcl` file, or a
/// directory containing `main.hcl`).
pub fn load_root_with_loader(path: &Path, loader: &dyn Loader) -> Result<Config> {
    let path = if path.is_dir() {
        path.join("main.hcl")
    } else {
        path.to_path_buf()
    };
    let base = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut visited = Vec::new();
    load_file(loader, &path, &base, &mut visited)
}

fn label<'a>(blk: &'a hcl::Block, idx: usize, what: &str) -> Result<&'a str> {
    blk.labels()
        .get(idx)
        .map(|l| l.as_str())
        .ok_or_else(|| anyhow::anyhow!("{} block missing {} label", blk.identifier(), what))
}

/// Accepts both `provider = aws.west` and the older `provider = "aws.west"`.
fn provider_ref(expr: &hcl::Expression) -> Result<ProviderConfig> {
    let raw = match expr {
        hcl::Expression::String(s) => s.clone(),
        hcl::Expression::Variable(v) => v.as_str().to_string(),
        hcl::Expression::Traversal(tr) => {
            let hcl::Expression::Variable(root) = &tr.expr else {
                bail!("provider argument must be a provider reference");
            };
            let mut raw = root.as_str().to_string();
            for op in &tr.operators {
                let hcl::TraversalOperator::GetAttr(name) = op else {
                    bail!("provider argument must be a provider reference");
                };
                raw.push('.');
                raw.push_str(name.as_str());
            }
            raw
        }
        _ => bail!("provider argument must be a provider reference"),
    };
    let parts: Vec<&str> = raw.split('.').collect();
    match parts.as_slice() {
        [ty] if is_valid_identifier(ty) => Ok(ProviderConfig::new(*ty)),
        [ty, alias] if is_valid_identifier(ty) && is_valid_identifier(alias) => {
            Ok(ProviderConfig::with_alias(*ty, *alias))
        }
        _ => bail!("invalid provider reference {raw:?}: expected <type> or <type>.<alias>"),
    }
}

fn parse_resource(blk: &hcl::Block, mode: ResourceMode) -> Result<ResourceConfig> {
    let type_name = label(blk, 0, "type")?;
    let name = label(blk, 1, "name")?;
    let body = blk.body();
    let mut rc = ResourceConfig::new(mode, type_name, name);
    if let Some(attr) = find_attr(body, "provider") {
        rc.provider_ref = Some(
            provider_ref(attr.expr())
                .with_context(|| format!("resource {type_name}.{name}"))?,
        );
    }
    rc.count = find_attr(body, "count").map(|a| a.expr().clone());
    rc.for_each = find_attr(body, "for_each").map(|a| a.expr().clone());
    if rc.count.is_some() && rc.for_each.is_some() {
        bail!("resource {type_name}.{name}: cannot use both for_each and count on the same block");
    }
    Ok(rc)
}

fn load_file(
    loader: &dyn Loader,
    path: &Path,
    base: &Path,
    visited: &mut Vec<PathBuf>,
) -> Result<Config> {
    let abspath = path
        .absolutize()
        .map_err(|e| anyhow::anyhow!("absolutize error: {e}"))?
        .to_path_buf();
    if visited.contains(&abspath) {
        bail!("module cycle detected at {}", abspath.display());
    }
    visited.push(abspath.clone());
    debug!("loading configuration from {}", abspath.display());

    let content = loader
        .load(path)
        .with_context(|| format!("reading HCL file {}", path.display()))?;
    let body: hcl::Body =
        hcl::from_str(&content).with_context(|| format!("parsing HCL in {}", path.display()))?;

    let mut cfg = Config::default();
    cfg.module.source_dir = base.display().to_string();

    for blk in body.blocks().filter(|b| b.identifier() == "locals") {
        for attr in blk.body().attributes() {
            let name = attr.key().to_string();
            if cfg.module.locals.contains_key(&name) {
                bail!("duplicate local value '{}' in {}", name, path.display());
            }
            cfg.module.locals.insert(
                name.clone(),
                Local {
                    name,
                    expr: attr.expr().clone(),
                },
            );
        }
    }

    for blk in body.blocks().filter(|b| b.identifier() == "resource") {
        cfg.module.add_resource(parse_resource(blk, ResourceMode::Managed)?);
    }

    for blk in body.blocks().filter(|b| b.identifier() == "data") {
        cfg.module.add_resource(parse_resource(blk, ResourceMode::Data)?);
    }

    for blk in body.blocks().filter(|b| b.identifier() == "module") {
        let name = label(blk, 0, "name")?.to_string();
        let source = match find_attr(blk.body(), "source").map(|a| a.expr()) {
            Some(hcl::Expression::String(s)) => s.clone(),
            Some(_) => bail!("module '{}': 'source' must be a literal string", name),
            None => bail!("module '{}' missing 'source'", name),
        };
        let module_path = resolve_module_path(base, &source);
        let child = load_file(loader, &module_path.join("main.hcl"), &module_path, visited)
            .with_context(|| format!("loading module '{}' from {}", name, module_path.display()))?;
        cfg.children.insert(name.clone(), child);
        cfg.module
            .module_calls
            .insert(name.clone(), ModuleCall { name, source });
    }

    visited.pop();
    Ok(cfg)
}
