use log::{debug, trace};

use super::{describe_module, EvaluationStateData};
use crate::addrs::{
    AbsProviderConfig, AddrError, InstanceKey, Resource, ResourceInstance, ResourceMode,
};
use crate::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use crate::flatmap::{value_from_flatmap, Flatmap};
use crate::schema::Block;
use crate::states::ResourceState;
use crate::suggest::name_suggestion;
use crate::value::{Type, Value};

/// One instance's data, copied out so decoding runs without the state lock.
struct InstanceSnapshot {
    attributes: Flatmap,
    raw_provider: String,
    provider: Result<AbsProviderConfig, AddrError>,
}

impl InstanceSnapshot {
    fn of(rs: &ResourceState) -> Option<Self> {
        rs.primary.as_ref().map(|is| InstanceSnapshot {
            attributes: is.attributes.clone(),
            raw_provider: rs.provider.clone(),
            provider: rs.provider_addr(),
        })
    }
}

enum StateRead {
    Primary(InstanceSnapshot),
    /// Keyed instance with no state yet.
    Pending,
    /// Unkeyed reference with no exact entry: every `.N` instance, ascending.
    All(Vec<(usize, Option<InstanceSnapshot>)>),
}

impl EvaluationStateData<'_> {
    pub(super) fn resource_instance(
        &self,
        addr: &ResourceInstance,
        rng: &SourceRange,
    ) -> (Value, Diagnostics) {
        let mut diags = Diagnostics::new();
        let value = match self.read_instances(addr) {
            StateRead::Primary(snap) => self.decode_instance(addr, &snap, rng, &mut diags),
            StateRead::Pending => self.pending_instance(&addr.resource),
            StateRead::All(instances) => {
                self.all_instances(&addr.resource, instances, rng, &mut diags)
            }
        };
        (value, diags)
    }

    fn read_instances(&self, addr: &ResourceInstance) -> StateRead {
        trace!("acquiring state read lock for {addr}");
        let state = self.evaluator.state.read();
        let Some(ms) = state.module_by_path(&self.module_path) else {
            return match addr.key {
                InstanceKey::NoKey => StateRead::All(Vec::new()),
                _ => StateRead::Pending,
            };
        };

        let primary = addr
            .legacy_state_key()
            .and_then(|key| ms.resources.get(&key))
            .and_then(InstanceSnapshot::of);
        if let Some(snap) = primary {
            return StateRead::Primary(snap);
        }
        if addr.key != InstanceKey::NoKey {
            return StateRead::Pending;
        }

        let prefix = format!("{}.", addr.resource.legacy_state_prefix());
        let mut instances: Vec<(usize, Option<InstanceSnapshot>)> = ms
            .resources
            .iter()
            .filter_map(|(key, rs)| {
                let idx = key.strip_prefix(&prefix)?.parse::<usize>().ok()?;
                Some((idx, InstanceSnapshot::of(rs)))
            })
            .collect();
        instances.sort_by_key(|(idx, _)| *idx);
        StateRead::All(instances)
    }

    fn resource_schema(&self, resource: &Resource, provider: &AbsProviderConfig) -> Option<Block> {
        trace!("acquiring schema lock for {provider}");
        self.evaluator
            .provider_schemas
            .resource_schema(provider, resource.mode, &resource.type_name)
    }

    fn decode_instance(
        &self,
        addr: &ResourceInstance,
        snap: &InstanceSnapshot,
        rng: &SourceRange,
        diags: &mut Diagnostics,
    ) -> Value {
        let provider = match &snap.provider {
            Ok(provider) => provider.clone(),
            Err(_) => {
                diags.push(Diagnostic::error(
                    "Invalid provider address in state",
                    format!(
                        "The state for the referenced resource refers to a syntactically-invalid provider address {:?}. This can occur if the state data is incorrectly edited by hand.",
                        snap.raw_provider
                    ),
                    rng,
                ));
                return Value::dynamic();
            }
        };
        let Some(schema) = self.resource_schema(&addr.resource, &provider) else {
            diags.push(Diagnostic::error(
                "Missing resource type schema",
                format!("No schema is available for {addr} in {provider}. This is a bug and should be reported."),
                rng,
            ));
            return Value::dynamic();
        };

        let ty = schema.implied_type();
        debug!("decoding {addr} from {} state attributes", snap.attributes.len());
        match value_from_flatmap(&snap.attributes, &ty) {
            Ok(value) => value,
            Err(err) => {
                diags.push(Diagnostic::error(
                    "Invalid resource instance data in state",
                    format!("The state for {addr} could not be decoded: {err}."),
                    rng,
                ));
                Value::unknown(ty)
            }
        }
    }

    /// Typed unknown for an instance that has not been created yet. Falls
    /// back to an untyped unknown when configuration or schema are missing,
    /// as happens for orphaned resources.
    fn pending_instance(&self, resource: &Resource) -> Value {
        let cfg = self.module_config("reference to instance");
        let Some(rc) = cfg.module.resource_by_addr(resource) else {
            return Value::dynamic();
        };
        let provider = rc.provider_config_addr().absolute(&self.module_path);
        match self.resource_schema(resource, &provider) {
            Some(schema) => Value::unknown(schema.implied_type()),
            None => Value::dynamic(),
        }
    }

    fn all_instances(
        &self,
        resource: &Resource,
        instances: Vec<(usize, Option<InstanceSnapshot>)>,
        rng: &SourceRange,
        diags: &mut Diagnostics,
    ) -> Value {
        let cfg = self.module_config("reference to resource");
        let rc = cfg.module.resource_by_addr(resource);
        let configured_type = rc.and_then(|rc| {
            let provider = rc.provider_config_addr().absolute(&self.module_path);
            self.resource_schema(resource, &provider)
                .map(|schema| schema.implied_type())
        });

        if instances.is_empty() {
            let Some(rc) = rc else {
                let names = cfg.module.resource_names(resource.mode, &resource.type_name);
                let suggestion = name_suggestion(&resource.name, &names)
                    .map(|s| format!(" Did you mean {s:?}?"))
                    .unwrap_or_default();
                let kind = match resource.mode {
                    ResourceMode::Managed => "managed",
                    ResourceMode::Data => "data",
                };
                diags.push(Diagnostic::error(
                    "Reference to undeclared resource",
                    format!(
                        "A {kind} resource {:?} {:?} has not been declared in {}.{suggestion}",
                        resource.type_name,
                        resource.name,
                        describe_module(&self.module_path)
                    ),
                    rng,
                ));
                return Value::dynamic();
            };
            let Some(ty) = configured_type else {
                return Value::dynamic();
            };
            return if rc.count.is_some() {
                Value::unknown(Type::list(ty))
            } else if rc.for_each.is_some() {
                Value::unknown(Type::map(ty))
            } else {
                Value::unknown(ty)
            };
        }

        // Indexes past this are treated as tampering rather than gaps.
        let configured_count = rc.and_then(|rc| literal_count(rc.count.as_ref()?));
        let limit = instances.len().saturating_add(configured_count.unwrap_or(0));
        let mut decoded: Vec<Option<Value>> = Vec::with_capacity(instances.len());
        for (idx, snap) in instances {
            let key = match i64::try_from(idx) {
                Ok(key) if idx < limit => key,
                _ => {
                    diags.push(Diagnostic::error(
                        "Invalid resource instance data in state",
                        format!(
                            "The state for {resource} has an instance at index {idx}, which is out of range for {limit} instance(s). This can occur if the state data is incorrectly edited by hand."
                        ),
                        rng,
                    ));
                    continue;
                }
            };
            if decoded.len() <= idx {
                decoded.resize(idx + 1, None);
            }
            let Some(snap) = snap else { continue };
            let addr = resource.instance(InstanceKey::Int(key));
            decoded[idx] = Some(self.decode_instance(&addr, &snap, rng, diags));
        }

        let ety = configured_type
            .or_else(|| {
                decoded
                    .iter()
                    .flatten()
                    .map(|v| v.ty().clone())
                    .find(|ty| *ty != Type::Dynamic)
            })
            .unwrap_or(Type::Dynamic);
        let elems: Vec<Value> = decoded
            .into_iter()
            .map(|v| v.unwrap_or_else(|| Value::unknown(ety.clone())))
            .collect();
        if elems.iter().all(|v| *v.ty() == ety) {
            Value::list(ety, elems)
        } else {
            Value::tuple(elems)
        }
    }
}

/// `count` as written, when it is a non-negative integer literal.
fn literal_count(expr: &hcl::Expression) -> Option<usize> {
    match expr {
        hcl::Expression::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        _ => None,
    }
}
