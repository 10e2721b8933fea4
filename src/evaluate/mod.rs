//! Reference resolution against configuration and persisted state.
//!
//! An [`Evaluator`] holds the shared inputs of a graph walk. Each expression
//! evaluation asks it for a [`Scope`], which resolves references relative to
//! one module instance and one repetition key.

mod resources;

use log::{debug, trace};
use parking_lot::RwLock;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::addrs::{
    parse_reference, CountAttr, InputVariable, InstanceKey, LocalValue, ModuleCallInstance,
    ModuleCallOutput, ModuleInstance, PathAttr, Reference, Referenceable, ResourceInstance,
    TerraformAttr,
};
use crate::configs::Config;
use crate::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use crate::schema::SchemaCache;
use crate::states::State;
use crate::suggest::name_suggestion;
use crate::value::{Type, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkOperation {
    Validate,
    #[default]
    Plan,
    PlanDestroy,
    Refresh,
    Apply,
    Destroy,
    Import,
    Eval,
}

impl WalkOperation {
    /// Only apply and destroy walks may run functions with side effects.
    pub fn pure_only(self) -> bool {
        !matches!(self, WalkOperation::Apply | WalkOperation::Destroy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown walk operation {0:?}")]
pub struct UnknownOperation(pub String);

impl FromStr for WalkOperation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "validate" => WalkOperation::Validate,
            "plan" => WalkOperation::Plan,
            "plan_destroy" => WalkOperation::PlanDestroy,
            "refresh" => WalkOperation::Refresh,
            "apply" => WalkOperation::Apply,
            "destroy" => WalkOperation::Destroy,
            "import" => WalkOperation::Import,
            "eval" => WalkOperation::Eval,
            other => return Err(UnknownOperation(other.to_string())),
        })
    }
}

impl fmt::Display for WalkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalkOperation::Validate => "validate",
            WalkOperation::Plan => "plan",
            WalkOperation::PlanDestroy => "plan_destroy",
            WalkOperation::Refresh => "refresh",
            WalkOperation::Apply => "apply",
            WalkOperation::Destroy => "destroy",
            WalkOperation::Import => "import",
            WalkOperation::Eval => "eval",
        };
        f.write_str(name)
    }
}

/// Information about the run that is not part of configuration or state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMeta {
    /// Name of the selected workspace.
    pub env: String,
}

impl Default for ContextMeta {
    fn default() -> Self {
        ContextMeta {
            env: "default".to_string(),
        }
    }
}

/// Shared inputs for every scope created during one walk.
///
/// The state is behind a reader/writer lock and the schema cache carries its
/// own mutex. Resolution never holds the state lock while taking the schema
/// lock.
#[derive(Debug)]
pub struct Evaluator {
    pub operation: WalkOperation,
    pub meta: ContextMeta,
    pub config: Arc<Config>,
    pub provider_schemas: Arc<SchemaCache>,
    pub state: Arc<RwLock<State>>,
}

impl Evaluator {
    pub fn scope(
        &self,
        module_path: ModuleInstance,
        self_addr: Option<Referenceable>,
        key: InstanceKey,
    ) -> Scope<'_> {
        Scope {
            data: EvaluationStateData {
                evaluator: self,
                module_path,
                instance_key: key,
            },
            self_addr,
            pure_only: self.operation.pure_only(),
            base_dir: ".".to_string(),
        }
    }
}

/// One resolver per kind of referenceable object.
pub trait Data {
    fn get_count_attr(&self, addr: &CountAttr, rng: &SourceRange) -> (Value, Diagnostics);
    fn get_input_variable(&self, addr: &InputVariable, rng: &SourceRange) -> (Value, Diagnostics);
    fn get_local_value(&self, addr: &LocalValue, rng: &SourceRange) -> (Value, Diagnostics);
    fn get_module_instance(
        &self,
        addr: &ModuleCallInstance,
        rng: &SourceRange,
    ) -> (Value, Diagnostics);
    fn get_module_instance_output(
        &self,
        addr: &ModuleCallOutput,
        rng: &SourceRange,
    ) -> (Value, Diagnostics);
    fn get_path_attr(&self, addr: &PathAttr, rng: &SourceRange) -> (Value, Diagnostics);
    fn get_resource_instance(
        &self,
        addr: &ResourceInstance,
        rng: &SourceRange,
    ) -> (Value, Diagnostics);
    fn get_terraform_attr(&self, addr: &TerraformAttr, rng: &SourceRange) -> (Value, Diagnostics);
}

/// Resolves references for one module instance and repetition key.
pub struct Scope<'a> {
    pub data: EvaluationStateData<'a>,
    pub self_addr: Option<Referenceable>,
    pub pure_only: bool,
    pub base_dir: String,
}

impl Scope<'_> {
    /// Resolves the reference and then applies its trailing attribute and
    /// index steps. Problems are reported as diagnostics beside a
    /// placeholder value.
    pub fn resolve(&self, reference: &Reference) -> (Value, Diagnostics) {
        let (value, mut diags) = self.resolve_subject(&reference.subject, &reference.range);
        if reference.remaining.is_empty() {
            return (value, diags);
        }
        match value.traverse(&reference.remaining) {
            Ok(v) => (v, diags),
            Err(err) => {
                diags.push(Diagnostic::error(err.summary, err.detail, &reference.range));
                (Value::dynamic(), diags)
            }
        }
    }

    /// Parses `src` as a reference and resolves it.
    pub fn resolve_str(&self, src: &str, filename: &str) -> (Value, Diagnostics) {
        match parse_reference(src, filename) {
            Ok(reference) => self.resolve(&reference),
            Err(diags) => (Value::dynamic(), diags),
        }
    }

    fn resolve_subject(&self, subject: &Referenceable, rng: &SourceRange) -> (Value, Diagnostics) {
        debug!(
            "resolving {subject} in {}",
            describe_module(&self.data.module_path)
        );
        let data = &self.data;
        match subject {
            Referenceable::CountAttr(a) => data.get_count_attr(a, rng),
            Referenceable::InputVariable(a) => data.get_input_variable(a, rng),
            Referenceable::LocalValue(a) => data.get_local_value(a, rng),
            Referenceable::ModuleCallInstance(a) => data.get_module_instance(a, rng),
            Referenceable::ModuleCallOutput(a) => data.get_module_instance_output(a, rng),
            Referenceable::PathAttr(a) => data.get_path_attr(a, rng),
            Referenceable::ResourceInstance(a) => data.get_resource_instance(a, rng),
            Referenceable::TerraformAttr(a) => data.get_terraform_attr(a, rng),
            Referenceable::SelfRef => match &self.self_addr {
                Some(addr) if *addr != Referenceable::SelfRef => self.resolve_subject(addr, rng),
                _ => (
                    Value::dynamic(),
                    Diagnostic::error(
                        "Invalid \"self\" reference",
                        "The \"self\" object is not available in this context.",
                        rng,
                    )
                    .into(),
                ),
            },
        }
    }
}

fn describe_module(path: &ModuleInstance) -> String {
    if path.is_root() {
        "the root module".to_string()
    } else {
        path.to_string()
    }
}

/// The [`Data`] implementation backed by an [`Evaluator`].
pub struct EvaluationStateData<'a> {
    pub evaluator: &'a Evaluator,
    pub module_path: ModuleInstance,
    /// Key of the repeated object being evaluated, for `count.index`.
    pub instance_key: InstanceKey,
}

impl<'a> EvaluationStateData<'a> {
    /// # Panics
    ///
    /// Panics if the module path has no configuration. Callers only evaluate
    /// inside modules that appear in configuration.
    fn module_config(&self, what: &str) -> &'a Config {
        match self.evaluator.config.descendent_for_instance(&self.module_path) {
            Some(cfg) => cfg,
            None => panic!(
                "{what} read from {}, which has no configuration",
                describe_module(&self.module_path)
            ),
        }
    }
}

impl Data for EvaluationStateData<'_> {
    fn get_count_attr(&self, addr: &CountAttr, rng: &SourceRange) -> (Value, Diagnostics) {
        match addr.name.as_str() {
            "index" => match &self.instance_key {
                InstanceKey::Int(i) => (Value::number(*i), Diagnostics::new()),
                _ => (
                    Value::unknown(Type::Number),
                    Diagnostic::error(
                        "Reference to \"count\" in non-counted context",
                        "The \"count\" object can be used only in \"resource\" and \"data\" blocks, and only when the \"count\" argument is set.",
                        rng,
                    )
                    .into(),
                ),
            },
            _ => (
                Value::dynamic(),
                Diagnostic::error(
                    "Invalid \"count\" attribute",
                    format!(
                        "The \"count\" object does not have an attribute named {:?}. The only supported attribute is count.index, which is the index of each instance of a resource block that has the \"count\" argument set.",
                        addr.name
                    ),
                    rng,
                )
                .into(),
            ),
        }
    }

    fn get_input_variable(&self, addr: &InputVariable, _rng: &SourceRange) -> (Value, Diagnostics) {
        unimplemented!("resolving input variable var.{}", addr.name)
    }

    fn get_local_value(&self, addr: &LocalValue, rng: &SourceRange) -> (Value, Diagnostics) {
        let cfg = self.module_config("local value");
        if !cfg.module.locals.contains_key(&addr.name) {
            let names: Vec<&str> = cfg.module.locals.keys().map(String::as_str).collect();
            let suggestion = name_suggestion(&addr.name, &names)
                .map(|s| format!(" Did you mean {s:?}?"))
                .unwrap_or_default();
            return (
                Value::dynamic(),
                Diagnostic::error(
                    "Reference to undeclared local value",
                    format!(
                        "A local value with the name {:?} has not been declared.{suggestion}",
                        addr.name
                    ),
                    rng,
                )
                .into(),
            );
        }

        trace!("acquiring state read lock for local.{}", addr.name);
        let state = self.evaluator.state.read();
        let value = state
            .module_by_path(&self.module_path)
            .and_then(|ms| ms.locals.get(&addr.name))
            .map(Value::from_legacy)
            // Not evaluated yet in this walk.
            .unwrap_or_else(Value::dynamic);
        (value, Diagnostics::new())
    }

    fn get_module_instance(
        &self,
        addr: &ModuleCallInstance,
        _rng: &SourceRange,
    ) -> (Value, Diagnostics) {
        unimplemented!("resolving module instance module.{}{}", addr.call, addr.key)
    }

    fn get_module_instance_output(
        &self,
        addr: &ModuleCallOutput,
        _rng: &SourceRange,
    ) -> (Value, Diagnostics) {
        unimplemented!(
            "resolving module output module.{}{}.{}",
            addr.call.call,
            addr.call.key,
            addr.name
        )
    }

    fn get_path_attr(&self, addr: &PathAttr, rng: &SourceRange) -> (Value, Diagnostics) {
        match addr.name.as_str() {
            "cwd" => match std::env::current_dir() {
                Ok(dir) => (Value::string(dir.display().to_string()), Diagnostics::new()),
                Err(err) => (
                    Value::dynamic(),
                    Diagnostic::error(
                        "Failed to get working directory",
                        format!("The value for path.cwd cannot be determined due to a system error: {err}"),
                        rng,
                    )
                    .into(),
                ),
            },
            "module" => {
                let cfg = self.module_config("path.module");
                (Value::string(cfg.module.source_dir.clone()), Diagnostics::new())
            }
            "root" => (
                Value::string(self.evaluator.config.module.source_dir.clone()),
                Diagnostics::new(),
            ),
            other => {
                let suggestion = name_suggestion(other, &["cwd", "module", "root"])
                    .map(|s| format!(" Did you mean {s:?}?"))
                    .unwrap_or_default();
                (
                    Value::dynamic(),
                    Diagnostic::error(
                        "Invalid \"path\" attribute",
                        format!("The \"path\" object does not have an attribute named {other:?}.{suggestion}"),
                        rng,
                    )
                    .into(),
                )
            }
        }
    }

    fn get_resource_instance(
        &self,
        addr: &ResourceInstance,
        rng: &SourceRange,
    ) -> (Value, Diagnostics) {
        self.resource_instance(addr, rng)
    }

    fn get_terraform_attr(&self, addr: &TerraformAttr, rng: &SourceRange) -> (Value, Diagnostics) {
        match addr.name.as_str() {
            "workspace" => (Value::string(self.evaluator.meta.env.clone()), Diagnostics::new()),
            "env" => (
                Value::dynamic(),
                Diagnostic::error(
                    "Invalid \"terraform\" attribute",
                    "The terraform.env attribute was deprecated in v0.10 and removed in v0.12. The \"state environment\" concept was renamed to \"workspace\" in v0.12, and so the workspace name can now be accessed using the terraform.workspace attribute.",
                    rng,
                )
                .into(),
            ),
            other => (
                Value::dynamic(),
                Diagnostic::error(
                    "Invalid \"terraform\" attribute",
                    format!("The \"terraform\" object does not have an attribute named {other:?}. The only supported attribute is terraform.workspace, the name of the currently-selected workspace."),
                    rng,
                )
                .into(),
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::addrs::{AbsProviderConfig, ProviderConfig, Resource, ResourceMode};
    use crate::configs::{Local, ResourceConfig};
    use crate::schema::{Attribute, Block, ProviderSchema};
    use crate::states::{InstanceState, ModuleState, ResourceState};
    use std::collections::BTreeMap;

    pub(crate) fn instance_schema() -> Block {
        let mut block = Block::default();
        block
            .attributes
            .insert("id".into(), Attribute::computed(Type::String));
        block.attributes.insert("ami".into(), Attribute::new(Type::String));
        block
            .attributes
            .insert("cpu_count".into(), Attribute::new(Type::Number));
        block
            .attributes
            .insert("tags".into(), Attribute::new(Type::map(Type::String)));
        block
    }

    fn ami_schema() -> Block {
        let mut block = Block::default();
        block
            .attributes
            .insert("id".into(), Attribute::computed(Type::String));
        block
    }

    fn local(name: &str) -> (String, Local) {
        (
            name.to_string(),
            Local {
                name: name.to_string(),
                expr: hcl::Expression::Null,
            },
        )
    }

    fn config() -> Config {
        let mut root = Config::default();
        root.module.source_dir = "/work".into();
        root.module.locals.extend([local("names"), local("region"), local("pending")]);

        let mut web = ResourceConfig::new(ResourceMode::Managed, "aws_instance", "web");
        web.count = Some(hcl::Expression::Number(hcl::Number::from(2i64)));
        root.module.add_resource(web);
        root.module
            .add_resource(ResourceConfig::new(ResourceMode::Managed, "aws_instance", "db"));
        let mut queued = ResourceConfig::new(ResourceMode::Managed, "aws_instance", "queued");
        queued.count = Some(hcl::Expression::Number(hcl::Number::from(3i64)));
        root.module.add_resource(queued);
        let mut fleet = ResourceConfig::new(ResourceMode::Managed, "aws_instance", "fleet");
        fleet.for_each = Some(hcl::Expression::Null);
        root.module.add_resource(fleet);
        root.module
            .add_resource(ResourceConfig::new(ResourceMode::Managed, "aws_instance", "lonely"));
        root.module
            .add_resource(ResourceConfig::new(ResourceMode::Data, "aws_ami", "ubuntu"));

        let mut net = Config::default();
        net.module.source_dir = "/work/net".into();
        net.module.locals.extend([local("cidr")]);
        root.children.insert("net".into(), net);
        root
    }

    fn instance(provider: &str, attrs: &[(&str, &str)]) -> ResourceState {
        ResourceState {
            type_name: "aws_instance".into(),
            provider: provider.into(),
            primary: Some(InstanceState {
                id: attrs
                    .iter()
                    .find(|(k, _)| *k == "id")
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default(),
                attributes: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
        }
    }

    fn state() -> State {
        let mut root = ModuleState {
            path: vec!["root".into()],
            ..ModuleState::default()
        };
        root.set_local("region", hcl::Value::from("eu-west-1"));
        root.set_local(
            "names",
            hcl::Value::Array(vec![hcl::Value::from("a"), hcl::Value::from("b")]),
        );
        let resources = [
            (
                "aws_instance.db",
                instance(
                    "provider.aws",
                    &[("id", "i-db"), ("ami", "ami-1"), ("cpu_count", "4"), ("tags.%", "1"), ("tags.Name", "db")],
                ),
            ),
            ("aws_instance.web.0", instance("provider.aws", &[("id", "i-web0")])),
            ("aws_instance.web.1", instance("provider.aws", &[("id", "i-web1")])),
            ("aws_instance.tampered", instance("aws", &[("id", "i-bad")])),
            ("aws_instance.orphan", instance("provider.google", &[("id", "i-gone")])),
            ("aws_instance.broken", instance("provider.aws", &[("id", "i-x"), ("cpu_count", "lots")])),
            (
                "data.aws_ami.ubuntu",
                ResourceState {
                    type_name: "aws_ami".into(),
                    ..instance("provider.aws", &[("id", "ami-123")])
                },
            ),
        ];
        root.resources
            .extend(resources.into_iter().map(|(k, v)| (k.to_string(), v)));
        State {
            version: 3,
            modules: vec![root],
        }
    }

    pub(crate) fn schemas() -> SchemaCache {
        let cache = SchemaCache::new();
        let mut aws = ProviderSchema::default();
        aws.resource_types.insert("aws_instance".into(), instance_schema());
        aws.data_sources.insert("aws_ami".into(), ami_schema());
        cache.insert(&AbsProviderConfig::root(ProviderConfig::new("aws")), aws);
        cache
    }

    fn evaluator(operation: WalkOperation) -> Evaluator {
        Evaluator {
            operation,
            meta: ContextMeta {
                env: "staging".into(),
            },
            config: Arc::new(config()),
            provider_schemas: Arc::new(schemas()),
            state: Arc::new(RwLock::new(state())),
        }
    }

    fn eval_with_key(key: InstanceKey, src: &str) -> (Value, Diagnostics) {
        let ev = evaluator(WalkOperation::Plan);
        let scope = ev.scope(ModuleInstance::root(), None, key);
        scope.resolve_str(src, "<test>")
    }

    fn eval(src: &str) -> (Value, Diagnostics) {
        eval_with_key(InstanceKey::NoKey, src)
    }

    fn only_diag(diags: &Diagnostics) -> &Diagnostic {
        assert_eq!(diags.len(), 1, "{diags:?}");
        diags.iter().next().unwrap()
    }

    #[test]
    fn pure_only_except_apply_and_destroy() {
        let ev = evaluator(WalkOperation::Plan);
        assert!(ev.scope(ModuleInstance::root(), None, InstanceKey::NoKey).pure_only);
        for op in [WalkOperation::Apply, WalkOperation::Destroy] {
            let ev = evaluator(op);
            let scope = ev.scope(ModuleInstance::root(), None, InstanceKey::NoKey);
            assert!(!scope.pure_only);
            assert_eq!(scope.base_dir, ".");
        }
        assert!(WalkOperation::Validate.pure_only());
        assert!(WalkOperation::PlanDestroy.pure_only());
    }

    #[test]
    fn walk_operation_names() {
        assert_eq!("apply".parse::<WalkOperation>().unwrap(), WalkOperation::Apply);
        assert_eq!(
            "plan_destroy".parse::<WalkOperation>().unwrap(),
            WalkOperation::PlanDestroy
        );
        assert_eq!(WalkOperation::PlanDestroy.to_string(), "plan_destroy");
        assert!("explode".parse::<WalkOperation>().is_err());
        assert_eq!(WalkOperation::default(), WalkOperation::Plan);
    }

    #[test]
    fn count_index_with_integer_key() {
        let (v, diags) = eval_with_key(InstanceKey::Int(3), "count.index");
        assert!(diags.is_empty());
        assert_eq!(v, Value::number(3));
    }

    #[test]
    fn count_index_outside_counted_context() {
        for key in [InstanceKey::NoKey, InstanceKey::Str("a".into())] {
            let (v, diags) = eval_with_key(key, "count.index");
            assert_eq!(v, Value::unknown(Type::Number));
            assert_eq!(
                only_diag(&diags).summary,
                "Reference to \"count\" in non-counted context"
            );
        }
    }

    #[test]
    fn invalid_count_attribute() {
        let (v, diags) = eval_with_key(InstanceKey::Int(0), "count.value");
        assert_eq!(v, Value::dynamic());
        let d = only_diag(&diags);
        assert_eq!(d.summary, "Invalid \"count\" attribute");
        assert!(d.detail.contains("\"value\""));
    }

    #[test]
    fn local_values_come_from_state() {
        let (v, diags) = eval("local.region");
        assert!(diags.is_empty());
        assert_eq!(v, Value::string("eu-west-1"));

        let (v, diags) = eval("local.names[1]");
        assert!(diags.is_empty());
        assert_eq!(v, Value::string("b"));
    }

    #[test]
    fn declared_local_not_yet_evaluated_is_dynamic() {
        let (v, diags) = eval("local.pending");
        assert!(diags.is_empty());
        assert_eq!(v, Value::dynamic());

        // The child module has no state entry at all.
        let ev = evaluator(WalkOperation::Plan);
        let path = ModuleInstance::root().child("net", InstanceKey::NoKey);
        let scope = ev.scope(path, None, InstanceKey::NoKey);
        let (v, diags) = scope.resolve_str("local.cidr", "<test>");
        assert!(diags.is_empty());
        assert_eq!(v, Value::dynamic());
    }

    #[test]
    fn undeclared_local_suggests_close_name() {
        let (v, diags) = eval("local.regoin");
        assert_eq!(v, Value::dynamic());
        let d = only_diag(&diags);
        assert_eq!(d.summary, "Reference to undeclared local value");
        assert_eq!(
            d.detail,
            "A local value with the name \"regoin\" has not been declared. Did you mean \"region\"?"
        );

        let (_, diags) = eval("local.zzzzzz");
        assert_eq!(
            only_diag(&diags).detail,
            "A local value with the name \"zzzzzz\" has not been declared."
        );
    }

    #[test]
    fn local_write_back_is_visible() {
        let ev = evaluator(WalkOperation::Plan);
        let path = ModuleInstance::root().child("net", InstanceKey::NoKey);
        ev.state
            .write()
            .module_mut_or_insert(&path)
            .set_local("cidr", hcl::Value::from("10.0.0.0/16"));
        let scope = ev.scope(path, None, InstanceKey::NoKey);
        let (v, _) = scope.resolve_str("local.cidr", "<test>");
        assert_eq!(v, Value::string("10.0.0.0/16"));
    }

    #[test]
    fn legacy_unknown_local_is_dynamic() {
        let ev = evaluator(WalkOperation::Plan);
        ev.state.write().modules[0].set_local(
            "region",
            hcl::Value::from(crate::value::UNKNOWN_VARIABLE_VALUE),
        );
        let scope = ev.scope(ModuleInstance::root(), None, InstanceKey::NoKey);
        let (v, diags) = scope.resolve_str("local.region", "<test>");
        assert!(diags.is_empty());
        assert_eq!(v, Value::dynamic());
    }

    #[test]
    fn path_attributes() {
        let (v, _) = eval("path.root");
        assert_eq!(v, Value::string("/work"));

        let ev = evaluator(WalkOperation::Plan);
        let scope = ev.scope(
            ModuleInstance::root().child("net", InstanceKey::Int(0)),
            None,
            InstanceKey::NoKey,
        );
        let (v, _) = scope.resolve_str("path.module", "<test>");
        assert_eq!(v, Value::string("/work/net"));
        let (v, _) = scope.resolve_str("path.root", "<test>");
        assert_eq!(v, Value::string("/work"));

        let (v, diags) = eval("path.cwd");
        assert!(diags.is_empty());
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(v, Value::string(cwd.display().to_string()));
    }

    #[test]
    fn invalid_path_attribute_suggests() {
        let (v, diags) = eval("path.cwe");
        assert_eq!(v, Value::dynamic());
        let d = only_diag(&diags);
        assert_eq!(d.summary, "Invalid \"path\" attribute");
        assert!(d.detail.ends_with("Did you mean \"cwd\"?"));

        let (_, diags) = eval("path.xyz");
        assert!(!only_diag(&diags).detail.contains("Did you mean"));
    }

    #[test]
    fn terraform_attributes() {
        let (v, diags) = eval("terraform.workspace");
        assert!(diags.is_empty());
        assert_eq!(v, Value::string("staging"));

        let (v, diags) = eval("terraform.env");
        assert_eq!(v, Value::dynamic());
        assert!(only_diag(&diags).detail.contains("removed in v0.12"));

        let (_, diags) = eval("terraform.version");
        let d = only_diag(&diags);
        assert_eq!(d.summary, "Invalid \"terraform\" attribute");
        assert!(d.detail.contains("terraform.workspace"));
    }

    #[test]
    fn self_resolves_through_scope() {
        let ev = evaluator(WalkOperation::Plan);
        let db = Referenceable::ResourceInstance(
            Resource::managed("aws_instance", "db").instance(InstanceKey::NoKey),
        );
        let scope = ev.scope(ModuleInstance::root(), Some(db), InstanceKey::NoKey);
        let (v, diags) = scope.resolve_str("self.id", "<test>");
        assert!(diags.is_empty());
        assert_eq!(v, Value::string("i-db"));

        let (v, diags) = eval("self.id");
        assert_eq!(v, Value::dynamic());
        assert_eq!(only_diag(&diags).summary, "Invalid \"self\" reference");
    }

    #[test]
    fn traversal_errors_become_diagnostics() {
        let (v, diags) = eval("local.region.name");
        assert_eq!(v, Value::dynamic());
        let d = only_diag(&diags);
        assert_eq!(d.summary, "Unsupported attribute");
        assert_eq!(d.subject.as_ref().unwrap().filename, "<test>");
    }

    #[test]
    fn malformed_reference_is_a_diagnostic() {
        let (v, diags) = eval("aws_instance");
        assert_eq!(v, Value::dynamic());
        assert_eq!(only_diag(&diags).summary, "Invalid reference");
    }

    #[test]
    #[should_panic(expected = "not implemented")]
    fn input_variables_are_unimplemented() {
        eval("var.region");
    }

    #[test]
    #[should_panic(expected = "not implemented")]
    fn module_instances_are_unimplemented() {
        eval("module.net");
    }

    #[test]
    #[should_panic(expected = "not implemented")]
    fn module_outputs_are_unimplemented() {
        eval("module.net.vpc_id");
    }

    #[test]
    #[should_panic(expected = "module.ghost, which has no configuration")]
    fn module_without_configuration_panics() {
        let ev = evaluator(WalkOperation::Plan);
        let scope = ev.scope(
            ModuleInstance::root().child("ghost", InstanceKey::NoKey),
            None,
            InstanceKey::NoKey,
        );
        scope.resolve_str("local.anything", "<test>");
    }

    #[test]
    fn concurrent_scopes_share_one_evaluator() {
        let ev = evaluator(WalkOperation::Apply);
        let net = ModuleInstance::root().child("net", InstanceKey::NoKey);
        std::thread::scope(|s| {
            for i in 0..8i64 {
                let ev = &ev;
                s.spawn(move || {
                    let scope = ev.scope(ModuleInstance::root(), None, InstanceKey::Int(i));
                    for _ in 0..50 {
                        let (v, diags) = scope.resolve_str("aws_instance.db.id", "<test>");
                        assert!(diags.is_empty());
                        assert_eq!(v, Value::string("i-db"));
                        let (v, _) = scope.resolve_str("count.index", "<test>");
                        assert_eq!(v, Value::number(i));
                    }
                });
            }
            let net = &net;
            let ev = &ev;
            s.spawn(move || {
                for i in 0..50 {
                    ev.state
                        .write()
                        .module_mut_or_insert(net)
                        .set_local("cidr", hcl::Value::from(format!("10.{i}.0.0/16")));
                    ev.provider_schemas.insert(
                        &AbsProviderConfig::root(ProviderConfig::new("google")),
                        ProviderSchema::default(),
                    );
                }
            });
        });
        let scope = ev.scope(net, None, InstanceKey::NoKey);
        let (v, _) = scope.resolve_str("local.cidr", "<test>");
        assert_eq!(v, Value::string("10.49.0.0/16"));
        assert_eq!(ev.provider_schemas.len(), 2);
    }

    pub(crate) fn db_value() -> Value {
        Value::object([
            ("ami", Value::string("ami-1")),
            ("cpu_count", Value::number(4)),
            ("id", Value::string("i-db")),
            (
                "tags",
                Value::map(
                    Type::String,
                    BTreeMap::from([("Name".to_string(), Value::string("db"))]),
                ),
            ),
        ])
    }

    pub(crate) fn test_evaluator() -> Evaluator {
        evaluator(WalkOperation::Plan)
    }
}
