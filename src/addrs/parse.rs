use hcl::{Expression, TraversalOperator};

use super::{
    AddrError, CountAttr, InputVariable, InstanceKey, LocalValue, ModuleCallInstance,
    ModuleCallOutput, ModuleInstance, PathAttr, Referenceable, Resource, TerraformAttr,
};
use crate::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use crate::value::{TraversalStep, Value};

/// A reference found in an expression: the object it addresses plus any
/// attribute or index steps that follow the address.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub subject: Referenceable,
    pub range: SourceRange,
    pub remaining: Vec<TraversalStep>,
}

enum Op {
    Attr(String),
    Key(InstanceKey),
}

fn invalid(detail: impl Into<String>, rng: &SourceRange) -> Diagnostics {
    Diagnostic::error("Invalid reference", detail, rng).into()
}

fn parse_expression(src: &str) -> Result<Expression, String> {
    let body: hcl::Body = hcl::from_str(&format!("ref = {src}")).map_err(|e| e.to_string())?;
    let mut structures = body.into_iter();
    match (structures.next(), structures.next()) {
        (Some(hcl::Structure::Attribute(attr)), None) if attr.key() == "ref" => Ok(attr.expr),
        (_, Some(_)) => Err("unexpected content after the reference".to_string()),
        _ => Err("missing expression".to_string()),
    }
}

fn index_key(expr: &Expression) -> Option<InstanceKey> {
    match expr {
        Expression::Number(n) => n.as_i64().map(InstanceKey::Int),
        Expression::String(s) => Some(InstanceKey::Str(s.clone())),
        _ => None,
    }
}

fn flatten(expr: &Expression, rng: &SourceRange) -> Result<(String, Vec<Op>), Diagnostics> {
    let (root, operators): (&str, &[TraversalOperator]) = match expr {
        Expression::Variable(v) => (v.as_str(), &[]),
        Expression::Traversal(tr) => match &tr.expr {
            Expression::Variable(v) => (v.as_str(), tr.operators.as_slice()),
            _ => return Err(invalid("A reference must begin with a name.", rng)),
        },
        _ => return Err(invalid("Only a reference to a named object is allowed here.", rng)),
    };
    let mut ops = Vec::with_capacity(operators.len());
    for op in operators {
        ops.push(match op {
            TraversalOperator::GetAttr(name) => Op::Attr(name.as_str().to_string()),
            TraversalOperator::LegacyIndex(i) => Op::Key(InstanceKey::Int(
                i64::try_from(*i).map_err(|_| invalid(format!("Index {i} is out of range."), rng))?,
            )),
            TraversalOperator::Index(e) => Op::Key(index_key(e).ok_or_else(|| {
                invalid("Index keys in a reference must be number or string literals.", rng)
            })?),
            _ => return Err(invalid("Splat operators are not supported in references.", rng)),
        });
    }
    Ok((root.to_string(), ops))
}

fn remaining_steps(ops: impl Iterator<Item = Op>) -> Vec<TraversalStep> {
    ops.map(|op| match op {
        Op::Attr(name) => TraversalStep::GetAttr(name),
        Op::Key(InstanceKey::Int(i)) => TraversalStep::Index(Value::number(i)),
        Op::Key(InstanceKey::Str(s)) => TraversalStep::Index(Value::string(s)),
        Op::Key(InstanceKey::NoKey) => TraversalStep::Index(Value::dynamic()),
    })
    .collect()
}

fn attr_name(
    ops: &mut std::iter::Peekable<std::vec::IntoIter<Op>>,
    root: &str,
    rng: &SourceRange,
) -> Result<String, Diagnostics> {
    match ops.next() {
        Some(Op::Attr(name)) => Ok(name),
        _ => Err(invalid(
            format!("The {root:?} object cannot be accessed directly. Instead, access one of its attributes."),
            rng,
        )),
    }
}

fn next_key(ops: &mut std::iter::Peekable<std::vec::IntoIter<Op>>) -> InstanceKey {
    match ops.next_if(|op| matches!(op, Op::Key(_))) {
        Some(Op::Key(key)) => key,
        _ => InstanceKey::NoKey,
    }
}

/// Parses `src` (for instance `aws_instance.web[0].id`) into a reference.
/// `filename` labels the source range attached to diagnostics.
pub fn parse_reference(src: &str, filename: &str) -> Result<Reference, Diagnostics> {
    let rng = SourceRange::for_snippet(filename, src);
    let expr = parse_expression(src)
        .map_err(|e| invalid(format!("The reference {src:?} is not a valid expression: {e}"), &rng))?;
    let (root, ops) = flatten(&expr, &rng)?;
    let mut ops = ops.into_iter().peekable();

    let subject = match root.as_str() {
        "count" => Referenceable::CountAttr(CountAttr {
            name: attr_name(&mut ops, &root, &rng)?,
        }),
        "var" => Referenceable::InputVariable(InputVariable {
            name: attr_name(&mut ops, &root, &rng)?,
        }),
        "local" => Referenceable::LocalValue(LocalValue {
            name: attr_name(&mut ops, &root, &rng)?,
        }),
        "path" => Referenceable::PathAttr(PathAttr {
            name: attr_name(&mut ops, &root, &rng)?,
        }),
        "terraform" => Referenceable::TerraformAttr(TerraformAttr {
            name: attr_name(&mut ops, &root, &rng)?,
        }),
        "self" => Referenceable::SelfRef,
        "module" => {
            let call = attr_name(&mut ops, &root, &rng)?;
            let call = ModuleCallInstance {
                call,
                key: next_key(&mut ops),
            };
            match ops.next() {
                Some(Op::Attr(name)) => Referenceable::ModuleCallOutput(ModuleCallOutput { call, name }),
                Some(Op::Key(_)) => {
                    return Err(invalid("A module call instance can have only one key.", &rng))
                }
                None => Referenceable::ModuleCallInstance(call),
            }
        }
        "data" => {
            let type_name = attr_name(&mut ops, &root, &rng).map_err(|_| {
                invalid("The \"data\" object must be followed by two attribute names: the data source type and the resource name.", &rng)
            })?;
            let name = match ops.next() {
                Some(Op::Attr(name)) => name,
                _ => {
                    return Err(invalid(
                        "The \"data\" object must be followed by two attribute names: the data source type and the resource name.",
                        &rng,
                    ))
                }
            };
            let key = next_key(&mut ops);
            Referenceable::ResourceInstance(Resource::data(type_name, name).instance(key))
        }
        type_name => {
            let name = match ops.next() {
                Some(Op::Attr(name)) => name,
                _ => {
                    return Err(invalid(
                        "A reference to a resource type must be followed by at least one attribute access, specifying the resource name.",
                        &rng,
                    ))
                }
            };
            let key = next_key(&mut ops);
            Referenceable::ResourceInstance(Resource::managed(type_name, name).instance(key))
        }
    };

    Ok(Reference {
        subject,
        range: rng,
        remaining: remaining_steps(ops),
    })
}

/// Parses a module instance path such as `module.net[0].module.dns`.
/// The empty string is the root module.
pub fn parse_module_instance(src: &str) -> Result<ModuleInstance, AddrError> {
    let src = src.trim();
    if src.is_empty() {
        return Ok(ModuleInstance::root());
    }
    let fail = |reason: &str| AddrError::InvalidModulePath {
        path: src.to_string(),
        reason: reason.to_string(),
    };
    let rng = SourceRange::for_snippet("<module>", src);
    let expr = parse_expression(src).map_err(|e| fail(&e))?;
    let (root, ops) = flatten(&expr, &rng).map_err(|_| fail("unsupported syntax"))?;
    if root != "module" {
        return Err(fail("must start with \"module.\""));
    }

    let mut path = ModuleInstance::root();
    let mut ops = ops.into_iter().peekable();
    loop {
        let Some(Op::Attr(name)) = ops.next() else {
            return Err(fail("expected a module name"));
        };
        path = path.child(name, next_key(&mut ops));
        match ops.next() {
            None => return Ok(path),
            Some(Op::Attr(kw)) if kw == "module" => continue,
            _ => return Err(fail("expected \".module\" between steps")),
        }
    }
}
