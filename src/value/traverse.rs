use thiserror::Error;

use super::{Type, Value, ValueKind};

/// One trailing step of a reference after its address part, such as the
/// `.id` in `aws_instance.web.id` or the `[0]` in `local.names[0]`.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalStep {
    GetAttr(String),
    Index(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{summary}: {detail}")]
pub struct TraverseError {
    pub summary: String,
    pub detail: String,
}

impl TraverseError {
    fn new(summary: &str, detail: impl Into<String>) -> Self {
        TraverseError {
            summary: summary.to_string(),
            detail: detail.into(),
        }
    }
}

impl Value {
    /// Applies each step in order. Unknown values yield unknowns of the
    /// narrowest type the step allows.
    pub fn traverse(&self, steps: &[TraversalStep]) -> Result<Value, TraverseError> {
        let mut current = self.clone();
        for step in steps {
            current = match step {
                TraversalStep::GetAttr(name) => current.get_attr(name)?,
                TraversalStep::Index(key) => current.index(key)?,
            };
        }
        Ok(current)
    }

    pub fn get_attr(&self, name: &str) -> Result<Value, TraverseError> {
        if self.is_null() {
            return Err(TraverseError::new(
                "Attempt to get attribute from null value",
                format!("This value is null, so it does not have any attribute named {name:?}."),
            ));
        }
        if !self.is_known() {
            return match self.ty() {
                Type::Object(attrs) => attrs
                    .get(name)
                    .map(|aty| Value::unknown(aty.clone()))
                    .ok_or_else(|| unsupported_attribute(name)),
                Type::Map(ety) => Ok(Value::unknown((**ety).clone())),
                Type::Dynamic => Ok(Value::dynamic()),
                other => Err(not_an_object(other)),
            };
        }
        match self.kind() {
            ValueKind::Object(attrs) => attrs.get(name).cloned().ok_or_else(|| unsupported_attribute(name)),
            ValueKind::Map(elems) => elems.get(name).cloned().ok_or_else(|| missing_key(name)),
            _ => Err(not_an_object(self.ty())),
        }
    }

    pub fn index(&self, key: &Value) -> Result<Value, TraverseError> {
        if self.is_null() {
            return Err(TraverseError::new(
                "Attempt to index null value",
                "This value is null, so it does not have any indices.",
            ));
        }
        if !self.is_known() || !key.is_known() {
            return match self.ty() {
                Type::List(ety) | Type::Map(ety) | Type::Set(ety) => Ok(Value::unknown((**ety).clone())),
                Type::Tuple(etys) => match key.as_number().and_then(|n| n.as_u64()) {
                    Some(i) => etys
                        .get(i as usize)
                        .map(|ety| Value::unknown(ety.clone()))
                        .ok_or_else(|| out_of_range(i, etys.len())),
                    None => Ok(Value::dynamic()),
                },
                Type::Object(attrs) => match key.as_str() {
                    Some(name) => attrs
                        .get(name)
                        .map(|aty| Value::unknown(aty.clone()))
                        .ok_or_else(|| unsupported_attribute(name)),
                    None => Ok(Value::dynamic()),
                },
                _ => Ok(Value::dynamic()),
            };
        }
        match self.kind() {
            ValueKind::List(items) | ValueKind::Tuple(items) => {
                let i = key
                    .as_number()
                    .and_then(|n| n.as_u64())
                    .ok_or_else(|| {
                        TraverseError::new(
                            "Invalid index",
                            "A sequence can only be indexed by a whole non-negative number.",
                        )
                    })?;
                items
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| out_of_range(i, items.len()))
            }
            ValueKind::Map(elems) | ValueKind::Object(elems) => {
                let name = key.as_str().ok_or_else(|| {
                    TraverseError::new("Invalid index", "A map or object can only be indexed by a string.")
                })?;
                elems.get(name).cloned().ok_or_else(|| missing_key(name))
            }
            ValueKind::Set(_) => Err(TraverseError::new(
                "Invalid index",
                "Elements of a set are identified only by their value and don't have any separate index or key to select with, so it's only possible to perform operations across all elements of the set.",
            )),
            _ => Err(TraverseError::new(
                "Invalid index",
                format!("This value does not have any indices: it is of type {}.", self.ty().friendly_name()),
            )),
        }
    }
}

fn unsupported_attribute(name: &str) -> TraverseError {
    TraverseError::new(
        "Unsupported attribute",
        format!("This object does not have an attribute named {name:?}."),
    )
}

fn missing_key(name: &str) -> TraverseError {
    TraverseError::new(
        "Invalid index",
        format!("The given key does not identify an element in this collection value: {name:?}."),
    )
}

fn out_of_range(i: u64, len: usize) -> TraverseError {
    TraverseError::new(
        "Invalid index",
        format!("The given index {i} is out of range for a sequence of {len} elements."),
    )
}

fn not_an_object(ty: &Type) -> TraverseError {
    TraverseError::new(
        "Unsupported attribute",
        format!("Can't access attributes on a value of type {}.", ty.friendly_name()),
    )
}
