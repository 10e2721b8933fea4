//! Dynamic values carrying their own structural [`Type`].
//!
//! Every value is either known, null-of-type or unknown-of-type. Keeping the
//! type on null and unknown values means `null` of `list(string)` and `null`
//! of `string` stay distinguishable for downstream type checking.

mod traverse;
mod ty;

pub use traverse::{TraversalStep, TraverseError};
pub use ty::{Type, TypeParseError};

use hcl::Number;
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel string the legacy encoding uses for "computed, not known yet".
pub const UNKNOWN_VARIABLE_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

#[derive(Debug, Clone)]
pub struct Value {
    ty: Type,
    kind: ValueKind,
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    Null,
    Unknown,
    String(String),
    Number(Number),
    Bool(bool),
    Object(BTreeMap<String, Value>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value {
            ty: Type::String,
            kind: ValueKind::String(s.into()),
        }
    }

    pub fn number(n: impl Into<Number>) -> Value {
        Value {
            ty: Type::Number,
            kind: ValueKind::Number(n.into()),
        }
    }

    pub fn bool(b: bool) -> Value {
        Value {
            ty: Type::Bool,
            kind: ValueKind::Bool(b),
        }
    }

    pub fn object<I, K>(attrs: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let attrs: BTreeMap<String, Value> =
            attrs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let ty = Type::Object(
            attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.ty.clone()))
                .collect(),
        );
        Value {
            ty,
            kind: ValueKind::Object(attrs),
        }
    }

    pub fn empty_object() -> Value {
        Value::object(Vec::<(String, Value)>::new())
    }

    pub fn tuple(elems: Vec<Value>) -> Value {
        Value {
            ty: Type::Tuple(elems.iter().map(|v| v.ty.clone()).collect()),
            kind: ValueKind::Tuple(elems),
        }
    }

    /// A list whose elements all conform to `ety`. An empty `elems` yields
    /// an explicitly typed empty list.
    pub fn list(ety: Type, elems: Vec<Value>) -> Value {
        Value {
            ty: Type::list(ety),
            kind: ValueKind::List(elems),
        }
    }

    /// A set of `ety`; raw-equal duplicates are dropped.
    pub fn set(ety: Type, elems: Vec<Value>) -> Value {
        let mut unique: Vec<Value> = Vec::with_capacity(elems.len());
        for v in elems {
            if !unique.iter().any(|u| u.raw_equals(&v)) {
                unique.push(v);
            }
        }
        Value {
            ty: Type::set(ety),
            kind: ValueKind::Set(unique),
        }
    }

    pub fn map(ety: Type, elems: BTreeMap<String, Value>) -> Value {
        Value {
            ty: Type::map(ety),
            kind: ValueKind::Map(elems),
        }
    }

    pub fn null(ty: Type) -> Value {
        Value {
            ty,
            kind: ValueKind::Null,
        }
    }

    pub fn unknown(ty: Type) -> Value {
        Value {
            ty,
            kind: ValueKind::Unknown,
        }
    }

    /// Unknown value of unknown type.
    pub fn dynamic() -> Value {
        Value::unknown(Type::Dynamic)
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self.kind, ValueKind::Unknown)
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match &self.kind {
            ValueKind::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ValueKind::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Number of elements (collections, tuples) or attributes (objects).
    pub fn len(&self) -> Option<usize> {
        match &self.kind {
            ValueKind::Object(m) | ValueKind::Map(m) => Some(m.len()),
            ValueKind::Tuple(v) | ValueKind::List(v) | ValueKind::Set(v) => Some(v.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Exact structural equality, including type and null/unknown markers.
    /// Set elements are compared without regard to order.
    pub fn raw_equals(&self, other: &Value) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.kind, &other.kind) {
            (ValueKind::Null, ValueKind::Null) | (ValueKind::Unknown, ValueKind::Unknown) => true,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::Number(a), ValueKind::Number(b)) => a == b,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Object(a), ValueKind::Object(b)) | (ValueKind::Map(a), ValueKind::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.raw_equals(vb))
            }
            (ValueKind::Tuple(a), ValueKind::Tuple(b)) | (ValueKind::List(a), ValueKind::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.raw_equals(y))
            }
            (ValueKind::Set(a), ValueKind::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.raw_equals(y)))
            }
            _ => false,
        }
    }

    /// Converts a value from the legacy untyped representation kept in state
    /// for local values.
    pub fn from_legacy(v: &hcl::Value) -> Value {
        match v {
            hcl::Value::Null => Value::null(Type::Dynamic),
            hcl::Value::String(s) if s == UNKNOWN_VARIABLE_VALUE => Value::dynamic(),
            hcl::Value::String(s) => Value::string(s.clone()),
            hcl::Value::Number(n) => Value::number(n.clone()),
            hcl::Value::Bool(b) => Value::bool(*b),
            hcl::Value::Array(items) => Value::tuple(items.iter().map(Value::from_legacy).collect()),
            hcl::Value::Object(attrs) => Value::object(
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_legacy(v))),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equals(other)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Unknown => write!(f, "(known after apply)"),
            ValueKind::String(s) => write!(f, "{s:?}"),
            ValueKind::Number(n) => write!(f, "{n}"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Tuple(items) | ValueKind::List(items) | ValueKind::Set(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            ValueKind::Object(attrs) | ValueKind::Map(attrs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in attrs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {k:?} = {v}")?;
                }
                if !attrs.is_empty() {
                    write!(f, " ")?;
                }
                write!(f, "}}")
            }
        }
    }
}
