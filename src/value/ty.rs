use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Structural type descriptor for a dynamic [`super::Value`].
///
/// Types are immutable and compared structurally, so `list(string)` built in
/// two places is the same type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    String,
    Number,
    Bool,
    Object(BTreeMap<String, Type>),
    Tuple(Vec<Type>),
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    /// Placeholder for a type that is not known yet.
    Dynamic,
}

impl Type {
    pub fn object<I, K>(attrs: I) -> Type
    where
        I: IntoIterator<Item = (K, Type)>,
        K: Into<String>,
    {
        Type::Object(attrs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn empty_object() -> Type {
        Type::Object(BTreeMap::new())
    }

    pub fn list(ety: Type) -> Type {
        Type::List(Box::new(ety))
    }

    pub fn set(ety: Type) -> Type {
        Type::Set(Box::new(ety))
    }

    pub fn map(ety: Type) -> Type {
        Type::Map(Box::new(ety))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::String | Type::Number | Type::Bool)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Type::Object(_))
    }

    /// Element type of a list, set or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(ety) | Type::Set(ety) | Type::Map(ety) => Some(ety),
            _ => None,
        }
    }

    pub fn attribute_types(&self) -> Option<&BTreeMap<String, Type>> {
        match self {
            Type::Object(attrs) => Some(attrs),
            _ => None,
        }
    }

    /// Short human-readable name used in error messages.
    pub fn friendly_name(&self) -> String {
        match self {
            Type::String => "string".into(),
            Type::Number => "number".into(),
            Type::Bool => "bool".into(),
            Type::Object(_) => "object".into(),
            Type::Tuple(_) => "tuple".into(),
            Type::List(ety) => format!("list of {}", ety.friendly_name()),
            Type::Set(ety) => format!("set of {}", ety.friendly_name()),
            Type::Map(ety) => format!("map of {}", ety.friendly_name()),
            Type::Dynamic => "dynamic".into(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::String => write!(f, "string"),
            Type::Number => write!(f, "number"),
            Type::Bool => write!(f, "bool"),
            Type::Dynamic => write!(f, "any"),
            Type::List(ety) => write!(f, "list({ety})"),
            Type::Set(ety) => write!(f, "set({ety})"),
            Type::Map(ety) => write!(f, "map({ety})"),
            Type::Tuple(etys) => {
                write!(f, "tuple([")?;
                for (i, ety) in etys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ety}")?;
                }
                write!(f, "])")
            }
            Type::Object(attrs) => {
                write!(f, "object({{")?;
                for (i, (name, aty)) in attrs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} = {aty}")?;
                }
                write!(f, "}})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type expression at offset {offset}: {message}")]
pub struct TypeParseError {
    pub offset: usize,
    pub message: String,
}

impl FromStr for Type {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut p = TypeParser { src: s, pos: 0 };
        let ty = p.parse_type()?;
        p.skip_ws();
        if p.pos != s.len() {
            return Err(p.error("unexpected trailing input"));
        }
        Ok(ty)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn error(&self, message: impl Into<String>) -> TypeParseError {
        TypeParseError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), TypeParseError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn ident(&mut self) -> Result<&'a str, TypeParseError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn parse_type(&mut self) -> Result<Type, TypeParseError> {
        let start = self.pos;
        let kw = self.ident()?;
        let ty = match kw {
            "string" => Type::String,
            "number" => Type::Number,
            "bool" => Type::Bool,
            "any" => Type::Dynamic,
            "list" | "set" | "map" => {
                self.expect('(')?;
                let ety = self.parse_type()?;
                self.expect(')')?;
                match kw {
                    "list" => Type::list(ety),
                    "set" => Type::set(ety),
                    _ => Type::map(ety),
                }
            }
            "tuple" => {
                self.expect('(')?;
                self.expect('[')?;
                let mut etys = Vec::new();
                if !self.eat(']') {
                    loop {
                        etys.push(self.parse_type()?);
                        if self.eat(']') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                self.expect(')')?;
                Type::Tuple(etys)
            }
            "object" => {
                self.expect('(')?;
                self.expect('{')?;
                let mut attrs = BTreeMap::new();
                if !self.eat('}') {
                    loop {
                        let name = self.ident()?.to_string();
                        if !self.eat('=') {
                            self.expect(':')?;
                        }
                        let aty = self.parse_type()?;
                        attrs.insert(name, aty);
                        if self.eat('}') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                self.expect(')')?;
                Type::Object(attrs)
            }
            other => {
                self.pos = start;
                return Err(self.error(format!("unknown type keyword '{other}'")));
            }
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitives_and_collections() {
        assert_eq!("string".parse::<Type>().unwrap(), Type::String);
        assert_eq!("any".parse::<Type>().unwrap(), Type::Dynamic);
        assert_eq!(
            "list(set(number))".parse::<Type>().unwrap(),
            Type::list(Type::set(Type::Number))
        );
        assert_eq!(" map( bool ) ".parse::<Type>().unwrap(), Type::map(Type::Bool));
    }

    #[test]
    fn parses_structural_types() {
        let ty: Type = "object({name = string, tags = map(string), pair = tuple([string, bool])})"
            .parse()
            .unwrap();
        assert_eq!(
            ty,
            Type::object([
                ("name", Type::String),
                ("tags", Type::map(Type::String)),
                ("pair", Type::Tuple(vec![Type::String, Type::Bool])),
            ])
        );
        assert_eq!("object({})".parse::<Type>().unwrap(), Type::empty_object());
    }

    #[test]
    fn display_matches_parse_syntax() {
        let ty = Type::object([("a", Type::list(Type::String)), ("b", Type::Dynamic)]);
        assert_eq!(ty.to_string(), "object({a = list(string), b = any})");
        assert_eq!(ty.to_string().parse::<Type>().unwrap(), ty);
    }

    #[test]
    fn rejects_unknown_keywords() {
        let err = "list(strng)".parse::<Type>().unwrap_err();
        assert!(err.message.contains("strng"));
        assert!("list(string".parse::<Type>().is_err());
        assert!("string extra".parse::<Type>().is_err());
    }

    #[test]
    fn friendly_names() {
        assert_eq!(Type::list(Type::String).friendly_name(), "list of string");
        assert_eq!(Type::Dynamic.friendly_name(), "dynamic");
        assert_eq!(Type::Tuple(vec![]).friendly_name(), "tuple");
    }
}
