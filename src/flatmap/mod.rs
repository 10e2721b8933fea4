//! Decoder for the legacy "flatmap" encoding used in persisted state.
//!
//! A flatmap is a `string -> string` map where nesting is encoded in the
//! keys: object attributes and sequence elements append `.<name>` or
//! `.<index>`, lists, tuples and sets carry a `<prefix>.#` count key, and
//! maps carry a `<prefix>.%` presence key. Set elements are stored under
//! arbitrary numeric suffixes (element hashes) rather than indices.
//!
//! Decoding is always driven by a known [`Type`]; the keys of the map are
//! never used to infer structure, except that map-typed attributes collect
//! every key under their prefix.
//!
//! Maps can only hold primitive values here. The encoding cannot tell a
//! literal `.` inside a map key from nesting, so the whole remainder of the
//! key is taken as the map key and its raw string is kept as the element
//! value without conversion to the declared element type.

use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

use crate::value::{Type, Value};

pub type Flatmap = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlatmapError {
    #[error("invalid value for {key:?} in state: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("invalid count value for {prefix:?} in state: {reason}")]
    InvalidCount { prefix: String, reason: String },
    #[error("wrong number of values for {prefix:?} in state: got {got}, but need {need}")]
    WrongCount {
        prefix: String,
        got: usize,
        need: usize,
    },
    #[error("cannot decode {type_name} from flatmap")]
    UnsupportedType { type_name: String },
}

/// Decodes `m` into a value of the object type `ty`.
///
/// # Panics
///
/// Panics if `ty` is not an object type. That is a caller error: flatmaps
/// are always rooted at an object.
pub fn value_from_flatmap(m: &Flatmap, ty: &Type) -> Result<Value, FlatmapError> {
    let Some(attrs) = ty.attribute_types() else {
        panic!("value_from_flatmap called on {}", ty.friendly_name());
    };
    debug!("decoding flatmap with {} keys as {}", m.len(), ty);
    decode_object(m, "", attrs)
}

/// Decodes the value rooted at `key`. `key` is empty for the root object.
pub fn decode_value(m: &Flatmap, key: &str, ty: &Type) -> Result<Value, FlatmapError> {
    match ty {
        Type::String | Type::Number | Type::Bool => decode_primitive(m, key, ty),
        Type::Object(attrs) => decode_object(m, &nested_prefix(key), attrs),
        Type::Tuple(etys) => decode_tuple(m, &nested_prefix(key), etys),
        Type::List(ety) => decode_list(m, &nested_prefix(key), ety),
        Type::Set(ety) => decode_set(m, &nested_prefix(key), ety),
        Type::Map(ety) => decode_map(m, &nested_prefix(key), ety),
        Type::Dynamic => Err(FlatmapError::UnsupportedType {
            type_name: ty.friendly_name(),
        }),
    }
}

fn nested_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}.")
    }
}

/// An absent key decodes to null: "not set" is distinct from "".
pub fn decode_primitive(m: &Flatmap, key: &str, ty: &Type) -> Result<Value, FlatmapError> {
    let Some(raw) = m.get(key) else {
        return Ok(Value::null(ty.clone()));
    };
    match ty {
        Type::String => Ok(Value::string(raw.clone())),
        Type::Bool => match raw.as_str() {
            "true" | "1" => Ok(Value::bool(true)),
            "false" | "0" => Ok(Value::bool(false)),
            _ => Err(FlatmapError::InvalidValue {
                key: key.to_string(),
                reason: "a bool is required".into(),
            }),
        },
        Type::Number => parse_number(raw)
            .map(Value::number)
            .ok_or_else(|| FlatmapError::InvalidValue {
                key: key.to_string(),
                reason: "a number is required".into(),
            }),
        other => Err(FlatmapError::UnsupportedType {
            type_name: other.friendly_name(),
        }),
    }
}

fn parse_number(raw: &str) -> Option<hcl::Number> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(hcl::Number::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Some(hcl::Number::from(u));
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => hcl::Number::from_f64(f),
        _ => None,
    }
}

pub fn decode_object(
    m: &Flatmap,
    prefix: &str,
    attrs: &BTreeMap<String, Type>,
) -> Result<Value, FlatmapError> {
    let mut vals = BTreeMap::new();
    for (name, aty) in attrs {
        let val = decode_value(m, &format!("{prefix}{name}"), aty)?;
        vals.insert(name.clone(), val);
    }
    Ok(Value::object(vals))
}

fn parse_count(m: &Flatmap, prefix: &str) -> Result<Option<usize>, FlatmapError> {
    let Some(raw) = m.get(&format!("{prefix}#")) else {
        return Ok(None);
    };
    raw.parse::<usize>()
        .map(Some)
        .map_err(|e| FlatmapError::InvalidCount {
            prefix: prefix.to_string(),
            reason: e.to_string(),
        })
}

pub fn decode_tuple(m: &Flatmap, prefix: &str, etys: &[Type]) -> Result<Value, FlatmapError> {
    let Some(count) = parse_count(m, prefix)? else {
        return Ok(Value::null(Type::Tuple(etys.to_vec())));
    };
    if count != etys.len() {
        return Err(FlatmapError::WrongCount {
            prefix: prefix.to_string(),
            got: count,
            need: etys.len(),
        });
    }
    let mut vals = Vec::with_capacity(etys.len());
    for (i, ety) in etys.iter().enumerate() {
        vals.push(decode_value(m, &format!("{prefix}{i}"), ety)?);
    }
    Ok(Value::tuple(vals))
}

/// Elements are read at indices `0..count`; keys beyond the count are ignored.
/// A count larger than the whole map cannot describe real elements.
pub fn decode_list(m: &Flatmap, prefix: &str, ety: &Type) -> Result<Value, FlatmapError> {
    let Some(count) = parse_count(m, prefix)? else {
        return Ok(Value::null(Type::list(ety.clone())));
    };
    if count > m.len() {
        return Err(FlatmapError::InvalidCount {
            prefix: prefix.to_string(),
            reason: format!("count {count} exceeds the {} stored keys", m.len()),
        });
    }
    let mut vals = Vec::with_capacity(count);
    for i in 0..count {
        vals.push(decode_value(m, &format!("{prefix}{i}"), ety)?);
    }
    Ok(Value::list(ety.clone(), vals))
}

/// The count only signals presence; elements are found by scanning for
/// every distinct key segment under the prefix other than `#`.
pub fn decode_set(m: &Flatmap, prefix: &str, ety: &Type) -> Result<Value, FlatmapError> {
    if parse_count(m, prefix)?.is_none() {
        return Ok(Value::null(Type::set(ety.clone())));
    }
    let segments: BTreeSet<&str> = m
        .keys()
        .filter_map(|k| k.strip_prefix(prefix))
        .map(|rest| rest.split_once('.').map_or(rest, |(seg, _)| seg))
        .filter(|seg| !seg.is_empty() && *seg != "#")
        .collect();
    let mut vals = Vec::with_capacity(segments.len());
    for seg in segments {
        vals.push(decode_value(m, &format!("{prefix}{seg}"), ety)?);
    }
    Ok(Value::set(ety.clone(), vals))
}

/// See the module docs for why elements keep their raw string form.
pub fn decode_map(m: &Flatmap, prefix: &str, ety: &Type) -> Result<Value, FlatmapError> {
    if !m.contains_key(&format!("{prefix}%")) {
        return Ok(Value::null(Type::map(ety.clone())));
    }
    let vals: BTreeMap<String, Value> = m
        .iter()
        .filter_map(|(k, raw)| {
            let key = k.strip_prefix(prefix)?;
            (!key.is_empty() && key != "%").then(|| (key.to_string(), Value::string(raw.clone())))
        })
        .collect();
    if vals.is_empty() {
        return Ok(Value::map(ety.clone(), vals));
    }
    Ok(Value::map(Type::String, vals))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fm(pairs: &[(&str, &str)]) -> Flatmap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn obj(name: &str, ty: Type) -> Type {
        Type::object([(name, ty)])
    }

    #[test]
    fn empty_and_ignored_keys() {
        let ty = Type::empty_object();
        assert_eq!(
            value_from_flatmap(&fm(&[]), &ty).unwrap(),
            Value::empty_object()
        );
        assert_eq!(
            value_from_flatmap(&fm(&[("ignored", "foo")]), &ty).unwrap(),
            Value::empty_object()
        );
    }

    #[test]
    fn primitives_convert_from_strings() {
        let m = fm(&[("foo", "blah"), ("bar", "true"), ("baz", "12.5")]);
        let ty = Type::object([
            ("foo", Type::String),
            ("bar", Type::Bool),
            ("baz", Type::Number),
        ]);
        let got = value_from_flatmap(&m, &ty).unwrap();
        let want = Value::object([
            ("foo", Value::string("blah")),
            ("bar", Value::bool(true)),
            ("baz", Value::number(hcl::Number::from_f64(12.5).unwrap())),
        ]);
        assert_eq!(got, want);
    }

    #[test]
    fn absent_primitive_is_null_not_empty() {
        let ty = Type::object([("a", Type::String), ("b", Type::String)]);
        let got = value_from_flatmap(&fm(&[("b", "")]), &ty).unwrap();
        assert_eq!(
            got,
            Value::object([
                ("a", Value::null(Type::String)),
                ("b", Value::string("")),
            ])
        );
    }

    #[test]
    fn unparsable_primitive_names_the_key() {
        let ty = obj("port", Type::Number);
        let err = value_from_flatmap(&fm(&[("port", "eighty")]), &ty).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for \"port\" in state: a number is required"
        );
    }

    #[test]
    fn nested_object_missing_leaves_are_null() {
        let ty = obj("net", Type::object([("ip", Type::String), ("mtu", Type::Number)]));
        let got = value_from_flatmap(&fm(&[("net.ip", "10.0.0.1")]), &ty).unwrap();
        let want = Value::object([(
            "net",
            Value::object([
                ("ip", Value::string("10.0.0.1")),
                ("mtu", Value::null(Type::Number)),
            ]),
        )]);
        assert_eq!(got, want);
    }

    #[test]
    fn list_counts() {
        let ty = obj("foo", Type::list(Type::String));
        assert_eq!(
            value_from_flatmap(&fm(&[("foo.#", "0")]), &ty).unwrap(),
            Value::object([("foo", Value::list(Type::String, vec![]))])
        );
        assert_eq!(
            value_from_flatmap(&fm(&[]), &ty).unwrap(),
            Value::object([("foo", Value::null(Type::list(Type::String)))])
        );
        assert_eq!(
            value_from_flatmap(&fm(&[("foo.#", "1"), ("foo.0", "hello")]), &ty).unwrap(),
            Value::object([("foo", Value::list(Type::String, vec![Value::string("hello")]))])
        );
    }

    #[test]
    fn list_ignores_keys_past_count() {
        let ty = obj("foo", Type::list(Type::Bool));
        let m = fm(&[
            ("foo.#", "2"),
            ("foo.0", "true"),
            ("foo.1", "false"),
            ("foo.2", "ignored"),
        ]);
        assert_eq!(
            value_from_flatmap(&m, &ty).unwrap(),
            Value::object([(
                "foo",
                Value::list(Type::Bool, vec![Value::bool(true), Value::bool(false)])
            )])
        );
    }

    #[test]
    fn list_of_objects() {
        let ety = Type::object([("name", Type::String)]);
        let ty = obj("disks", Type::list(ety.clone()));
        let m = fm(&[("disks.#", "2"), ("disks.0.name", "a"), ("disks.1.name", "b")]);
        let got = value_from_flatmap(&m, &ty).unwrap();
        let want = Value::object([(
            "disks",
            Value::list(
                ety,
                vec![
                    Value::object([("name", Value::string("a"))]),
                    Value::object([("name", Value::string("b"))]),
                ],
            ),
        )]);
        assert_eq!(got, want);
    }

    #[test]
    fn invalid_count_is_an_error() {
        let ty = obj("foo", Type::list(Type::String));
        let err = value_from_flatmap(&fm(&[("foo.#", "x")]), &ty).unwrap_err();
        assert!(matches!(err, FlatmapError::InvalidCount { ref prefix, .. } if prefix == "foo."));
    }

    #[test]
    fn list_count_beyond_stored_keys_is_rejected() {
        let ty = obj("foo", Type::list(Type::String));
        let err = value_from_flatmap(&fm(&[("foo.#", "9999999999")]), &ty).unwrap_err();
        assert!(matches!(
            err,
            FlatmapError::InvalidCount { ref prefix, ref reason }
                if prefix == "foo." && reason.contains("9999999999")
        ));

        let m = fm(&[("foo.#", "2"), ("foo.0", "a")]);
        assert_eq!(
            value_from_flatmap(&m, &ty).unwrap(),
            Value::object([(
                "foo",
                Value::list(Type::String, vec![Value::string("a"), Value::null(Type::String)])
            )])
        );
    }

    #[test]
    fn tuple_fills_missing_leaves_with_nulls() {
        let ty = obj("foo", Type::Tuple(vec![Type::String, Type::Bool]));
        let m = fm(&[("foo.#", "2"), ("foo.0", "hello")]);
        assert_eq!(
            value_from_flatmap(&m, &ty).unwrap(),
            Value::object([(
                "foo",
                Value::tuple(vec![Value::string("hello"), Value::null(Type::Bool)])
            )])
        );
    }

    #[test]
    fn tuple_arity_mismatch_is_an_error() {
        let ty = obj("foo", Type::Tuple(vec![Type::String, Type::Bool]));
        let err = value_from_flatmap(&fm(&[("foo.#", "1"), ("foo.0", "hello")]), &ty).unwrap_err();
        assert_eq!(
            err,
            FlatmapError::WrongCount {
                prefix: "foo.".into(),
                got: 1,
                need: 2
            }
        );
    }

    #[test]
    fn sets_ignore_element_key_names() {
        let ty = obj("foo", Type::set(Type::String));
        assert_eq!(
            value_from_flatmap(&fm(&[("foo.#", "0")]), &ty).unwrap(),
            Value::object([("foo", Value::set(Type::String, vec![]))])
        );
        let m = fm(&[("foo.#", "1"), ("foo.24534534", "hello")]);
        assert_eq!(
            value_from_flatmap(&m, &ty).unwrap(),
            Value::object([("foo", Value::set(Type::String, vec![Value::string("hello")]))])
        );
    }

    #[test]
    fn sets_deduplicate_regardless_of_suffixes() {
        let ty = obj("foo", Type::set(Type::Bool));
        let want = Value::object([(
            "foo",
            Value::set(Type::Bool, vec![Value::bool(true), Value::bool(false)]),
        )]);
        let a = fm(&[
            ("foo.#", "1"),
            ("foo.24534534", "true"),
            ("foo.95645644", "true"),
            ("foo.34533452", "false"),
        ]);
        let b = fm(&[("foo.#", "2"), ("foo.9", "false"), ("foo.1", "true")]);
        assert_eq!(value_from_flatmap(&a, &ty).unwrap(), want);
        assert_eq!(value_from_flatmap(&b, &ty).unwrap(), want);
    }

    #[test]
    fn set_of_objects_groups_by_element_segment() {
        let ety = Type::object([("port", Type::Number), ("proto", Type::String)]);
        let ty = obj("ingress", Type::set(ety.clone()));
        let m = fm(&[
            ("ingress.#", "2"),
            ("ingress.1111.port", "22"),
            ("ingress.1111.proto", "tcp"),
            ("ingress.2222.port", "53"),
            ("ingress.2222.proto", "udp"),
        ]);
        let got = value_from_flatmap(&m, &ty).unwrap();
        let want = Value::object([(
            "ingress",
            Value::set(
                ety,
                vec![
                    Value::object([("port", Value::number(53)), ("proto", Value::string("udp"))]),
                    Value::object([("port", Value::number(22)), ("proto", Value::string("tcp"))]),
                ],
            ),
        )]);
        assert_eq!(got, want);
    }

    #[test]
    fn maps_keep_dotted_keys_and_raw_strings() {
        let ty = obj("foo", Type::map(Type::String));
        assert_eq!(
            value_from_flatmap(&fm(&[("foo.%", "0")]), &ty).unwrap(),
            Value::object([("foo", Value::map(Type::String, BTreeMap::new()))])
        );

        let ty = obj("foo", Type::map(Type::Bool));
        let m = fm(&[("foo.%", "0"), ("foo.baz", "true"), ("foo.bar.baz", "false")]);
        let want = Value::object([(
            "foo",
            Value::map(
                Type::String,
                BTreeMap::from([
                    ("baz".to_string(), Value::string("true")),
                    ("bar.baz".to_string(), Value::string("false")),
                ]),
            ),
        )]);
        assert_eq!(value_from_flatmap(&m, &ty).unwrap(), want);
    }

    #[test]
    fn absent_map_is_null() {
        let ty = obj("tags", Type::map(Type::String));
        assert_eq!(
            value_from_flatmap(&fm(&[("tags.Name", "x")]), &ty).unwrap(),
            Value::object([("tags", Value::null(Type::map(Type::String)))])
        );
    }

    #[test]
    fn dynamic_attribute_is_unsupported() {
        let ty = obj("blob", Type::Dynamic);
        let err = value_from_flatmap(&fm(&[("blob", "x")]), &ty).unwrap_err();
        assert_eq!(err.to_string(), "cannot decode dynamic from flatmap");
    }

    #[test]
    fn first_error_wins() {
        let ty = Type::object([("a", Type::Number), ("b", Type::Bool)]);
        let err = value_from_flatmap(&fm(&[("a", "x"), ("b", "y")]), &ty).unwrap_err();
        assert!(matches!(err, FlatmapError::InvalidValue { ref key, .. } if key == "a"));
    }

    #[test]
    #[should_panic(expected = "value_from_flatmap called on list of string")]
    fn non_object_root_panics() {
        let _ = value_from_flatmap(&fm(&[]), &Type::list(Type::String));
    }
}
