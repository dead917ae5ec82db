//! The merged configuration tree.
//!
//! A [`Value`] is a recursive sum type: maps, sequences, scalars and byte
//! strings. Maps are ordered (`BTreeMap`) so the canonical rendering of a
//! tree is deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{ConfigError, ConfigResult};

/// Ordered map node of the configuration tree.
pub type Map = BTreeMap<String, Value>;

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Explicit null / empty leaf
    #[default]
    Null,
    /// Boolean leaf
    Bool(bool),
    /// Signed integer leaf
    Int(i64),
    /// Floating point leaf
    Float(f64),
    /// String leaf
    String(String),
    /// Opaque byte-string leaf
    Bytes(Vec<u8>),
    /// Homogeneous sequence; replaced wholesale on merge
    Seq(Vec<Value>),
    /// Interior mapping; deep merged
    Map(Map),
}

impl Value {
    /// An empty map node.
    pub fn empty_map() -> Self {
        Value::Map(Map::new())
    }

    /// Short name of the node's concrete kind, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
        }
    }

    /// Returns the map if this node is one.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the string if this node is a string leaf.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// True for `Null`, empty strings, empty sequences and empty maps.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Seq(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Deep merge `overlay` into `self`.
    ///
    /// Maps union their keys and recurse; every other pairing is replaced
    /// by the overlay. Sequences are never concatenated.
    pub fn merge(&mut self, overlay: Value) {
        match (self, overlay) {
            (Value::Map(base), Value::Map(over)) => {
                for (key, value) in over {
                    match base.get_mut(&key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
            }
            (slot, over) => *slot = over,
        }
    }

    /// Walk a dot-separated path. The empty path names `self`.
    pub fn lookup(&self, path: &str) -> ConfigResult<&Value> {
        let mut current = self;
        let mut walked = String::new();
        for segment in split_path(path) {
            let map = match current {
                Value::Map(map) => map,
                _ => return Err(ConfigError::PathNotMap(walked_or_root(&walked))),
            };
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
            current = map
                .get(segment)
                .ok_or_else(|| ConfigError::KeyNotFound(walked.clone()))?;
        }
        Ok(current)
    }

    /// Build a nested map holding `leaf` at `path`.
    pub fn nest(path: &[&str], leaf: Value) -> Value {
        path.iter().rev().fold(leaf, |inner, segment| {
            let mut map = Map::new();
            map.insert((*segment).to_string(), inner);
            Value::Map(map)
        })
    }

    /// Canonical JSON rendering: sorted keys, no insignificant whitespace.
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn walked_or_root(walked: &str) -> String {
    if walked.is_empty() {
        "<root>".to_string()
    } else {
        walked.to_string()
    }
}

/// Split a dot-separated path into non-empty segments.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str(""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Seq(_) | Value::Map(_) => f.write_str(&self.to_canonical_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any configuration value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Seq(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = Map::new();
        while let Some((key, value)) = access.next_entry::<Value, Value>()? {
            map.insert(key.to_string(), value);
        }
        Ok(Value::Map(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_deep_merge_maps_and_replace_leaves() {
        let mut base = map(&[
            ("level", "info".into()),
            ("tags", Value::Seq(vec!["a".into(), "b".into()])),
            ("file", map(&[("path", "/var/log/a".into())])),
        ]);
        let overlay = map(&[
            ("tags", Value::Seq(vec!["c".into()])),
            ("file", map(&[("compress", true.into())])),
        ]);
        base.merge(overlay);

        assert_eq!(base.lookup("level").unwrap(), &Value::from("info"));
        assert_eq!(
            base.lookup("tags").unwrap(),
            &Value::Seq(vec!["c".into()])
        );
        assert_eq!(base.lookup("file.path").unwrap(), &Value::from("/var/log/a"));
        assert_eq!(base.lookup("file.compress").unwrap(), &Value::Bool(true));
    }

    #[test]
    fn test_scalar_overwrites_map() {
        let mut base = map(&[("logger", map(&[("level", "info".into())]))]);
        base.merge(map(&[("logger", "off".into())]));
        assert_eq!(base.lookup("logger").unwrap(), &Value::from("off"));
    }

    #[test]
    fn test_lookup_errors() {
        let tree = map(&[("app", map(&[("id", "svc".into())]))]);

        assert!(matches!(
            tree.lookup("app.name"),
            Err(ConfigError::KeyNotFound(p)) if p == "app.name"
        ));
        assert!(matches!(
            tree.lookup("app.id.inner"),
            Err(ConfigError::PathNotMap(p)) if p == "app.id"
        ));
        assert_eq!(tree.lookup("").unwrap(), &tree);
    }

    #[test]
    fn test_nest() {
        let nested = Value::nest(&["logger", "level"], "warn".into());
        assert_eq!(nested.lookup("logger.level").unwrap(), &Value::from("warn"));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let tree = map(&[
            ("b", Value::Int(1)),
            ("a", map(&[("z", true.into()), ("y", Value::Null)])),
        ]);
        assert_eq!(tree.to_canonical_json(), r#"{"a":{"y":null,"z":true},"b":1}"#);
    }

    #[test]
    fn test_deserialize_from_json() {
        let value: Value = serde_json::from_str(r#"{"a":[1,2.5,"x",null]}"#).unwrap();
        assert_eq!(
            value.lookup("a").unwrap(),
            &Value::Seq(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::from("x"),
                Value::Null
            ])
        );
    }
}
