//! Weakly typed structural decoding of [`Value`] trees.
//!
//! [`from_value`] drives any `serde::Deserialize` target from a subtree of
//! the loaded view. Input is weakly typed: numeric strings coerce to
//! numbers, `"true"`/`"false"` to bools, scalars to strings and single
//! values to one-element sequences. Errors carry the dot-separated path
//! and the concrete kind of the offending leaf.

use std::fmt;

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};
use serde::forward_to_deserialize_any;

use crate::error::ConfigError;
use crate::value::{Map, Value};

/// Decode `value` (found at `path`) into `T`.
pub fn from_value<T: DeserializeOwned>(value: &Value, path: &str) -> Result<T, ConfigError> {
    T::deserialize(ValueDeserializer::new(value, path)).map_err(DecodeError::into_config_error)
}

/// Error produced while decoding; converted to [`ConfigError::DecodeMismatch`].
#[derive(Debug, Clone)]
pub struct DecodeError {
    path: Option<String>,
    kind: Option<&'static str>,
    message: String,
}

impl DecodeError {
    fn mismatch(path: &str, value: &Value, expected: &str) -> Self {
        DecodeError {
            path: Some(path.to_string()),
            kind: Some(value.kind()),
            message: format!("expected {expected}"),
        }
    }

    /// Fill in location details the visitor could not know.
    fn locate(mut self, path: &str, value: &Value) -> Self {
        if self.path.is_none() {
            self.path = Some(path.to_string());
        }
        if self.kind.is_none() {
            self.kind = Some(value.kind());
        }
        self
    }

    fn into_config_error(self) -> ConfigError {
        ConfigError::DecodeMismatch {
            path: self.path.unwrap_or_default(),
            kind: self.kind.unwrap_or("unknown").to_string(),
            message: self.message,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DecodeError {}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        DecodeError {
            path: None,
            kind: None,
            message: msg.to_string(),
        }
    }
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" | "TRUE" | "True" | "t" | "T" | "1" => Some(true),
        "false" | "FALSE" | "False" | "f" | "F" | "0" | "" => Some(false),
        _ => None,
    }
}

// 2^63 and 2^64 are exact in f64; anything at or past them saturates on `as`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

fn whole_i64(x: f64) -> Option<i64> {
    (x.is_finite() && x.fract() == 0.0 && x >= -I64_BOUND && x < I64_BOUND).then(|| x as i64)
}

fn whole_u64(x: f64) -> Option<u64> {
    (x.is_finite() && x.fract() == 0.0 && x >= 0.0 && x < U64_BOUND).then(|| x as u64)
}

/// Serde deserializer over a borrowed [`Value`].
#[derive(Debug, Clone)]
pub struct ValueDeserializer<'a> {
    value: &'a Value,
    path: String,
}

impl<'a> ValueDeserializer<'a> {
    /// Deserializer rooted at `value`, reporting errors relative to `path`.
    pub fn new(value: &'a Value, path: impl Into<String>) -> Self {
        Self {
            value,
            path: path.into(),
        }
    }

    fn mismatch(&self, expected: &str) -> DecodeError {
        DecodeError::mismatch(&self.path, self.value, expected)
    }

    fn as_i64(&self) -> Result<i64, DecodeError> {
        match self.value {
            Value::Int(i) => Ok(*i),
            Value::Float(x) => whole_i64(*x).ok_or_else(|| self.mismatch("an integer")),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_i64))
                    .ok_or_else(|| self.mismatch("an integer"))
            }
            _ => Err(self.mismatch("an integer")),
        }
    }

    fn as_u64(&self) -> Result<u64, DecodeError> {
        match self.value {
            Value::Float(x) => whole_u64(*x).ok_or_else(|| self.mismatch("an unsigned integer")),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_u64))
                    .ok_or_else(|| self.mismatch("an unsigned integer"))
            }
            _ => {
                let signed = self.as_i64()?;
                u64::try_from(signed).map_err(|_| self.mismatch("an unsigned integer"))
            }
        }
    }

    fn as_f64(&self) -> Result<f64, DecodeError> {
        match self.value {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(x) => Ok(*x),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.mismatch("a number")),
            _ => Err(self.mismatch("a number")),
        }
    }

    fn as_string(&self) -> Result<String, DecodeError> {
        match self.value {
            Value::String(s) => Ok(s.clone()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => Ok(self.value.to_string()),
            Value::Bytes(b) => {
                String::from_utf8(b.clone()).map_err(|_| self.mismatch("a UTF-8 string"))
            }
            Value::Null => Ok(String::new()),
            _ => Err(self.mismatch("a string")),
        }
    }

    fn empty_map() -> &'static Map {
        static EMPTY: Map = Map::new();
        &EMPTY
    }
}

macro_rules! deserialize_signed {
    ($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                let v = self.as_i64()?;
                let narrowed = <$ty>::try_from(v).map_err(|_| self.mismatch(stringify!($ty)))?;
                visitor.$visit(narrowed).map_err(|e: DecodeError| e.locate(&self.path, self.value))
            }
        )*
    };
}

macro_rules! deserialize_unsigned {
    ($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                let v = self.as_u64()?;
                let narrowed = <$ty>::try_from(v).map_err(|_| self.mismatch(stringify!($ty)))?;
                visitor.$visit(narrowed).map_err(|e: DecodeError| e.locate(&self.path, self.value))
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for ValueDeserializer<'a> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let result = match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(*b),
            Value::Int(i) => visitor.visit_i64(*i),
            Value::Float(x) => visitor.visit_f64(*x),
            Value::String(s) => visitor.visit_str(s),
            Value::Bytes(b) => visitor.visit_bytes(b),
            Value::Seq(items) => visitor.visit_seq(SeqDeserializer::new(items, &self.path)),
            Value::Map(map) => visitor.visit_map(MapDeserializer::new(map, &self.path)),
        };
        result.map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let b = match self.value {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::String(s) => parse_bool(s).ok_or_else(|| self.mismatch("a bool"))?,
            Value::Null => false,
            _ => return Err(self.mismatch("a bool")),
        };
        visitor.visit_bool(b).map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    deserialize_signed! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
    }

    deserialize_unsigned! {
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let x = self.as_f64()?;
        visitor
            .visit_f32(x as f32)
            .map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let x = self.as_f64()?;
        visitor.visit_f64(x).map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_string(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            Value::String(s) => visitor
                .visit_str(s)
                .map_err(|e: DecodeError| e.locate(&self.path, self.value)),
            _ => self.deserialize_string(visitor),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let s = self.as_string()?;
        visitor
            .visit_string(s)
            .map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let result = match self.value {
            Value::Bytes(b) => visitor.visit_bytes(b),
            Value::String(s) => visitor.visit_bytes(s.as_bytes()),
            Value::Seq(items) => visitor.visit_seq(SeqDeserializer::new(items, &self.path)),
            _ => return Err(self.mismatch("bytes")),
        };
        result.map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => {
                let path = self.path.clone();
                let value = self.value;
                visitor.visit_some(self).map_err(|e: DecodeError| e.locate(&path, value))
            }
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::String(s) if s.is_empty() => visitor.visit_unit(),
            _ => Err(self.mismatch("nothing")),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let result = match self.value {
            Value::Seq(items) => visitor.visit_seq(SeqDeserializer::new(items, &self.path)),
            Value::Null => visitor.visit_seq(SeqDeserializer::new(&[], &self.path)),
            Value::Map(_) => return Err(self.mismatch("a sequence")),
            single => visitor.visit_seq(SeqDeserializer::new(
                std::slice::from_ref(single),
                &self.path,
            )),
        };
        result.map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let result = match self.value {
            Value::Map(map) => visitor.visit_map(MapDeserializer::new(map, &self.path)),
            Value::Null => visitor.visit_map(MapDeserializer::new(Self::empty_map(), &self.path)),
            _ => return Err(self.mismatch("a map")),
        };
        result.map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let result = match self.value {
            Value::String(s) => {
                let variant: de::value::StrDeserializer<'_, DecodeError> =
                    s.as_str().into_deserializer();
                visitor.visit_enum(variant)
            }
            Value::Map(map) if map.len() == 1 => {
                let (variant, value) = map
                    .iter()
                    .next()
                    .ok_or_else(|| self.mismatch("an enum"))?;
                visitor.visit_enum(EnumDeserializer {
                    variant,
                    value,
                    path: child_path(&self.path, variant),
                })
            }
            _ => return Err(self.mismatch("an enum")),
        };
        result.map_err(|e: DecodeError| e.locate(&self.path, self.value))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

struct SeqDeserializer<'a> {
    items: std::slice::Iter<'a, Value>,
    index: usize,
    path: &'a str,
}

impl<'a> SeqDeserializer<'a> {
    fn new(items: &'a [Value], path: &'a str) -> Self {
        Self {
            items: items.iter(),
            index: 0,
            path,
        }
    }
}

impl<'de, 'a> SeqAccess<'de> for SeqDeserializer<'a> {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        let Some(item) = self.items.next() else {
            return Ok(None);
        };
        let path = format!("{}[{}]", self.path, self.index);
        self.index += 1;
        seed.deserialize(ValueDeserializer::new(item, path.clone()))
            .map(Some)
            .map_err(|e: DecodeError| e.locate(&path, item))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct MapDeserializer<'a> {
    entries: std::collections::btree_map::Iter<'a, String, Value>,
    pending: Option<(&'a String, &'a Value)>,
    path: &'a str,
}

impl<'a> MapDeserializer<'a> {
    fn new(map: &'a Map, path: &'a str) -> Self {
        Self {
            entries: map.iter(),
            pending: None,
            path,
        }
    }
}

impl<'de, 'a> MapAccess<'de> for MapDeserializer<'a> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        let Some((key, value)) = self.entries.next() else {
            return Ok(None);
        };
        self.pending = Some((key, value));
        seed.deserialize(KeyDeserializer { key }).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        let (key, value) = self
            .pending
            .take()
            .ok_or_else(|| <DecodeError as de::Error>::custom("value requested before key"))?;
        let path = child_path(self.path, key);
        seed.deserialize(ValueDeserializer::new(value, path.clone()))
            .map_err(|e: DecodeError| e.locate(&path, value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct KeyDeserializer<'a> {
    key: &'a str,
}

impl<'de, 'a> de::Deserializer<'de> for KeyDeserializer<'a> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_str(self.key)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct seq tuple tuple_struct map
        struct enum identifier ignored_any
    }
}

struct EnumDeserializer<'a> {
    variant: &'a str,
    value: &'a Value,
    path: String,
}

impl<'de, 'a> EnumAccess<'de> for EnumDeserializer<'a> {
    type Error = DecodeError;
    type Variant = VariantDeserializer<'a>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Self::Error> {
        let variant = seed.deserialize(KeyDeserializer { key: self.variant })?;
        Ok((
            variant,
            VariantDeserializer {
                value: self.value,
                path: self.path,
            },
        ))
    }
}

struct VariantDeserializer<'a> {
    value: &'a Value,
    path: String,
}

impl<'de, 'a> VariantAccess<'de> for VariantDeserializer<'a> {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<(), Self::Error> {
        match self.value {
            Value::Null => Ok(()),
            other => Err(DecodeError::mismatch(&self.path, other, "a unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, Self::Error> {
        seed.deserialize(ValueDeserializer::new(self.value, self.path))
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        de::Deserializer::deserialize_seq(ValueDeserializer::new(self.value, self.path), visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        de::Deserializer::deserialize_map(ValueDeserializer::new(self.value, self.path), visitor)
    }
}

/// Serde `with` module decoding `std::time::Duration` from human readable
/// strings (`"1h 30m"`, `"250ms"`) or whole seconds.
///
/// ```rust
/// use std::time::Duration;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Timeouts {
///     #[serde(with = "bootstrata::de::duration")]
///     read: Duration,
/// }
/// ```
pub mod duration {
    use std::time::Duration;

    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;

    /// Deserialize a duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }

    /// Serialize a duration in humantime notation.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub(super) struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a duration such as \"1h 30m\" or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            humantime::parse_duration(v.trim()).map_err(E::custom)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("negative duration"))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Duration, E> {
            Duration::try_from_secs_f64(v).map_err(E::custom)
        }
    }

    /// Same as the parent module for `Option<Duration>`.
    pub mod option {
        use std::time::Duration;

        use serde::de::{self, Deserializer, Visitor};
        use serde::Serializer;

        /// Deserialize an optional duration.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            deserializer.deserialize_option(OptionVisitor)
        }

        /// Serialize an optional duration.
        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        struct OptionVisitor;

        impl<'de> Visitor<'de> for OptionVisitor {
            type Value = Option<Duration>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an optional duration")
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
                d.deserialize_any(super::DurationVisitor).map(Some)
            }
        }
    }
}

/// Serde `with` module decoding any `FromStr` target from its text form.
pub mod from_str {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::de::{self, Deserialize, Deserializer};
    use serde::Serializer;

    /// Deserialize through `FromStr`.
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let text = String::deserialize(deserializer)?;
        text.parse::<T>().map_err(de::Error::custom)
    }

    /// Serialize through `Display`.
    pub fn serialize<S: Serializer, T: Display>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use super::*;
    use crate::error::ErrorKind;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Server {
        port: u16,
        debug: bool,
        ratio: f64,
        tags: Vec<String>,
        #[serde(with = "duration")]
        timeout: Duration,
        #[serde(default, with = "duration::option")]
        idle: Option<Duration>,
        started: DateTime<Utc>,
        #[serde(with = "from_str")]
        addr: SocketAddr,
    }

    #[test]
    fn test_weak_typing() {
        let value = yaml(
            r#"
port: "8080"
debug: "true"
ratio: "0.5"
tags: single
timeout: 1m 30s
started: "2024-05-01T10:00:00Z"
addr: "127.0.0.1:9000"
"#,
        );
        let server: Server = from_value(&value, "server").unwrap();
        assert_eq!(server.port, 8080);
        assert!(server.debug);
        assert_eq!(server.ratio, 0.5);
        assert_eq!(server.tags, vec!["single".to_string()]);
        assert_eq!(server.timeout, Duration::from_secs(90));
        assert_eq!(server.idle, None);
        assert_eq!(server.started.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(server.addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_out_of_range_floats_are_rejected() {
        let err = from_value::<i64>(&Value::Float(1e20), "n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeMismatch);
        let err = from_value::<u64>(&Value::Float(-1.0), "n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeMismatch);
        let err = from_value::<u64>(&Value::Float(1e30), "n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeMismatch);
        let err = from_value::<i64>(&Value::from("9.3e18"), "n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeMismatch);

        assert_eq!(from_value::<i64>(&Value::Float(-4096.0), "n").unwrap(), -4096);
        assert_eq!(from_value::<u64>(&Value::Float(1e19), "n").unwrap(), 10_000_000_000_000_000_000);
    }

    #[test]
    fn test_scalars_coerce_to_strings() {
        let value = yaml("a: 1\nb: true\nc: 2.5\n");
        let map: BTreeMap<String, String> = from_value(&value, "").unwrap();
        assert_eq!(map["a"], "1");
        assert_eq!(map["b"], "true");
        assert_eq!(map["c"], "2.5");
    }

    #[test]
    fn test_mismatch_reports_path_and_kind() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Logger {
            file: File,
        }
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct File {
            max_size: u32,
        }

        let value = yaml("file:\n  max_size: lots\n");
        let err = from_value::<Logger>(&value, "logger").unwrap_err();
        match err {
            ConfigError::DecodeMismatch { path, kind, .. } => {
                assert_eq!(path, "logger.file.max_size");
                assert_eq!(kind, "string");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_map_where_sequence_expected() {
        let value = yaml("items:\n  a: 1\n");
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Holder {
            items: Vec<u32>,
        }
        let err = from_value::<Holder>(&value, "").unwrap_err();
        assert!(matches!(err, ConfigError::DecodeMismatch { ref kind, .. } if kind == "map"));
    }

    #[test]
    fn test_enums() {
        #[derive(Debug, Deserialize, PartialEq)]
        #[serde(rename_all = "lowercase")]
        enum Level {
            Debug,
            Info,
        }
        let value = Value::from("debug");
        assert_eq!(from_value::<Level>(&value, "level").unwrap(), Level::Debug);
    }

    #[test]
    fn test_missing_field_is_mismatch() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            id: String,
        }
        let err = from_value::<Needs>(&Value::empty_map(), "app").unwrap_err();
        assert!(matches!(err, ConfigError::DecodeMismatch { ref path, .. } if path == "app"));
    }
}
