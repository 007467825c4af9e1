//! Identifier resolution
//!
//! A selector names message fields by path: `temperature`, `sensor.id`,
//! `readings[2]` or `readings.2`. Resolvers map such a path to a scalar
//! `Value`, or to `Value::Absent` when the field is missing or not scalar.

mod path;


use ahash::AHashMap;
use compact_str::CompactString;

pub use path::{parse_path, PathSegment};

use crate::selector::Value;

/// Lookup of identifier values during selector evaluation
pub trait IdentifierResolver {
    /// Resolve a field path to a scalar value
    fn resolve(&self, path: &str) -> Value;

    /// Raw payload for parser extensions, if the resolver has one
    fn opaque_data(&self) -> Option<&[u8]> {
        None
    }
}

impl<T: IdentifierResolver + ?Sized> IdentifierResolver for &T {
    fn resolve(&self, path: &str) -> Value {
        (**self).resolve(path)
    }

    fn opaque_data(&self) -> Option<&[u8]> {
        (**self).opaque_data()
    }
}

/// Resolves paths inside a parsed JSON document
#[derive(Debug, Clone, Copy)]
pub struct JsonResolver<'a> {
    value: &'a serde_json::Value,
}

impl<'a> JsonResolver<'a> {
    pub fn new(value: &'a serde_json::Value) -> Self {
        Self { value }
    }

    /// Resolver rooted at a direct child; numeric keys index arrays
    pub fn child(&self, key: &str) -> Option<JsonResolver<'a>> {
        let segment = match key.parse::<usize>() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::Key(key.into()),
        };
        step(self.value, &segment).map(JsonResolver::new)
    }

    /// Walk a full path; `None` if any segment is missing
    pub fn nested(&self, path: &str) -> Option<&'a serde_json::Value> {
        let segments = parse_path(path)?;
        segments
            .iter()
            .try_fold(self.value, |node, segment| step(node, segment))
    }

    pub fn value(&self) -> &'a serde_json::Value {
        self.value
    }
}

fn step<'a>(node: &'a serde_json::Value, segment: &PathSegment) -> Option<&'a serde_json::Value> {
    match (node, segment) {
        (serde_json::Value::Object(map), PathSegment::Key(key)) => map.get(key.as_str()),
        (serde_json::Value::Object(map), PathSegment::Index(index)) => {
            map.get(index.to_string().as_str())
        }
        (serde_json::Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}

/// Scalar conversion of a JSON node
pub fn json_scalar(node: &serde_json::Value) -> Value {
    match node {
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Absent, Value::Float),
        },
        serde_json::Value::String(s) => Value::Text(s.as_str().into()),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            Value::Absent
        }
    }
}

impl IdentifierResolver for JsonResolver<'_> {
    fn resolve(&self, path: &str) -> Value {
        self.nested(path).map_or(Value::Absent, json_scalar)
    }
}

/// Flat map of named values, e.g. message headers
#[derive(Debug, Clone, Default)]
pub struct HeaderResolver {
    headers: AHashMap<CompactString, Value>,
}

impl HeaderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<CompactString>, value: impl Into<Value>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl IdentifierResolver for HeaderResolver {
    fn resolve(&self, path: &str) -> Value {
        self.headers.get(path).cloned().unwrap_or_default()
    }
}

impl<K: Into<CompactString>, V: Into<Value>> FromIterator<(K, V)> for HeaderResolver {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
