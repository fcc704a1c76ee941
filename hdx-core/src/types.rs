use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Typed attribute value
///
/// Mirrors the HyperDex datatype set. Strings are byte strings. Values are
/// totally ordered (floats via `total_cmp`) so they can live in sets and be
/// used as map keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Byte string
    String(Bytes),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Ordered list
    List(Vec<Value>),
    /// Set of distinct values
    Set(BTreeSet<Value>),
    /// Map with typed keys
    Map(BTreeMap<Value, Value>),
}

impl Value {
    pub fn string(s: impl AsRef<[u8]>) -> Self {
        Value::String(Bytes::copy_from_slice(s.as_ref()))
    }

    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn float(f: f64) -> Self {
        Value::Float(f)
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(items.into_iter().collect())
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Map(entries.into_iter().collect())
    }

    /// Borrow the string as UTF-8, if it is a string and valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Value, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Length used by the LENGTH_* predicates
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::String(b) => Some(b.len()),
            Value::List(l) => Some(l.len()),
            Value::Set(s) => Some(s.len()),
            Value::Map(m) => Some(m.len()),
            Value::Int(_) | Value::Float(_) => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::String(_) => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::List(_) => 3,
            Value::Set(_) => 4,
            Value::Map(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Bytes::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::string(b)
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::string(b)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::String(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// A decoded row: attribute name to value
pub type Record = BTreeMap<String, Value>;

/// One named value sent with a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Value,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One flattened entry of a map operation: `name[map_key] <op> value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapAttribute {
    pub name: String,
    pub map_key: Value,
    pub value: Value,
}

impl MapAttribute {
    pub fn new(name: impl Into<String>, map_key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            map_key: map_key.into(),
            value: value.into(),
        }
    }
}

/// Builder for ordered attribute lists.
///
/// Order is preserved exactly as added; a failure reported by index refers
/// to this order.
#[derive(Debug, Clone, Default)]
pub struct AttributesBuilder {
    attrs: Vec<Attribute>,
}

impl AttributesBuilder {
    pub fn new() -> Self {
        Self { attrs: Vec::new() }
    }

    pub fn string(mut self, name: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.attrs.push(Attribute::new(name, Value::string(value)));
        self
    }

    pub fn int(mut self, name: impl Into<String>, value: i64) -> Self {
        self.attrs.push(Attribute::new(name, Value::Int(value)));
        self
    }

    pub fn float(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attrs.push(Attribute::new(name, Value::Float(value)));
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push(Attribute::new(name, value));
        self
    }

    pub fn build(self) -> Vec<Attribute> {
        self.attrs
    }
}

/// Builder that flattens per-attribute maps into `MapAttribute` entries
#[derive(Debug, Clone, Default)]
pub struct MapAttributesBuilder {
    entries: Vec<MapAttribute>,
}

impl MapAttributesBuilder {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add a single `name[map_key]` entry
    pub fn entry(
        mut self,
        name: impl Into<String>,
        map_key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Self {
        self.entries.push(MapAttribute::new(name, map_key, value));
        self
    }

    /// Add every entry of `map` under attribute `name`
    pub fn map(mut self, name: impl Into<String>, map: BTreeMap<Value, Value>) -> Self {
        let name = name.into();
        for (k, v) in map {
            self.entries.push(MapAttribute::new(name.clone(), k, v));
        }
        self
    }

    pub fn build(self) -> Vec<MapAttribute> {
        self.entries
    }
}
