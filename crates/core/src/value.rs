//! Value model: scalars, documents, and the index-value ordering
//!
//! This module defines:
//! - `ScalarType`: the supported index type set (six tags)
//! - `Scalar`: a single indexable value
//! - `Value`: the recursive document value taxonomy
//! - `Document`: a mapping from text keys to values
//!
//! ## Ordering rules
//!
//! A strict total order exists only between scalars of the same type tag.
//! Strings order by code-point sequence, identifiers by unsigned big-endian
//! bytes, timestamps by absolute instant. Cross-type comparison is
//! undefined and surfaces as an invalid-condition error at the query
//! boundary. NaN is disallowed everywhere, so float ordering is the plain
//! numeric order.
//!
//! `OrderedScalar` extends the same-type order to an arbitrary (but fixed)
//! order across tags so backends can key ordered maps with it. Entries of
//! one index always share a tag, so the cross-tag leg never decides a
//! range scan.

use crate::types::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// ScalarType
// =============================================================================

/// Type tag for indexable scalar values
///
/// This is the supported index type set exposed by the facade for
/// introspection. Every index derives exactly one of these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// 64-bit signed integer
    Int,
    /// 64-bit float, NaN disallowed
    Float,
    /// Boolean
    Bool,
    /// Finite text string
    Text,
    /// Opaque 128-bit identifier
    Id,
    /// Instant with nanosecond precision
    Timestamp,
}

impl ScalarType {
    /// All supported index types
    pub const ALL: [ScalarType; 6] = [
        ScalarType::Int,
        ScalarType::Float,
        ScalarType::Bool,
        ScalarType::Text,
        ScalarType::Id,
        ScalarType::Timestamp,
    ];

    /// Canonical name of this type tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Bool => "bool",
            ScalarType::Text => "text",
            ScalarType::Id => "id",
            ScalarType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Scalar
// =============================================================================

/// A single indexable value
///
/// Different type tags are never equal, even when numerically alike:
/// `Int(1) != Float(1.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float (must be finite wherever stored or indexed)
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Text string
    Text(String),
    /// 128-bit identifier
    Id(RecordId),
    /// Nanosecond instant
    Timestamp(Timestamp),
}

impl Scalar {
    /// The type tag of this scalar
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Scalar::Int(_) => ScalarType::Int,
            Scalar::Float(_) => ScalarType::Float,
            Scalar::Bool(_) => ScalarType::Bool,
            Scalar::Text(_) => ScalarType::Text,
            Scalar::Id(_) => ScalarType::Id,
            Scalar::Timestamp(_) => ScalarType::Timestamp,
        }
    }

    /// True when this scalar may be stored or used as an index value
    ///
    /// Only non-finite floats are excluded.
    pub fn is_storable(&self) -> bool {
        match self {
            Scalar::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    /// Compare against another scalar of the same type tag
    ///
    /// Returns `None` when the tags differ; the caller decides how that
    /// surfaces (the query layer raises an invalid-condition error).
    pub fn compare_same_type(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
            (Scalar::Float(a), Scalar::Float(b)) => Some(a.total_cmp(b)),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Id(a), Scalar::Id(b)) => Some(a.cmp(b)),
            (Scalar::Timestamp(a), Scalar::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Text(v) => write!(f, "{v:?}"),
            Scalar::Id(v) => write!(f, "{v}"),
            Scalar::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<RecordId> for Scalar {
    fn from(v: RecordId) -> Self {
        Scalar::Id(v)
    }
}

impl From<Timestamp> for Scalar {
    fn from(v: Timestamp) -> Self {
        Scalar::Timestamp(v)
    }
}

// =============================================================================
// OrderedScalar
// =============================================================================

/// Total-order wrapper over `Scalar` for ordered index maps
///
/// Within one tag this is exactly the same-type order above. Across tags it
/// falls back to tag rank, which backends rely on only for map hygiene;
/// every real index holds a single tag.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedScalar(pub Scalar);

impl Eq for OrderedScalar {}

impl Ord for OrderedScalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.0.compare_same_type(&other.0) {
            Some(ord) => ord,
            None => self.0.scalar_type().cmp(&other.0.scalar_type()),
        }
    }
}

impl PartialOrd for OrderedScalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// Value and Document
// =============================================================================

/// One node of a document tree
///
/// Documents are schemaless: any well-formed JSON-like tree is storable.
/// `Null` is storable in document bodies but never indexable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Explicit null
    Null,
    /// A scalar leaf
    Scalar(Scalar),
    /// An ordered sequence
    Array(Vec<Value>),
    /// A nested document
    Document(Document),
}

impl Value {
    /// The scalar inside, if this is a scalar leaf
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The nested document inside, if any
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Human-readable kind name, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Scalar(s) => s.scalar_type().as_str(),
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    fn check_storable(&self) -> Result<(), String> {
        match self {
            Value::Null => Ok(()),
            Value::Scalar(s) => {
                if s.is_storable() {
                    Ok(())
                } else {
                    Err("non-finite float".to_string())
                }
            }
            Value::Array(items) => items.iter().try_for_each(Value::check_storable),
            Value::Document(d) => d.check_storable(),
        }
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

macro_rules! value_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Scalar(v.into())
            }
        })*
    };
}

value_from_scalar!(i64, i32, f64, bool, &str, String, RecordId, Timestamp);

/// A document: mapping from text keys to values
///
/// Keys are ordered so that serialized forms are deterministic and
/// structural equality is cheap. There are no key restrictions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, Value>);

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Document(BTreeMap::new())
    }

    /// Insert a field, returning self for chaining
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the document has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Verify every float in the tree is finite
    pub fn check_storable(&self) -> Result<(), String> {
        for (key, value) in &self.0 {
            value
                .check_storable()
                .map_err(|e| format!("field {key:?}: {e}"))?;
        }
        Ok(())
    }

    /// Build a document from a JSON value
    ///
    /// The JSON root must be an object. Integers map to `Int`, other
    /// numbers to `Float`; non-finite numbers cannot appear in JSON so the
    /// result is always storable.
    pub fn from_json(json: serde_json::Value) -> Result<Self, String> {
        match value_from_json(json)? {
            Value::Document(d) => Ok(d),
            other => Err(format!("document root must be an object, got {}", other.kind())),
        }
    }

    /// Render the document as JSON
    ///
    /// Identifiers render as hyphenated UUID strings and timestamps as
    /// integer nanoseconds, so the mapping is not invertible for those two
    /// tags.
    pub fn to_json(&self) -> serde_json::Value {
        value_to_json(&Value::Document(self.clone()))
    }
}

fn value_from_json(json: serde_json::Value) -> Result<Value, String> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Scalar(Scalar::Int(i))
            } else if let Some(f) = n.as_f64() {
                Value::Scalar(Scalar::Float(f))
            } else {
                return Err(format!("unrepresentable number {n}"));
            }
        }
        serde_json::Value::String(s) => Value::Scalar(Scalar::Text(s)),
        serde_json::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(value_from_json)
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(map) => {
            let mut doc = Document::new();
            for (k, v) in map {
                doc.0.insert(k, value_from_json(v)?);
            }
            Value::Document(doc)
        }
    })
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Scalar(Scalar::Int(i)) => serde_json::json!(i),
        Value::Scalar(Scalar::Float(f)) => serde_json::json!(f),
        Value::Scalar(Scalar::Bool(b)) => serde_json::json!(b),
        Value::Scalar(Scalar::Text(s)) => serde_json::json!(s),
        Value::Scalar(Scalar::Id(id)) => serde_json::json!(id.to_string()),
        Value::Scalar(Scalar::Timestamp(t)) => serde_json::json!(t.as_nanos()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Document(d) => {
            let mut map = serde_json::Map::new();
            for (k, v) in d.iter() {
                map.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(map)
        }
    }
}
