//! The single encode/decode boundary between structured metadata and the
//! primitive-only key/value maps the vector collection can store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Primitive-only metadata map attached to records, chunks, and results.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A metadata value the collection stores natively. Anything structured
/// (lists, nested maps) must go through [`encode_value`] and comes back as a
/// JSON string that [`MetaValue::as_json`] can recover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Decode a string value that was produced by [`encode_value`] from a
    /// list or map. Returns `None` for non-string values and strings that
    /// are not valid JSON.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            MetaValue::Str(value) => serde_json::from_str(value).ok(),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<usize> for MetaValue {
    fn from(value: usize) -> Self {
        MetaValue::Int(value as i64)
    }
}

impl From<u64> for MetaValue {
    fn from(value: u64) -> Self {
        MetaValue::Int(value as i64)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

/// Convert an arbitrary JSON value into a storable primitive. Lists and maps
/// are serialized to compact JSON strings; integral numbers stay integers.
pub fn encode_value(value: &Value) -> MetaValue {
    match value {
        Value::Bool(flag) => MetaValue::Bool(*flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                MetaValue::Int(int)
            } else {
                MetaValue::Float(number.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(text) => MetaValue::Str(text.clone()),
        Value::Null => MetaValue::Str(String::new()),
        Value::Array(_) | Value::Object(_) => {
            MetaValue::Str(serde_json::to_string(value).unwrap_or_default())
        }
    }
}

/// Sanitize a JSON object into a primitive-only [`Metadata`] map. `null`
/// entries are dropped rather than stored as empty strings.
pub fn sanitize(object: &serde_json::Map<String, Value>) -> Metadata {
    object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Equality check used by index filters: every entry in `filter` must be
/// present in `metadata` with the same value.
pub fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}
