use chrono::{DateTime, Utc};
use serde::Serialize;

/// Declared type of a property
///
/// Scalar types hold a `Value`; `Model` and `Collection` mark properties whose
/// slot owns a child instance or a child collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Text,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    Model,
    Collection,
}

impl DataType {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, DataType::Model | DataType::Collection)
    }

    /// Check a value against this type, widening integers to decimals
    ///
    /// Returns the value to store, or `None` when the value does not fit.
    /// `Null` fits every scalar type.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) if self.is_scalar() => Some(Value::Null),
            (DataType::Text, v @ Value::Text(_)) => Some(v),
            (DataType::Integer, v @ Value::Integer(_)) => Some(v),
            (DataType::Decimal, v @ Value::Decimal(_)) => Some(v),
            (DataType::Decimal, Value::Integer(i)) => Some(Value::Decimal(i as f64)),
            (DataType::Boolean, v @ Value::Bool(_)) => Some(v),
            (DataType::DateTime, v @ Value::DateTime(_)) => Some(v),
            _ => None,
        }
    }

    /// Convert a JSON value coming from a transfer object
    pub fn from_json(&self, json: &serde_json::Value) -> Option<Value> {
        match (self, json) {
            (_, serde_json::Value::Null) => Some(Value::Null),
            (DataType::Text, serde_json::Value::String(s)) => Some(Value::Text(s.clone())),
            (DataType::Integer, serde_json::Value::Number(n)) => n.as_i64().map(Value::Integer),
            (DataType::Decimal, serde_json::Value::Number(n)) => n.as_f64().map(Value::Decimal),
            (DataType::Boolean, serde_json::Value::Bool(b)) => Some(Value::Bool(*b)),
            (DataType::DateTime, serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Text => "text",
            DataType::Integer => "integer",
            DataType::Decimal => "decimal",
            DataType::Boolean => "boolean",
            DataType::DateTime => "datetime",
            DataType::Model => "model",
            DataType::Collection => "collection",
        };
        f.write_str(s)
    }
}

/// Scalar property value
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or text that is empty after trimming
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and decimals
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short type label used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::DateTime(_) => "datetime",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Decimal(d) => serde_json::Value::from(*d),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}
