use crate::common::error::{FederationError, FederationResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single cell value exchanged with sources and the local engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    BigInt(i64),
    /// 64-bit double precision
    Double(f64),
    /// String value
    Varchar(String),
}

impl Value {
    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::BigInt(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Null | Value::Varchar(_) => None,
        }
    }

    /// Compare two non-null values the way the local engine orders untyped
    /// cells: numbers (booleans as 0/1) compare numerically and sort before
    /// any text, text compares byte-wise.
    pub fn compare(&self, other: &Value) -> FederationResult<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Err(FederationError::InvalidArgument(
                "NULL is not comparable".to_string(),
            )),
            (Value::Varchar(a), Value::Varchar(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            (Value::Varchar(_), _) => Ok(Ordering::Greater),
            (_, Value::Varchar(_)) => Ok(Ordering::Less),
            (Value::BigInt(a), Value::BigInt(b)) => Ok(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| {
                    FederationError::InvalidArgument("Cannot compare NaN values".to_string())
                }),
                _ => Err(FederationError::InvalidArgument(format!(
                    "Cannot compare {} with {}",
                    self, other
                ))),
            },
        }
    }

    /// Text the local engine sees when a value is used as a string (LIKE)
    pub fn to_sql_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(v) => i64::from(*v).to_string(),
            Value::Double(v) if v.is_finite() && v.fract() == 0.0 => format!("{:.1}", v),
            other => other.to_string(),
        }
    }

    /// Parse a raw text cell (CSV) into the narrowest matching value
    pub fn parse_text(raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Value::BigInt(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Value::Double(v);
        }
        match raw {
            "true" | "TRUE" => Value::Boolean(true),
            "false" | "FALSE" => Value::Boolean(false),
            _ => Value::Varchar(raw.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::BigInt(value) => write!(f, "{}", value),
            Value::Double(value) => write!(f, "{}", value),
            Value::Varchar(value) => write!(f, "{}", value),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}
