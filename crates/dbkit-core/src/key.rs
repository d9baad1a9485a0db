//! Hashable map keys derived from cell values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A map key taken from a result cell.
///
/// `Value` holds floats and JSON and so cannot be hashed. Shaped results key
/// their maps by `Key` instead, coercing cells the way associative arrays do:
/// integers (and booleans) stay integral, text that spells a canonical integer
/// becomes an integer, NULL becomes the empty string and everything else is
/// keyed by its text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl Key {
    /// Derive a key from a cell value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(_)
            | Value::TinyInt(_)
            | Value::SmallInt(_)
            | Value::Int(_)
            | Value::BigInt(_) => value.as_i64().map_or(Key::Text(String::new()), Key::Int),
            Value::Text(s) | Value::Decimal(s) => Self::from_text(s),
            other => Key::Text(other.to_text().unwrap_or_default()),
        }
    }

    /// Key for a string, turning canonical integers ("21", "-3") into `Int`.
    pub fn from_text(text: &str) -> Self {
        if is_canonical_int(text) {
            if let Ok(v) = text.parse::<i64>() {
                return Key::Int(v);
            }
        }
        Key::Text(text.to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Key::Int(v) => Some(*v),
            Key::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Int(_) => None,
            Key::Text(s) => Some(s),
        }
    }

    /// Convert back into a value for use as a query parameter.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(v) => Value::BigInt(*v),
            Key::Text(s) => Value::Text(s.clone()),
        }
    }
}

fn is_canonical_int(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return false;
    }
    // "-0" is not canonical
    !(text.starts_with('-') && digits == "0")
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{}", v),
            Key::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&Value> for Key {
    fn from(value: &Value) -> Self {
        Key::from_value(value)
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::from_value(&value)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Int(i64::from(v))
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::from_text(v)
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::from_text(&v)
    }
}
