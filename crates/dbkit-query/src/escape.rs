//! Escaping values for literal SQL and normalizing them for storage.

use std::sync::OnceLock;

use dbkit_core::{Dialect, Value};
use indexmap::IndexMap;
use regex::Regex;

const NUMERIC_PATTERN: &str = r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?\s*$";

fn numeric_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(NUMERIC_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(error = %e, "numeric pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Does `s` spell a number (`12`, `-3.5`, `.5`, `1e3`)?
pub fn is_numeric(s: &str) -> bool {
    numeric_regex().is_some_and(|re| re.is_match(s))
}

/// Quote a string for literal inclusion in SQL.
///
/// `None` and the empty string both become `NULL`.
pub fn escape(value: Option<&str>, dialect: Dialect) -> String {
    match value {
        None | Some("") => "NULL".to_string(),
        Some(s) => dialect.escape_string(s),
    }
}

/// Render a value as a SQL literal.
///
/// Numbers are emitted bare, text goes through [`escape`] (so an empty
/// string is stored as `NULL`) and structured values are stored as JSON text.
pub fn literal(value: &Value, dialect: Dialect) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Default => "DEFAULT".to_string(),
        Value::Bool(b) => match dialect {
            Dialect::Postgres => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Dialect::Sqlite | Dialect::Mysql => if *b { "1" } else { "0" }.to_string(),
        },
        Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
            value.to_text().unwrap_or_else(|| "NULL".to_string())
        }
        Value::Float(v) if v.is_finite() => v.to_string(),
        Value::Double(v) if v.is_finite() => v.to_string(),
        Value::Float(_) | Value::Double(_) => "NULL".to_string(),
        Value::Decimal(s) if is_numeric(s) => s.trim().to_string(),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            match dialect {
                Dialect::Postgres => format!("'\\x{}'", hex),
                Dialect::Sqlite | Dialect::Mysql => format!("X'{}'", hex),
            }
        }
        Value::Json(_) | Value::Array(_) => match to_storage(value.clone()) {
            Value::Text(json) => dialect.escape_string(&json),
            _ => "NULL".to_string(),
        },
        other => escape(other.to_text().as_deref(), dialect),
    }
}

/// Normalize a value before it is stored.
///
/// The empty string becomes `Null`. JSON and arrays become JSON text in
/// which strings that spell numbers are written as numbers.
pub fn to_storage(value: Value) -> Value {
    match value {
        Value::Text(s) if s.is_empty() => Value::Null,
        Value::Json(json) => Value::Text(numeric_json(json).to_string()),
        Value::Array(items) => {
            let json = serde_json::Value::Array(items.iter().map(Value::to_json).collect());
            Value::Text(numeric_json(json).to_string())
        }
        other => other,
    }
}

/// Apply [`to_storage`] to every value of a column map.
pub fn to_storage_map(values: IndexMap<String, Value>) -> IndexMap<String, Value> {
    values
        .into_iter()
        .map(|(column, value)| (column, to_storage(value)))
        .collect()
}

fn numeric_json(json: serde_json::Value) -> serde_json::Value {
    match json {
        serde_json::Value::String(s) if is_numeric(&s) => parse_number(s.trim())
            .map_or(serde_json::Value::String(s), serde_json::Value::Number),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(numeric_json).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, numeric_json(value)))
                .collect(),
        ),
        other => other,
    }
}

fn parse_number(s: &str) -> Option<serde_json::Number> {
    let unsigned = s.strip_prefix('+').unwrap_or(s);
    if let Ok(v) = unsigned.parse::<i64>() {
        return Some(v.into());
    }
    unsigned
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_numeric() {
        for s in ["12", "-3", "+4", "1.5", ".5", "5.", "1e3", " 7"] {
            assert!(is_numeric(s), "{s}");
        }
        for s in ["", "abc", "1a", "--1", "1.2.3", "e5"] {
            assert!(!is_numeric(s), "{s}");
        }
    }

    #[test]
    fn test_escape_null_and_empty() {
        assert_eq!(escape(None, Dialect::Mysql), "NULL");
        assert_eq!(escape(Some(""), Dialect::Mysql), "NULL");
        assert_eq!(escape(Some("it's"), Dialect::Sqlite), "'it''s'");
    }

    #[test]
    fn test_literal() {
        let d = Dialect::Sqlite;
        assert_eq!(literal(&Value::Int(5), d), "5");
        assert_eq!(literal(&Value::Double(2.5), d), "2.5");
        assert_eq!(literal(&Value::Bool(true), d), "1");
        assert_eq!(literal(&Value::Bool(true), Dialect::Postgres), "TRUE");
        assert_eq!(literal(&Value::Text("a'b".into()), d), "'a''b'");
        assert_eq!(literal(&Value::Text(String::new()), d), "NULL");
        assert_eq!(literal(&Value::Null, d), "NULL");
        assert_eq!(literal(&Value::Bytes(vec![0xAB, 0x01]), d), "X'AB01'");
        assert_eq!(literal(&Value::Date(0), d), "'1970-01-01'");
        assert_eq!(literal(&Value::Array(vec!["1".into()]), d), "'[1]'");
    }

    #[test]
    fn test_to_storage() {
        assert_eq!(to_storage(Value::Text(String::new())), Value::Null);
        assert_eq!(to_storage(Value::Int(0)), Value::Int(0));
        assert_eq!(
            to_storage(Value::Json(json!({"a": "12", "b": "x", "c": ["1.5"]}))),
            Value::Text(r#"{"a":12,"b":"x","c":[1.5]}"#.to_string())
        );
        assert_eq!(
            to_storage(Value::Array(vec![Value::Text("3".into()), Value::Int(4)])),
            Value::Text("[3,4]".to_string())
        );
    }

    #[test]
    fn test_to_storage_map_keeps_order() {
        let mut map = IndexMap::new();
        map.insert("name".to_string(), Value::Text(String::new()));
        map.insert("age".to_string(), Value::Int(3));
        let stored = to_storage_map(map);
        assert_eq!(stored.keys().collect::<Vec<_>>(), ["name", "age"]);
        assert_eq!(stored["name"], Value::Null);
    }
}
