//! WHERE clauses built from column/condition maps.

use dbkit_core::{Dialect, Value};
use indexmap::IndexMap;

use crate::escape::{is_numeric, literal};

/// Column conditions, AND-joined in insertion order.
///
/// Each column maps to one value:
/// - an array renders `column IN (...)`, and an empty array contributes nothing
/// - `Null` renders `column IS NULL`
/// - numbers (and text spelling a number) render unquoted
/// - anything else renders as an escaped literal
///
/// Setting the same column twice replaces the earlier condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: IndexMap<String, Value>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(column.into(), value.into());
        self
    }

    /// `column IN (values...)`.
    pub fn is_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.entries.insert(column.into(), Value::Array(values));
        self
    }

    /// `column IS NULL`.
    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.entries.insert(column.into(), Value::Null);
        self
    }

    /// Add a condition in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(column.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render the clause (without the `WHERE` keyword).
    ///
    /// Returns an empty string when no condition contributes a clause.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let clauses: Vec<String> = self
            .entries
            .iter()
            .filter_map(|(column, value)| condition_sql(column, value, dialect))
            .collect();
        clauses.join(" AND ")
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Conditions {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn condition_sql(column: &str, value: &Value, dialect: Dialect) -> Option<String> {
    match value {
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => {
            let members: Vec<String> = items.iter().map(|v| condition_literal(v, dialect)).collect();
            Some(format!("{} IN ({})", column, members.join(", ")))
        }
        Value::Null => Some(format!("{} IS NULL", column)),
        other => Some(format!("{} = {}", column, condition_literal(other, dialect))),
    }
}

fn condition_literal(value: &Value, dialect: Dialect) -> String {
    match value {
        Value::Text(s) if is_numeric(s) => s.trim().to_string(),
        // an empty string still compares as a string
        Value::Text(s) if s.is_empty() => "''".to_string(),
        other => literal(other, dialect),
    }
}

/// Which rows an update or delete addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// A ready-made clause, inserted verbatim.
    Clause(String),
    /// Column conditions rendered by [`Conditions::to_sql`].
    Conditions(Conditions),
    /// Every row of the table.
    All,
}

impl Filter {
    /// Render the clause; `None` means the filter selects nothing and the
    /// statement must not run.
    pub fn to_sql(&self, dialect: Dialect) -> Option<String> {
        let sql = match self {
            Filter::Clause(sql) => sql.trim().to_string(),
            Filter::Conditions(conditions) => conditions.to_sql(dialect),
            Filter::All => return Some(String::new()),
        };
        (!sql.is_empty()).then_some(sql)
    }
}

impl From<Conditions> for Filter {
    fn from(conditions: Conditions) -> Self {
        Filter::Conditions(conditions)
    }
}

impl From<&str> for Filter {
    fn from(sql: &str) -> Self {
        Filter::Clause(sql.to_string())
    }
}

impl From<String> for Filter {
    fn from(sql: String) -> Self {
        Filter::Clause(sql)
    }
}

/// Render a column/condition map as a WHERE clause body.
pub fn where_clause<K, V, I>(conditions: I, dialect: Dialect) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    conditions.into_iter().collect::<Conditions>().to_sql(dialect)
}
