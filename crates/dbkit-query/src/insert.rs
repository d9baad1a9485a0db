//! Multi-row INSERT statements with literal values.

use dbkit_core::error::ArgumentError;
use dbkit_core::{Dialect, Error, Result, Value};
use indexmap::IndexMap;

use crate::escape::literal;

/// A row to insert: column name to value, in column order.
pub type InsertRow = IndexMap<String, Value>;

/// INSERT statement for one or more same-shaped rows.
///
/// Values are rendered as escaped literals, so the statement runs without
/// bound parameters. With `upsert`, rows colliding on a unique key
/// overwrite every supplied column instead of failing.
#[derive(Debug, Clone)]
pub struct InsertStatement<'a> {
    table: &'a str,
    rows: &'a [InsertRow],
    upsert: Option<&'a str>,
}

impl<'a> InsertStatement<'a> {
    pub fn new(table: &'a str, rows: &'a [InsertRow]) -> Self {
        Self {
            table,
            rows,
            upsert: None,
        }
    }

    /// Overwrite existing rows on a key collision. `conflict_key` names the
    /// unique column where the dialect needs an explicit conflict target.
    pub fn upsert(mut self, conflict_key: &'a str) -> Self {
        self.upsert = Some(conflict_key);
        self
    }

    /// Render the statement.
    ///
    /// The column list comes from the first row. Every other row must carry
    /// exactly those columns, though not necessarily in the same order.
    #[allow(clippy::result_large_err)]
    pub fn build(&self, dialect: Dialect) -> Result<String> {
        let Some(first) = self.rows.first() else {
            return Err(insert_error("no rows to insert"));
        };
        if first.is_empty() {
            return Err(insert_error("rows have no columns"));
        }
        let columns: Vec<&str> = first.keys().map(String::as_str).collect();

        let mut tuples = Vec::with_capacity(self.rows.len());
        for (index, row) in self.rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(insert_error(format!(
                    "row {} has {} columns, expected {}",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
            let mut literals = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row.get(*column).ok_or_else(|| {
                    insert_error(format!("row {} has no column '{}'", index, column))
                })?;
                literals.push(literal(value, dialect));
            }
            tuples.push(format!("({})", literals.join(", ")));
        }

        let quoted: Vec<String> = columns
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            dialect.quote_identifier(self.table),
            quoted.join(", "),
            tuples.join(", ")
        );
        if let Some(conflict_key) = self.upsert {
            sql.push_str(&dialect.upsert_clause(conflict_key, &columns));
        }
        Ok(sql)
    }
}

fn insert_error(message: impl Into<String>) -> Error {
    Error::Argument(ArgumentError::new("insert", message))
}
