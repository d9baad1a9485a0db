//! Database connection trait.
//!
//! [`Connection`] is the SQL executor the service layer drives. Calls block
//! the caller until the database answers. Transactions are flat from the
//! caller's point of view: `begin` may be called again inside an open
//! transaction, and drivers map the inner levels onto savepoints.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A synchronous database connection.
#[allow(clippy::result_large_err)]
pub trait Connection: Send + Sync {
    /// The SQL dialect this connection speaks.
    fn dialect(&self) -> Dialect;

    /// Execute a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement and return rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute an INSERT and return the inserted row id.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64>;

    /// Id generated by the most recent successful INSERT.
    fn last_insert_id(&self) -> i64;

    /// Begin a transaction, or a nested level inside the open one.
    fn begin(&self) -> Result<()>;

    /// Commit the innermost open level.
    fn commit(&self) -> Result<()>;

    /// Roll back the innermost open level.
    fn rollback(&self) -> Result<()>;

    /// Is a transaction open?
    fn in_transaction(&self) -> bool;

    /// Quote a string as a literal for this connection.
    fn escape_string(&self, s: &str) -> String {
        self.dialect().escape_string(s)
    }

    /// INSERT one row built from parallel column and value lists.
    fn insert_row(&self, table: &str, columns: &[&str], values: Vec<Value>) -> Result<i64> {
        let dialect = self.dialect();
        if columns.is_empty() {
            let sql = match dialect {
                Dialect::Mysql => format!("INSERT INTO {} () VALUES ()", dialect.quote_identifier(table)),
                Dialect::Sqlite | Dialect::Postgres => {
                    format!("INSERT INTO {} DEFAULT VALUES", dialect.quote_identifier(table))
                }
            };
            return self.insert(&sql, &[]);
        }
        let cols: Vec<String> = columns
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect();
        let placeholders: Vec<String> = (1..=values.len())
            .map(|i| dialect.placeholder(i))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_identifier(table),
            cols.join(", "),
            placeholders.join(", ")
        );
        self.insert(&sql, &values)
    }

    /// UPDATE `columns` to `values` on the rows matching `where_clause`.
    ///
    /// The clause is inserted verbatim; an empty clause updates every row.
    fn update_rows(
        &self,
        table: &str,
        columns: &[&str],
        values: Vec<Value>,
        where_clause: &str,
    ) -> Result<u64> {
        let dialect = self.dialect();
        let sets: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", dialect.quote_identifier(c), dialect.placeholder(i + 1)))
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(table),
            sets.join(", ")
        );
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        self.execute(&sql, &values)
    }

    /// DELETE the rows matching `where_clause`; an empty clause deletes every row.
    fn delete_rows(&self, table: &str, where_clause: &str) -> Result<u64> {
        let mut sql = format!("DELETE FROM {}", self.dialect().quote_identifier(table));
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        self.execute(&sql, &[])
    }
}
