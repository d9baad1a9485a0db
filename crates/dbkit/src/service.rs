//! The database service: shaped reads, bulk writes and transactions over
//! one [`Connection`].

use dbkit_core::error::{ArgumentError, TypeError};
use dbkit_core::{
    Connection, Dialect, Entity, Error, Key, Record, RelationInfo, Result, Row, ServiceConfig,
    Value, find_field, find_relation, temporal,
};
use dbkit_query::{Filter, InsertRow, InsertStatement, QueryDescriptor, Select};
use indexmap::IndexMap;

use crate::shape::{
    self, ArrayTable, Assoc, KeyedAssoc, ObjectTable, RecordList, RecordMap, RowMap, Table,
    TableAssoc4d,
};

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Convenience layer over a [`Connection`].
///
/// The connection is handed in at construction; the service never looks one
/// up on its own. Every call blocks until the database answers.
///
/// # Example
///
/// ```ignore
/// use dbkit::prelude::*;
///
/// let db = DbService::new(SqliteConnection::open_memory()?);
/// let names = db.assoc(&Select::from("users").columns(&["id", "name"]))?;
/// db.insert_bulk::<User>(&rows, false)?;
/// ```
#[derive(Debug)]
pub struct DbService<C: Connection> {
    conn: C,
    config: ServiceConfig,
}

#[allow(clippy::result_large_err)]
impl<C: Connection> DbService<C> {
    /// Create a service with the default configuration.
    pub fn new(conn: C) -> Self {
        Self::with_config(conn, ServiceConfig::default())
    }

    pub fn with_config(conn: C, config: ServiceConfig) -> Self {
        Self { conn, config }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }

    /// Give the connection back.
    pub fn into_connection(self) -> C {
        self.conn
    }

    // ---------------------------------------------------------------------
    // Raw SQL
    // ---------------------------------------------------------------------

    /// Run raw SQL and return its rows.
    pub fn query(&self, sql: &str) -> Result<Vec<Row>> {
        tracing::debug!(sql = %sql, "Running raw query");
        self.conn.query(sql, &[])
    }

    pub fn query_rows(&self, sql: &str) -> Result<Vec<RowMap>> {
        Ok(shape::rows(self.query(sql)?))
    }

    pub fn query_row(&self, sql: &str) -> Result<RowMap> {
        Ok(shape::row(self.query(sql)?))
    }

    /// First column to second column of every row.
    pub fn query_assoc(&self, sql: &str) -> Result<Assoc> {
        shape::assoc(self.query(sql)?)
    }

    pub fn query_value(&self, sql: &str) -> Result<Value> {
        Ok(shape::value(self.query(sql)?))
    }

    pub fn query_values(&self, sql: &str) -> Result<Vec<Value>> {
        Ok(shape::values(self.query(sql)?))
    }

    // ---------------------------------------------------------------------
    // Escaping
    // ---------------------------------------------------------------------

    /// Quote a string for literal SQL; `None` and `""` become `NULL`.
    pub fn escape(&self, value: Option<&str>) -> String {
        dbkit_query::escape(value, self.dialect())
    }

    pub fn to_storage(&self, value: Value) -> Value {
        dbkit_query::to_storage(value)
    }

    pub fn to_storage_map(&self, values: InsertRow) -> InsertRow {
        dbkit_query::to_storage_map(values)
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Insert one row and return the generated id.
    ///
    /// With `upsert`, a row colliding on a unique key overwrites every
    /// supplied column of the stored row instead.
    #[tracing::instrument(level = "debug", skip(self, values), fields(table = T::TABLE))]
    pub fn insert<T: Record>(&self, values: InsertRow, upsert: bool) -> Result<i64> {
        if values.is_empty() {
            return Err(argument("insert", "nothing to insert"));
        }
        if upsert {
            let rows = [values];
            let sql = InsertStatement::new(T::TABLE, &rows)
                .upsert(pk_column::<T>())
                .build(self.dialect())?;
            tracing::debug!(sql = %sql, "Upserting row");
            return self.conn.insert(&sql, &[]);
        }

        let (columns, values): (Vec<String>, Vec<Value>) = values.into_iter().unzip();
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
        self.conn.insert_row(T::TABLE, &columns, values)
    }

    /// Insert many same-shaped rows inside one transaction.
    ///
    /// Rows are written `bulk_chunk_size` at a time, one multi-row INSERT per
    /// chunk. Any failure rolls every chunk back and is returned unchanged.
    /// An empty slice succeeds without touching the database.
    #[tracing::instrument(level = "debug", skip(self, rows), fields(table = T::TABLE, rows = rows.len()))]
    pub fn insert_bulk<T: Record>(&self, rows: &[InsertRow], upsert: bool) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let chunk_size = self.config.bulk_chunk_size.max(1);
        let conflict_key = pk_column::<T>();

        self.conn.begin()?;
        for (index, chunk) in rows.chunks(chunk_size).enumerate() {
            let mut statement = InsertStatement::new(T::TABLE, chunk);
            if upsert {
                statement = statement.upsert(conflict_key);
            }
            let result = statement
                .build(self.dialect())
                .and_then(|sql| self.conn.execute(&sql, &[]));
            match result {
                Ok(_) => tracing::debug!(chunk = index, rows = chunk.len(), "Inserted chunk"),
                Err(e) => {
                    tracing::error!(chunk = index, error = %e, "Bulk insert failed, rolling back");
                    self.rollback_quietly();
                    return Err(e);
                }
            }
        }
        self.commit_or_rollback()
    }

    /// Set columns on the rows matching `filter`.
    ///
    /// A filter that selects nothing (no conditions, an empty clause) is a
    /// no-op returning `Ok(0)`.
    #[tracing::instrument(level = "debug", skip(self, set, filter), fields(table = T::TABLE))]
    pub fn update<T: Record>(&self, set: InsertRow, filter: impl Into<Filter>) -> Result<u64> {
        let Some(clause) = filter.into().to_sql(self.dialect()) else {
            tracing::debug!("Empty filter, nothing updated");
            return Ok(0);
        };
        if set.is_empty() {
            return Err(argument("update", "no columns to set"));
        }
        let (columns, values): (Vec<String>, Vec<Value>) = set.into_iter().unzip();
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
        self.conn.update_rows(T::TABLE, &columns, values, &clause)
    }

    /// Delete the rows matching `filter`.
    ///
    /// A filter that selects nothing is a no-op returning `Ok(0)`. A foreign
    /// key violation comes back as [`Error::ForeignKeyDelete`].
    #[tracing::instrument(level = "debug", skip(self, filter), fields(table = T::TABLE))]
    pub fn delete<T: Record>(&self, filter: impl Into<Filter>) -> Result<u64> {
        let Some(clause) = filter.into().to_sql(self.dialect()) else {
            tracing::debug!("Empty filter, nothing deleted");
            return Ok(0);
        };
        self.conn.delete_rows(T::TABLE, &clause).map_err(|e| {
            if self.config.env.is_dev() {
                tracing::error!(table = T::TABLE, error = %e, "Delete failed");
            }
            e.into_foreign_key_delete(self.config.foreign_key_error_code)
        })
    }

    /// Delete rows without the foreign key reclassification of
    /// [`DbService::delete`]. Use `Filter::All` to empty the table.
    #[tracing::instrument(level = "debug", skip(self, filter), fields(table = T::TABLE))]
    pub fn truncate<T: Record>(&self, filter: impl Into<Filter>) -> Result<u64> {
        let Some(clause) = filter.into().to_sql(self.dialect()) else {
            tracing::debug!("Empty filter, nothing truncated");
            return Ok(0);
        };
        self.conn.delete_rows(T::TABLE, &clause)
    }

    /// Turn foreign key enforcement on or off for this connection.
    pub fn set_foreign_key_checks(&self, enabled: bool) -> Result<()> {
        let sql = self.dialect().foreign_key_checks_sql(enabled);
        tracing::debug!(enabled, "Setting foreign key checks");
        self.conn.execute(sql, &[]).map(|_| ())
    }

    // ---------------------------------------------------------------------
    // Shaped reads
    // ---------------------------------------------------------------------

    pub(crate) fn fetch<Q: QueryDescriptor>(&self, query: &Q) -> Result<Vec<Row>> {
        let (sql, params) = query.to_sql(self.dialect());
        tracing::debug!(sql = %sql, params = params.len(), "Fetching");
        self.conn.query(&sql, &params)
    }

    /// Fail unless the query declares exactly `expected` columns.
    fn require_columns<Q: QueryDescriptor>(
        query: &Q,
        expected: usize,
        operation: &'static str,
    ) -> Result<()> {
        let declared = query.column_names().len();
        if declared == expected {
            Ok(())
        } else {
            Err(argument(
                operation,
                format!(
                    "the query must select exactly {} column(s), it declares {}",
                    expected, declared
                ),
            ))
        }
    }

    pub fn rows<Q: QueryDescriptor>(&self, query: &Q) -> Result<Vec<RowMap>> {
        Ok(shape::rows(self.fetch(query)?))
    }

    /// The first row, or an empty map.
    pub fn row<Q: QueryDescriptor>(&self, query: &Q) -> Result<RowMap> {
        Ok(shape::row(self.fetch(query)?))
    }

    /// The single cell of the first row, `Null` if nothing matched.
    ///
    /// The query must declare exactly one column.
    pub fn value<Q: QueryDescriptor>(&self, query: &Q) -> Result<Value> {
        Self::require_columns(query, 1, "value")?;
        Ok(shape::value(self.fetch(query)?))
    }

    /// The first cell of every row.
    ///
    /// The query must declare exactly one column unless `any_columns` is set.
    pub fn values<Q: QueryDescriptor>(&self, query: &Q, any_columns: bool) -> Result<Vec<Value>> {
        if !any_columns {
            Self::require_columns(query, 1, "values")?;
        }
        Ok(shape::values(self.fetch(query)?))
    }

    /// A date or datetime cell as `Value::Timestamp`; `None` when empty.
    pub fn date<Q: QueryDescriptor>(&self, query: &Q) -> Result<Option<Value>> {
        let value = self.value(query)?;
        if value.is_falsy() {
            return Ok(None);
        }
        let micros = match value {
            Value::Timestamp(v) | Value::TimestampTz(v) => v,
            Value::Date(days) => i64::from(days) * MICROS_PER_DAY,
            Value::Text(ref s) => temporal::parse_datetime(s)?,
            other => {
                return Err(Error::Type(TypeError {
                    expected: "date",
                    actual: other.type_name().to_string(),
                    column: None,
                    rust_type: None,
                }));
            }
        };
        Ok(Some(Value::Timestamp(micros)))
    }

    pub fn exists<Q: QueryDescriptor>(&self, query: &Q) -> Result<bool> {
        Ok(shape::exists(&self.fetch(query)?))
    }

    /// First column to second column. The query must declare two columns.
    pub fn assoc<Q: QueryDescriptor>(&self, query: &Q) -> Result<Assoc> {
        Self::require_columns(query, 2, "assoc")?;
        shape::assoc(self.fetch(query)?)
    }

    pub fn keyed_rows<Q: QueryDescriptor>(&self, query: &Q) -> Result<IndexMap<Key, RowMap>> {
        shape::keyed_rows(self.fetch(query)?)
    }

    /// `col1 -> col2 -> col3`. The query must declare three columns.
    pub fn keyed_assoc<Q: QueryDescriptor>(&self, query: &Q) -> Result<KeyedAssoc> {
        Self::require_columns(query, 3, "keyed_assoc")?;
        shape::keyed_assoc(self.fetch(query)?)
    }

    /// `col1 -> col2 -> col3 -> col4`. The query must declare four columns.
    pub fn table_assoc_4d<Q: QueryDescriptor>(&self, query: &Q) -> Result<TableAssoc4d> {
        Self::require_columns(query, 4, "table_assoc_4d")?;
        shape::table_assoc_4d(self.fetch(query)?)
    }

    pub fn keyed_values<Q: QueryDescriptor>(
        &self,
        query: &Q,
        remove_empty: bool,
    ) -> Result<IndexMap<Key, Vec<Value>>> {
        shape::keyed_values(self.fetch(query)?, remove_empty)
    }

    pub fn table<Q: QueryDescriptor>(&self, query: &Q) -> Result<Table> {
        shape::table(self.fetch(query)?)
    }

    pub fn array_table<Q: QueryDescriptor>(&self, query: &Q) -> Result<ArrayTable> {
        shape::array_table(self.fetch(query)?)
    }

    /// The first matching record.
    pub fn object<T: Record, Q: QueryDescriptor>(&self, query: &Q) -> Result<Option<T>> {
        self.fetch(query)?.first().map(T::from_row).transpose()
    }

    pub fn objects<T: Record, Q: QueryDescriptor>(&self, query: &Q) -> Result<Vec<T>> {
        self.fetch(query)?.iter().map(T::from_row).collect()
    }

    /// Records appended to a container of the caller's choosing.
    pub fn object_list<T, L, Q>(&self, query: &Q) -> Result<L>
    where
        T: Record,
        L: RecordList<T>,
        Q: QueryDescriptor,
    {
        Ok(shape::collect_list(self.objects::<T, Q>(query)?))
    }

    /// Records keyed by the `map_by` field in a container of the caller's
    /// choosing.
    pub fn object_map<T, M, Q>(&self, query: &Q, map_by: &str) -> Result<M>
    where
        T: Record,
        M: RecordMap<T>,
        Q: QueryDescriptor,
    {
        shape::collect_map(self.objects::<T, Q>(query)?, map_by)
    }

    /// Records keyed by primary key.
    pub fn object_map_by_id<T, M, Q>(&self, query: &Q) -> Result<M>
    where
        T: Record,
        M: RecordMap<T>,
        Q: QueryDescriptor,
    {
        self.object_map::<T, M, Q>(query, T::PRIMARY_KEY)
    }

    /// `record.first -> record.second -> [record, ...]`.
    pub fn object_table<T: Record, Q: QueryDescriptor>(
        &self,
        query: &Q,
        first: &str,
        second: &str,
    ) -> Result<ObjectTable<T>> {
        shape::object_table(self.objects::<T, Q>(query)?, first, second)
    }

    /// The stored row with the given primary key, or an empty map.
    pub fn table_row_by_id<T: Record>(&self, id: impl Into<Value>) -> Result<RowMap> {
        self.row(&Select::record::<T>().filter_eq(pk_column::<T>(), id))
    }

    /// Key records by one of their fields; the last record wins a repeated key.
    pub fn to_map<T: Entity>(&self, records: Vec<T>, field: &str) -> Result<IndexMap<Key, T>> {
        shape::to_map(records, field)
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    /// Run `action` inside a transaction.
    ///
    /// Commits and returns `Ok(true)` when the action succeeds. When the
    /// action or the commit fails the transaction is rolled back; the error is then
    /// returned if `rethrow` is set, otherwise the result is `Ok(false)`.
    #[tracing::instrument(level = "debug", skip(self, action))]
    pub fn transaction<F>(&self, action: F, rethrow: bool) -> Result<bool>
    where
        F: FnOnce(&Self) -> Result<()>,
    {
        self.conn.begin()?;
        let outcome = match action(self) {
            Ok(()) => self.commit_or_rollback(),
            Err(e) => {
                tracing::error!(error = %e, "Transaction failed, rolling back");
                self.rollback_quietly();
                Err(e)
            }
        };
        match outcome {
            Ok(()) => Ok(true),
            Err(e) if rethrow => Err(e),
            Err(_) => Ok(false),
        }
    }

    /// Commit the open transaction. A failed commit (a deferred constraint,
    /// say) leaves the transaction open, so it is rolled back here.
    pub(crate) fn commit_or_rollback(&self) -> Result<()> {
        match self.conn.commit() {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Commit failed, rolling back");
                self.rollback_quietly();
                Err(e)
            }
        }
    }

    pub(crate) fn rollback_quietly(&self) {
        if let Err(e) = self.conn.rollback() {
            tracing::warn!(error = %e, "Rollback failed");
        }
    }

    // ---------------------------------------------------------------------
    // Record metadata and relations
    // ---------------------------------------------------------------------

    pub fn alias_for<T: Record>(&self) -> Option<&'static str> {
        T::ALIAS
    }

    pub fn table_for<T: Record>(&self) -> &'static str {
        T::TABLE
    }

    /// The records attached to `owner` through `relation`.
    ///
    /// The relation's extra condition and default field values narrow the
    /// fetch. An owner without a key value has nothing attached.
    pub fn related<T: Record>(&self, owner: &dyn Entity, relation: &str) -> Result<Vec<T>> {
        let info = relation_of(owner, relation)?;
        if info.related_table != T::TABLE {
            return Err(argument(
                "related",
                format!(
                    "relation '{}' points at '{}', not '{}'",
                    relation,
                    info.related_table,
                    T::TABLE
                ),
            ));
        }
        match owner_key(owner, info) {
            Some(key) => self.objects::<T, _>(&Select::related(info, key)),
            None => Ok(Vec::new()),
        }
    }

    /// Fetch the records of `relation` and attach them to `owner`.
    pub fn load_related(&self, owner: &mut dyn Entity, relation: &str) -> Result<()> {
        let info = relation_of(owner, relation)?;
        let rows = match owner_key(owner, info) {
            Some(key) => self.fetch(&Select::related(info, key))?,
            None => Vec::new(),
        };
        tracing::debug!(
            record = owner.type_name(),
            relation,
            rows = rows.len(),
            "Loading relation"
        );
        owner.load_related(relation, &rows)
    }
}

fn argument(operation: &'static str, message: impl Into<String>) -> Error {
    Error::Argument(ArgumentError::new(operation, message))
}

/// Column holding a record type's primary key.
pub(crate) fn pk_column<T: Record>() -> &'static str {
    find_field(T::fields(), T::PRIMARY_KEY).map_or(T::PRIMARY_KEY, |f| f.column_name)
}

fn relation_of(owner: &dyn Entity, relation: &str) -> Result<&'static RelationInfo> {
    find_relation(owner.relations(), relation).ok_or_else(|| {
        argument(
            "related",
            format!("{} has no relation '{}'", owner.type_name(), relation),
        )
    })
}

fn owner_key(owner: &dyn Entity, info: &RelationInfo) -> Option<Value> {
    owner.get_field(info.local_key).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use dbkit_core::error::{QueryError, QueryErrorKind};
    use dbkit_core::{ColumnInfo, FieldInfo, Related, RelationKind};
    use dbkit_query::{Conditions, RawQuery};
    use std::sync::Arc;

    /// Records every statement and answers queries from a canned result.
    #[derive(Default)]
    struct RecordingConnection {
        log: Mutex<Vec<String>>,
        rows: Mutex<Vec<Row>>,
        fail_on: Option<&'static str>,
        fk_error: bool,
    }

    impl RecordingConnection {
        fn with_rows(rows: Vec<Row>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Self::default()
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn record(&self, sql: &str) -> Result<()> {
            self.log.lock().unwrap().push(sql.to_string());
            if self.fk_error && sql.starts_with("DELETE") {
                let mut err = QueryError::new(QueryErrorKind::Constraint, "still referenced");
                err.code = Some(1451);
                return Err(Error::Query(err));
            }
            match self.fail_on {
                Some(marker) if sql.contains(marker) => Err(Error::Query(QueryError::new(
                    QueryErrorKind::Database,
                    "boom",
                ))),
                _ => Ok(()),
            }
        }
    }

    impl Connection for RecordingConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Mysql
        }
        fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            self.record(sql)?;
            Ok(self.rows.lock().unwrap().clone())
        }
        fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
            self.record(sql)?;
            Ok(1)
        }
        fn insert(&self, sql: &str, _params: &[Value]) -> Result<i64> {
            self.record(sql)?;
            Ok(42)
        }
        fn last_insert_id(&self) -> i64 {
            42
        }
        fn begin(&self) -> Result<()> {
            self.record("BEGIN")
        }
        fn commit(&self) -> Result<()> {
            self.record("COMMIT")
        }
        fn rollback(&self) -> Result<()> {
            self.record("ROLLBACK")
        }
        fn in_transaction(&self) -> bool {
            false
        }
    }

    #[derive(Debug, Default)]
    struct Author {
        id: Option<i64>,
        name: String,
    }

    #[derive(Debug, Default)]
    struct Book {
        id: Option<i64>,
        author_id: Option<i64>,
        author: Related<Author>,
    }

    const AUTHOR_FIELDS: &[FieldInfo] = &[
        FieldInfo::new("id").primary_key(true).nullable(true),
        FieldInfo::new("name"),
    ];
    const BOOK_FIELDS: &[FieldInfo] = &[
        FieldInfo::new("id").primary_key(true).nullable(true),
        FieldInfo::new("author_id").nullable(true),
    ];
    const BOOK_RELATIONS: &[RelationInfo] = &[RelationInfo::new(
        "author",
        "authors",
        RelationKind::BelongsTo,
    )
    .local_key("author_id")];

    impl Entity for Author {
        fn table(&self) -> &'static str {
            "authors"
        }
        fn type_name(&self) -> &'static str {
            "Author"
        }
        fn primary_key(&self) -> &'static str {
            "id"
        }
        fn field_infos(&self) -> &'static [FieldInfo] {
            AUTHOR_FIELDS
        }
        fn relations(&self) -> &'static [RelationInfo] {
            &[]
        }
        fn get_field(&self, name: &str) -> Option<Value> {
            match name {
                "id" => Some(self.id.into()),
                "name" => Some(self.name.clone().into()),
                _ => None,
            }
        }
        fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
            match name {
                "id" => self.id = value.as_i64(),
                "name" => self.name = value.as_str().unwrap_or_default().to_string(),
                _ => return Err(argument("set_field", name.to_string())),
            }
            Ok(())
        }
        fn related(&self, _relation: &str) -> Option<Vec<&dyn Entity>> {
            None
        }
        fn related_mut(&mut self, _relation: &str) -> Option<Vec<&mut dyn Entity>> {
            None
        }
        fn load_related(&mut self, _relation: &str, _rows: &[Row]) -> Result<()> {
            Ok(())
        }
        fn unset_related(&mut self, _relation: &str) -> bool {
            false
        }
    }

    impl Record for Author {
        const TABLE: &'static str = "authors";
        const ALIAS: Option<&'static str> = Some("a");

        fn fields() -> &'static [FieldInfo] {
            AUTHOR_FIELDS
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                name: row.get_named("name")?,
            })
        }
    }

    impl Entity for Book {
        fn table(&self) -> &'static str {
            "books"
        }
        fn type_name(&self) -> &'static str {
            "Book"
        }
        fn primary_key(&self) -> &'static str {
            "id"
        }
        fn field_infos(&self) -> &'static [FieldInfo] {
            BOOK_FIELDS
        }
        fn relations(&self) -> &'static [RelationInfo] {
            BOOK_RELATIONS
        }
        fn get_field(&self, name: &str) -> Option<Value> {
            match name {
                "id" => Some(self.id.into()),
                "author_id" => Some(self.author_id.into()),
                _ => None,
            }
        }
        fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
            match name {
                "id" => self.id = value.as_i64(),
                "author_id" => self.author_id = value.as_i64(),
                _ => return Err(argument("set_field", name.to_string())),
            }
            Ok(())
        }
        fn related(&self, relation: &str) -> Option<Vec<&dyn Entity>> {
            (relation == "author").then(|| {
                self.author
                    .get()
                    .map(|a| a as &dyn Entity)
                    .into_iter()
                    .collect()
            })
        }
        fn related_mut(&mut self, relation: &str) -> Option<Vec<&mut dyn Entity>> {
            (relation == "author").then(|| {
                self.author
                    .get_mut()
                    .map(|a| a as &mut dyn Entity)
                    .into_iter()
                    .collect()
            })
        }
        fn load_related(&mut self, relation: &str, rows: &[Row]) -> Result<()> {
            if relation != "author" {
                return Err(argument("load_related", relation.to_string()));
            }
            let author = rows.first().map(Author::from_row).transpose()?;
            self.author.set_loaded(author);
            Ok(())
        }
        fn unset_related(&mut self, relation: &str) -> bool {
            if relation != "author" {
                return false;
            }
            self.author.take();
            true
        }
    }

    fn author_rows() -> Vec<Row> {
        let info = Arc::new(ColumnInfo::new(vec!["id".into(), "name".into()]));
        vec![
            Row::with_columns(Arc::clone(&info), vec![Value::Int(1), "Ada".into()]),
            Row::with_columns(info, vec![Value::Int(2), "Grace".into()]),
        ]
    }

    fn insert_row(id: i64) -> InsertRow {
        let mut row = InsertRow::new();
        row.insert("id".to_string(), Value::BigInt(id));
        row.insert("name".to_string(), Value::Text(format!("n{id}")));
        row
    }

    #[test]
    fn test_bulk_insert_chunks_inside_one_transaction() {
        let config = ServiceConfig::new().bulk_chunk_size(2);
        let db = DbService::with_config(RecordingConnection::default(), config);
        let rows: Vec<InsertRow> = (1..=5).map(insert_row).collect();

        db.insert_bulk::<Author>(&rows, false).unwrap();

        let log = db.connection().log();
        assert_eq!(log.len(), 5);
        assert_eq!(log[0], "BEGIN");
        assert!(log[1].starts_with("INSERT INTO `authors` (`id`, `name`) VALUES (1, 'n1'), (2, 'n2')"));
        assert!(log[3].ends_with("(5, 'n5')"));
        assert_eq!(log[4], "COMMIT");
    }

    #[test]
    fn test_bulk_insert_empty_touches_nothing() {
        let db = DbService::new(RecordingConnection::default());
        db.insert_bulk::<Author>(&[], true).unwrap();
        assert!(db.connection().log().is_empty());
    }

    #[test]
    fn test_bulk_insert_failure_rolls_back() {
        let conn = RecordingConnection {
            fail_on: Some("'n3'"),
            ..RecordingConnection::default()
        };
        let db = DbService::with_config(conn, ServiceConfig::new().bulk_chunk_size(2));
        let rows: Vec<InsertRow> = (1..=5).map(insert_row).collect();

        let err = db.insert_bulk::<Author>(&rows, false).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
        let log = db.connection().log();
        assert_eq!(log.last().map(String::as_str), Some("ROLLBACK"));
        assert!(!log.iter().any(|s| s == "COMMIT"));
    }

    #[test]
    fn test_bulk_upsert_clause() {
        let db = DbService::new(RecordingConnection::default());
        db.insert_bulk::<Author>(&[insert_row(1)], true).unwrap();
        assert!(
            db.connection().log()[1]
                .ends_with("ON DUPLICATE KEY UPDATE `id` = VALUES(`id`), `name` = VALUES(`name`)")
        );
    }

    #[test]
    fn test_empty_filters_are_noops() {
        let db = DbService::new(RecordingConnection::default());
        assert_eq!(db.delete::<Author>(Conditions::new()).unwrap(), 0);
        assert_eq!(db.truncate::<Author>("").unwrap(), 0);
        assert_eq!(
            db.update::<Author>(insert_row(1), Conditions::new().is_in("id", Vec::<i64>::new()))
                .unwrap(),
            0
        );
        assert!(db.connection().log().is_empty());

        db.truncate::<Author>(Filter::All).unwrap();
        assert_eq!(db.connection().log(), vec!["DELETE FROM `authors`".to_string()]);
    }

    #[test]
    fn test_update_and_delete_render_conditions() {
        let db = DbService::new(RecordingConnection::default());
        db.update::<Author>(insert_row(3), Conditions::new().eq("id", 3))
            .unwrap();
        db.delete::<Author>(Conditions::new().is_in("id", [1_i64, 2]))
            .unwrap();
        let log = db.connection().log();
        assert_eq!(log[0], "UPDATE `authors` SET `id` = ?, `name` = ? WHERE id = 3");
        assert_eq!(log[1], "DELETE FROM `authors` WHERE id IN (1, 2)");
    }

    #[test]
    fn test_delete_reclassifies_foreign_key_failures() {
        let conn = RecordingConnection {
            fk_error: true,
            ..RecordingConnection::default()
        };
        let db = DbService::new(conn);
        let err = db.delete::<Author>("id = 1").unwrap_err();
        assert!(err.is_foreign_key_delete());

        // truncate leaves the driver error alone
        let err = db.truncate::<Author>("id = 1").unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_insert_paths() {
        let db = DbService::new(RecordingConnection::default());
        assert_eq!(db.insert::<Author>(insert_row(1), false).unwrap(), 42);
        assert_eq!(db.insert::<Author>(insert_row(1), true).unwrap(), 42);
        assert!(db.insert::<Author>(InsertRow::new(), false).is_err());

        let log = db.connection().log();
        assert_eq!(log[0], "INSERT INTO `authors` (`id`, `name`) VALUES (?, ?)");
        assert!(log[1].contains("ON DUPLICATE KEY UPDATE"));
    }

    #[test]
    fn test_column_preconditions_fail_before_running() {
        let db = DbService::new(RecordingConnection::with_rows(author_rows()));
        let star = Select::from("authors");
        let one = Select::from("authors").columns(&["id"]);
        let three = RawQuery::new("SELECT a, b, c FROM t").columns(&["a", "b", "c"]);

        assert!(matches!(db.value(&star), Err(Error::Argument(_))));
        assert!(matches!(db.values(&star, false), Err(Error::Argument(_))));
        assert!(matches!(db.assoc(&one), Err(Error::Argument(_))));
        assert!(matches!(db.assoc(&three), Err(Error::Argument(_))));
        assert!(matches!(db.keyed_assoc(&one), Err(Error::Argument(_))));
        assert!(matches!(db.table_assoc_4d(&three), Err(Error::Argument(_))));
        assert!(db.connection().log().is_empty());

        assert_eq!(db.values(&star, true).unwrap().len(), 2);
    }

    #[test]
    fn test_object_shapes() {
        let db = DbService::new(RecordingConnection::with_rows(author_rows()));
        let query = Select::record::<Author>();

        let first: Option<Author> = db.object(&query).unwrap();
        assert_eq!(first.unwrap().name, "Ada");
        let all: Vec<Author> = db.objects(&query).unwrap();
        assert_eq!(all.len(), 2);

        let by_id: IndexMap<Key, Author> = db.object_map_by_id::<Author, _, _>(&query).unwrap();
        assert_eq!(by_id[&Key::Int(2)].name, "Grace");
        let by_name: IndexMap<Key, Author> =
            db.object_map::<Author, _, _>(&query, "name").unwrap();
        assert!(by_name.contains_key(&Key::from("Ada")));
        assert!(db.object_map::<Author, IndexMap<Key, Author>, _>(&query, "age").is_err());

        let list: Vec<Author> = db.object_list::<Author, _, _>(&query).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_date_parsing() {
        let info = Arc::new(ColumnInfo::new(vec!["created".into()]));
        let rows = vec![Row::with_columns(info, vec!["1970-01-02 00:00:01".into()])];
        let db = DbService::new(RecordingConnection::with_rows(rows));
        let query = Select::from("t").columns(&["created"]);
        assert_eq!(
            db.date(&query).unwrap(),
            Some(Value::Timestamp(MICROS_PER_DAY + 1_000_000))
        );

        let db = DbService::new(RecordingConnection::default());
        assert_eq!(db.date(&query).unwrap(), None);
    }

    #[test]
    fn test_transaction_commit_and_rethrow() {
        let db = DbService::new(RecordingConnection::default());
        assert!(db.transaction(|_| Ok(()), true).unwrap());

        let failing = |_: &DbService<RecordingConnection>| -> Result<()> {
            Err(Error::Custom("nope".to_string()))
        };
        assert!(!db.transaction(failing, false).unwrap());
        assert!(matches!(db.transaction(failing, true), Err(Error::Custom(_))));

        let log = db.connection().log();
        assert_eq!(
            log,
            vec!["BEGIN", "COMMIT", "BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK"]
        );
    }

    #[test]
    fn test_failed_commit_is_rolled_back() {
        let conn = RecordingConnection {
            fail_on: Some("COMMIT"),
            ..RecordingConnection::default()
        };
        let db = DbService::new(conn);
        let rows: Vec<InsertRow> = (1..=2).map(insert_row).collect();

        assert!(matches!(
            db.insert_bulk::<Author>(&rows, false),
            Err(Error::Query(_))
        ));
        assert!(!db.transaction(|_| Ok(()), false).unwrap());
        assert!(matches!(db.transaction(|_| Ok(()), true), Err(Error::Query(_))));

        let log = db.connection().log();
        assert_eq!(log.iter().filter(|s| *s == "ROLLBACK").count(), 3);
        assert_eq!(log.last().map(String::as_str), Some("ROLLBACK"));
    }

    #[test]
    fn test_failed_rollback_keeps_the_action_error() {
        let conn = RecordingConnection {
            fail_on: Some("ROLLBACK"),
            ..RecordingConnection::default()
        };
        let db = DbService::new(conn);
        let failing = |_: &DbService<RecordingConnection>| -> Result<()> {
            Err(Error::Custom("nope".to_string()))
        };

        assert!(matches!(db.transaction(failing, true), Err(Error::Custom(_))));
        assert!(!db.transaction(failing, false).unwrap());
    }

    #[test]
    fn test_related_fetch() {
        let db = DbService::new(RecordingConnection::with_rows(author_rows()));
        let book = Book {
            id: Some(1),
            author_id: Some(2),
            ..Book::default()
        };
        let authors: Vec<Author> = db.related(&book, "author").unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(
            db.connection().log()[0],
            "SELECT * FROM `authors` WHERE id = ?"
        );

        let orphan = Book::default();
        assert!(db.related::<Author>(&orphan, "author").unwrap().is_empty());
        assert!(db.related::<Author>(&book, "editor").is_err());

        let mut book = book;
        db.load_related(&mut book, "author").unwrap();
        assert_eq!(book.author.get().map(|a| a.name.as_str()), Some("Ada"));
    }

    #[test]
    fn test_metadata_helpers() {
        let db = DbService::new(RecordingConnection::default());
        assert_eq!(db.alias_for::<Author>(), Some("a"));
        assert_eq!(db.table_for::<Author>(), "authors");
        assert_eq!(db.escape(Some("it's")), "'it\\'s'");
        assert_eq!(db.escape(Some("")), "NULL");
        assert_eq!(db.to_storage(Value::Text(String::new())), Value::Null);
        db.set_foreign_key_checks(false).unwrap();
        assert_eq!(db.connection().log(), vec!["SET FOREIGN_KEY_CHECKS = 0"]);

        let conn = db.into_connection();
        assert_eq!(conn.log().len(), 1);
    }
}
