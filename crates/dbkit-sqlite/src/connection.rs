//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the `Connection` trait
//! from dbkit-core. Nested `begin` calls open savepoints, so a service
//! transaction may run inside a caller's transaction.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::result_large_err)] // Error type is defined in dbkit-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::ffi;
use crate::types;
use dbkit_core::{
    Connection, Dialect, Error, Result, Row, Value,
    error::{
        ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
        TransactionErrorKind,
    },
    row::ColumnInfo,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Enforce foreign key constraints (`PRAGMA foreign_keys = ON`).
    pub foreign_keys: bool,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// Inner state of the SQLite connection, protected by a mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    /// Open transaction levels: 0 outside a transaction, 1 inside BEGIN,
    /// one more per savepoint.
    depth: usize,
    last_insert_id: i64,
}

// SAFETY: the handle is only touched while the Mutex is held.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// This is a thread-safe wrapper around a SQLite database handle.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

// SqliteConnection is Send + Sync because all access goes through the Mutex
unsafe impl Send for SqliteConnection {}
unsafe impl Sync for SqliteConnection {}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = error_message(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms.min(i32::MAX as u32) as c_int);
            }
        }

        let conn = Self {
            inner: Mutex::new(SqliteInner {
                db,
                depth: 0,
                last_insert_id: 0,
            }),
            path: config.path.clone(),
        };

        let pragma = if config.foreign_keys {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        conn.execute_raw(pragma)?;

        tracing::debug!(path = %conn.path, "opened sqlite database");
        Ok(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        // A panic while holding the lock leaves the handle itself intact.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute one or more `;`-separated statements without parameters
    /// (for DDL, pragmas, etc.).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        exec(inner.db, sql)
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> u64 {
        let inner = self.lock();
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(inner.db) };
        u64::try_from(changes).unwrap_or_default()
    }

    /// Current transaction nesting depth.
    pub fn transaction_depth(&self) -> usize {
        self.lock().depth
    }

    /// Prepare, bind and step a statement. Rows are collected when the
    /// statement produces any.
    fn run(&self, inner: &SqliteInner, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(sql = %sql, params = params.len(), "sqlite statement");
        let stmt = Statement::prepare(inner.db, sql)?;

        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(stmt.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                return Err(bind_error(inner.db, sql, i + 1));
            }
        }

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let mut col_names = Vec::with_capacity(col_count.max(0) as usize);
        for i in 0..col_count {
            // SAFETY: stmt is valid, i < col_count
            let name = unsafe { types::column_name(stmt.raw, i) }
                .unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
            match rc {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        values.push(unsafe { types::read_column(stmt.raw, i) });
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }

        Ok(rows)
    }

    fn savepoint_name(level: usize) -> String {
        format!("dbkit_{}", level)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid and no statements outlive their call
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let inner = self.lock();
        self.run(&inner, sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let inner = self.lock();
        self.run(&inner, sql, params)?;
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(inner.db) };
        Ok(u64::try_from(changes).unwrap_or_default())
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let mut inner = self.lock();
        self.run(&inner, sql, params)?;
        // SAFETY: db is valid
        let id = unsafe { ffi::sqlite3_last_insert_rowid(inner.db) };
        inner.last_insert_id = id;
        Ok(id)
    }

    fn last_insert_id(&self) -> i64 {
        self.lock().last_insert_id
    }

    fn begin(&self) -> Result<()> {
        let mut inner = self.lock();
        let sql = if inner.depth == 0 {
            "BEGIN".to_string()
        } else {
            format!("SAVEPOINT {}", Self::savepoint_name(inner.depth))
        };
        exec(inner.db, &sql).map_err(|e| savepoint_error(inner.depth, e))?;
        inner.depth += 1;
        tracing::debug!(depth = inner.depth, "transaction begin");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.lock();
        let sql = match inner.depth {
            0 => return Err(not_active("commit")),
            1 => "COMMIT".to_string(),
            depth => format!("RELEASE SAVEPOINT {}", Self::savepoint_name(depth - 1)),
        };
        exec(inner.db, &sql)?;
        inner.depth -= 1;
        tracing::debug!(depth = inner.depth, "transaction commit");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut inner = self.lock();
        let sql = match inner.depth {
            0 => return Err(not_active("rollback")),
            1 => "ROLLBACK".to_string(),
            depth => {
                let name = Self::savepoint_name(depth - 1);
                format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}")
            }
        };
        exec(inner.db, &sql)?;
        inner.depth -= 1;
        tracing::debug!(depth = inner.depth, "transaction rollback");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.lock().depth > 0
    }
}

/// A prepared statement, finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
}

impl Statement {
    fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(step_error(db, sql));
        }
        if raw.is_null() {
            return Err(Error::Query(QueryError {
                sql: Some(sql.to_string()),
                ..QueryError::new(QueryErrorKind::Syntax, "empty statement")
            }));
        }
        Ok(Self { raw })
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: raw came from a successful prepare and is finalized once
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

fn exec(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    tracing::debug!(sql = %sql, "sqlite exec");
    let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

    if rc == ffi::SQLITE_OK {
        return Ok(());
    }

    let mut error = step_error(db, sql);
    if !errmsg.is_null() {
        // SAFETY: errmsg was allocated by sqlite3_exec
        unsafe {
            if let Error::Query(q) = &mut error {
                q.message = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
            }
            ffi::sqlite3_free(errmsg.cast());
        }
    }
    Err(error)
}

/// # Safety
/// `db` must be a valid handle.
unsafe fn error_message(db: *mut ffi::sqlite3) -> String {
    // SAFETY: guaranteed by the caller
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        if ptr.is_null() {
            String::new()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

fn null_byte_error(sql: &str) -> Error {
    Error::Query(QueryError {
        sql: Some(sql.to_string()),
        ..QueryError::new(QueryErrorKind::Syntax, "SQL contains null byte")
    })
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: usize) -> Error {
    // SAFETY: db is valid
    let msg = unsafe { error_message(db) };
    Error::Query(QueryError {
        sql: Some(sql.to_string()),
        ..QueryError::new(
            QueryErrorKind::Database,
            format!("Failed to bind parameter {}: {}", param_index, msg),
        )
    })
}

/// Build an error from the handle's current error state.
///
/// The extended result code is kept as the error code; constraint failures
/// also carry the matching SQLSTATE.
fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code, extended) = unsafe {
        (
            error_message(db),
            ffi::sqlite3_errcode(db),
            ffi::sqlite3_extended_errcode(db),
        )
    };

    let sqlstate = match extended {
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some("23503"),
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some("23505"),
        _ => None,
    };

    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        sqlstate: sqlstate.map(str::to_string),
        code: Some(extended),
        message: msg,
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

fn not_active(operation: &str) -> Error {
    Error::Transaction(TransactionError {
        kind: TransactionErrorKind::NotActive,
        message: format!("cannot {} without an open transaction", operation),
    })
}

fn savepoint_error(depth: usize, error: Error) -> Error {
    if depth == 0 {
        return error;
    }
    Error::Transaction(TransactionError {
        kind: TransactionErrorKind::Savepoint,
        message: format!("failed to open savepoint at depth {}: {}", depth, error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
            .unwrap();
        conn
    }

    fn count(conn: &SqliteConnection) -> i64 {
        let rows = conn.query("SELECT COUNT(*) AS n FROM users", &[]).unwrap();
        rows[0].get_named::<i64>("n").unwrap()
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert_eq!(conn.dialect(), Dialect::Sqlite);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_query_with_params() {
        let conn = users();
        conn.execute(
            "INSERT INTO users (name, age) VALUES (?1, ?2), (?3, ?4)",
            &[
                Value::Text("Alice".into()),
                Value::Int(30),
                Value::Text("Bob".into()),
                Value::Null,
            ],
        )
        .unwrap();

        let rows = conn
            .query("SELECT id, name, age FROM users WHERE name = ?1", &[Value::Text("Bob".into())])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Bob");
        assert_eq!(rows[0].get_by_name("age"), Some(&Value::Null));
        assert_eq!(
            rows[0].column_names().collect::<Vec<_>>(),
            ["id", "name", "age"]
        );
    }

    #[test]
    fn test_insert_returns_rowid() {
        let conn = users();
        let first = conn
            .insert("INSERT INTO users (name) VALUES (?1)", &[Value::Text("a".into())])
            .unwrap();
        let second = conn.insert_row("users", &["name"], vec![Value::Text("b".into())]).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(conn.last_insert_id(), 2);

        conn.execute_raw("CREATE TABLE counters (id INTEGER PRIMARY KEY)")
            .unwrap();
        assert_eq!(conn.insert_row("counters", &[], Vec::new()).unwrap(), 1);
    }

    #[test]
    fn test_execute_reports_changes() {
        let conn = users();
        conn.execute_raw("INSERT INTO users (name) VALUES ('a'); INSERT INTO users (name) VALUES ('b')")
            .unwrap();
        let changed = conn.update_rows("users", &["age"], vec![Value::Int(9)], "").unwrap();
        assert_eq!(changed, 2);
        assert_eq!(conn.delete_rows("users", "name = 'a'").unwrap(), 1);
        assert_eq!(conn.changes(), 1);
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let conn = users();
        conn.begin().unwrap();
        conn.execute("INSERT INTO users (name) VALUES ('a')", &[]).unwrap();
        conn.rollback().unwrap();
        assert_eq!(count(&conn), 0);

        conn.begin().unwrap();
        conn.execute("INSERT INTO users (name) VALUES ('a')", &[]).unwrap();
        conn.commit().unwrap();
        assert_eq!(count(&conn), 1);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_nested_rollback_keeps_outer_work() {
        let conn = users();
        conn.begin().unwrap();
        conn.execute("INSERT INTO users (name) VALUES ('outer')", &[]).unwrap();

        conn.begin().unwrap();
        assert_eq!(conn.transaction_depth(), 2);
        conn.execute("INSERT INTO users (name) VALUES ('inner')", &[]).unwrap();
        conn.rollback().unwrap();

        assert!(conn.in_transaction());
        conn.commit().unwrap();
        let rows = conn.query("SELECT name FROM users", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "outer");
    }

    #[test]
    fn test_commit_without_transaction() {
        let conn = users();
        let err = conn.commit().unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                ..
            })
        ));
        assert!(conn.rollback().is_err());
    }

    #[test]
    fn test_foreign_key_violation_is_tagged() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE teams (id INTEGER PRIMARY KEY);
             CREATE TABLE players (id INTEGER PRIMARY KEY,
                 team_id INTEGER NOT NULL REFERENCES teams(id));
             INSERT INTO teams (id) VALUES (1);
             INSERT INTO players (team_id) VALUES (1);",
        )
        .unwrap();

        let err = conn.execute("DELETE FROM teams WHERE id = 1", &[]).unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Constraint);
                assert_eq!(q.sqlstate.as_deref(), Some("23503"));
                assert_eq!(q.code, Some(787));
                assert!(q.is_foreign_key_violation(1451));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_foreign_keys_can_be_disabled() {
        let conn = SqliteConnection::open(&SqliteConfig::memory().foreign_keys(false)).unwrap();
        let rows = conn.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(rows[0].get_as::<i64>(0).unwrap(), 0);

        conn.execute_raw(
            "CREATE TABLE teams (id INTEGER PRIMARY KEY);
             CREATE TABLE players (id INTEGER PRIMARY KEY,
                 team_id INTEGER REFERENCES teams(id));",
        )
        .unwrap();
        conn.execute("INSERT INTO players (team_id) VALUES (7)", &[])
            .unwrap();

        let enforced = SqliteConnection::open_memory().unwrap();
        let rows = enforced.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(rows[0].get_as::<i64>(0).unwrap(), 1);
    }

    #[test]
    fn test_syntax_error() {
        let conn = users();
        let err = conn.query("SELEKT 1", &[]).unwrap_err();
        assert!(matches!(err, Error::Query(ref q) if q.sql.as_deref() == Some("SELEKT 1")));
    }

    #[test]
    fn test_value_round_trip() {
        let conn = SqliteConnection::open_memory().unwrap();
        let rows = conn
            .query(
                "SELECT ?1 AS b, ?2 AS big, ?3 AS f, ?4 AS blob, ?5 AS d",
                &[
                    Value::Bool(true),
                    Value::BigInt(i64::MAX),
                    Value::Double(1.5),
                    Value::Bytes(vec![1, 2]),
                    Value::Date(0),
                ],
            )
            .unwrap();
        let row = &rows[0];
        assert_eq!(row.get_by_name("b"), Some(&Value::Int(1)));
        assert_eq!(row.get_by_name("big"), Some(&Value::BigInt(i64::MAX)));
        assert_eq!(row.get_by_name("f"), Some(&Value::Double(1.5)));
        assert_eq!(row.get_by_name("blob"), Some(&Value::Bytes(vec![1, 2])));
        assert_eq!(row.get_by_name("d"), Some(&Value::Text("1970-01-01".into())));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let path = path.to_string_lossy().into_owned();
        {
            let conn = SqliteConnection::open_file(path.clone()).unwrap();
            conn.execute_raw("CREATE TABLE t (v TEXT); INSERT INTO t (v) VALUES ('kept')")
                .unwrap();
        }
        let config = SqliteConfig::file(path).busy_timeout(250);
        assert_eq!(config.busy_timeout_ms, 250);
        let conn = SqliteConnection::open(&config).unwrap();
        let rows = conn.query("SELECT v FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_named::<String>("v").unwrap(), "kept");
    }
}
