//! Error types for dbkit operations.

use std::fmt;

use crate::config::DbConfig;

/// The primary error type for all dbkit operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, close, lost handle)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction boundary misuse
    Transaction(TransactionError),
    /// A caller-side precondition was violated
    Argument(ArgumentError),
    /// A delete was blocked because the row is still referenced
    ForeignKeyDelete(QueryError),
    /// A record failed validation before it was persisted
    Validation(ValidationError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// The handle was already closed
    Disconnected,
    /// Too many connections for the current user
    ResourcesExceeded,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    /// Numeric error code reported by the driver
    pub code: Option<i32>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Database is busy or locked
    Busy,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Commit or rollback without an open transaction
    NotActive,
    /// Savepoint could not be created or released
    Savepoint,
}

/// A caller violated an operation's precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentError {
    /// Operation that rejected its input
    pub operation: &'static str,
    pub message: String,
}

impl ArgumentError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Validation failure for a record that was about to be saved.
///
/// Besides the per-field errors it carries a JSON snapshot of the record and
/// its type name, so the rendered message is enough to reproduce the failure.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The errors by field name (or "__record__" for record-level)
    pub errors: Vec<FieldValidationError>,
    /// Snapshot of the record at the time of the failure
    pub data: Option<serde_json::Value>,
    /// Type name of the rejected record
    pub type_name: Option<&'static str>,
}

/// A single validation error for a field.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// The field name that failed validation
    pub field: String,
    /// The kind of validation that failed
    pub kind: ValidationErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// The type of validation constraint that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required field is missing/null
    Required,
    /// Custom validation failed
    Custom,
    /// Record-level validation failed
    Record,
}

impl ValidationError {
    /// Create a new empty validation error container.
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            data: None,
            type_name: None,
        }
    }

    /// Check if there are any validation errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a field validation error.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Add a required field error.
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(
            field,
            ValidationErrorKind::Required,
            "is required".to_string(),
        );
    }

    /// Add a custom validation error.
    pub fn add_custom(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(field, ValidationErrorKind::Custom, message);
    }

    /// Add a record-level validation error.
    pub fn add_record_error(&mut self, message: impl Into<String>) {
        self.add("__record__", ValidationErrorKind::Record, message);
    }

    /// Merge the errors of another container into this one.
    pub fn extend(&mut self, other: ValidationError) {
        self.errors.extend(other.errors);
    }

    /// Attach the record snapshot and type name used in the rendered message.
    #[must_use]
    pub fn with_record(mut self, data: serde_json::Value, type_name: &'static str) -> Self {
        self.data = Some(data);
        self.type_name = Some(type_name);
        self
    }

    /// Convert to Result, returning Ok(()) if no errors, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

impl Error {
    /// Get SQLSTATE if available (e.g., "23503" for foreign key violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) | Error::ForeignKeyDelete(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the driver error code if available
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Query(q) | Error::ForeignKeyDelete(q) => q.code,
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) | Error::ForeignKeyDelete(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Is this a "row still referenced" failure?
    pub fn is_foreign_key_delete(&self) -> bool {
        matches!(self, Error::ForeignKeyDelete(_))
    }

    /// Did the server refuse work because a per-user resource limit was hit?
    pub fn is_resources_exceeded(&self) -> bool {
        match self {
            Error::Query(q) => q.is_resources_exceeded(),
            Error::Connection(c) => c.kind == ConnectionErrorKind::ResourcesExceeded,
            _ => false,
        }
    }

    /// Reclassify a foreign key violation as [`Error::ForeignKeyDelete`].
    ///
    /// `fk_code` is the driver error code that signals the violation; any
    /// other error is returned unchanged.
    #[must_use]
    pub fn into_foreign_key_delete(self, fk_code: i32) -> Self {
        match self {
            Error::Query(q) if q.is_foreign_key_violation(fk_code) => Error::ForeignKeyDelete(q),
            other => other,
        }
    }
}

impl QueryError {
    /// Build a query error carrying only a kind and a message.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            sqlstate: None,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }

    /// Is this a foreign key violation?
    ///
    /// Matches SQLSTATE 23503 or the given driver-specific code.
    pub fn is_foreign_key_violation(&self, fk_code: i32) -> bool {
        self.sqlstate.as_deref() == Some("23503") || self.code == Some(fk_code)
    }

    pub fn is_resources_exceeded(&self) -> bool {
        self.code == Some(DbConfig::ERROR_CODE_TOO_MANY_USER_CONNECTIONS)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Argument(e) => write!(f, "Invalid argument to {}: {}", e.operation, e.message),
            Error::ForeignKeyDelete(e) => {
                write!(f, "Cannot delete, row is still referenced: {}", e.message)
            }
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) | Error::ForeignKeyDelete(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "validation passed")?;
        } else {
            let details: Vec<String> = self
                .errors
                .iter()
                .map(|err| format!("'{}' {}", err.field, err.message))
                .collect();
            write!(f, "{}", details.join("; "))?;
        }

        if let Some(data) = &self.data {
            write!(f, ", data: {}", data)?;
        }
        if let Some(type_name) = self.type_name {
            write!(f, ", class: {}", type_name)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<ArgumentError> for Error {
    fn from(err: ArgumentError) -> Self {
        Error::Argument(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for dbkit operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn fk_query_error(sqlstate: Option<&str>, code: Option<i32>) -> QueryError {
        QueryError {
            kind: QueryErrorKind::Constraint,
            sql: Some("DELETE FROM authors WHERE id = 1".to_string()),
            sqlstate: sqlstate.map(str::to_string),
            code,
            message: "FOREIGN KEY constraint failed".to_string(),
            source: None,
        }
    }

    #[test]
    fn test_sqlstate_helpers() {
        let mut query = fk_query_error(Some("23505"), None);
        query.message = "unique violation".to_string();

        assert!(query.is_unique_violation());
        assert!(!query.is_foreign_key_violation(DbConfig::ERROR_CODE_FK_CONSTRAINT_FAIL));

        let err = Error::Query(query);
        assert_eq!(err.sqlstate(), Some("23505"));
        assert_eq!(err.sql(), Some("DELETE FROM authors WHERE id = 1"));
    }

    #[test]
    fn test_foreign_key_reclassification_by_code() {
        let err = Error::Query(fk_query_error(None, Some(1451)));
        let err = err.into_foreign_key_delete(DbConfig::ERROR_CODE_FK_CONSTRAINT_FAIL);
        assert!(err.is_foreign_key_delete());
        assert_eq!(err.code(), Some(1451));
    }

    #[test]
    fn test_foreign_key_reclassification_by_sqlstate() {
        let err = Error::Query(fk_query_error(Some("23503"), Some(787)));
        assert!(err.into_foreign_key_delete(1451).is_foreign_key_delete());
    }

    #[test]
    fn test_other_errors_pass_through_reclassification() {
        let err = Error::Query(QueryError::new(QueryErrorKind::Syntax, "near \"FORM\""));
        let err = err.into_foreign_key_delete(1451);
        assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Syntax));
    }

    #[test]
    fn test_resources_exceeded() {
        let mut query = QueryError::new(QueryErrorKind::Database, "too many connections");
        query.code = Some(1226);
        assert!(Error::Query(query).is_resources_exceeded());
        assert!(!Error::Custom("x".to_string()).is_resources_exceeded());
    }

    #[test]
    fn test_validation_message_includes_snapshot_and_type() {
        let mut err = ValidationError::new();
        err.add_required("title");
        let err = err.with_record(serde_json::json!({"id": 3, "title": null}), "Post");

        assert_eq!(
            err.to_string(),
            r#"'title' is required, data: {"id":3,"title":null}, class: Post"#
        );
    }

    #[test]
    fn test_validation_errors_merge() {
        let mut err = ValidationError::new();
        assert!(err.clone().into_result().is_ok());

        let mut custom = ValidationError::new();
        custom.add_custom("name", "must not be blank");
        custom.add_record_error("starts after it ends");
        err.add_required("title");
        err.extend(custom);

        let kinds: Vec<ValidationErrorKind> = err.errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ValidationErrorKind::Required,
                ValidationErrorKind::Custom,
                ValidationErrorKind::Record,
            ]
        );
        assert_eq!(
            err.to_string(),
            "'title' is required; 'name' must not be blank; '__record__' starts after it ends"
        );
    }

    #[test]
    fn test_argument_error_display() {
        let err = Error::from(ArgumentError::new("value", "the query must request a single column"));
        assert_eq!(
            err.to_string(),
            "Invalid argument to value: the query must request a single column"
        );
    }
}
