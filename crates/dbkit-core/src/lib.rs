//! Core types and traits for dbkit.
//!
//! This crate provides the foundational abstractions shared by the query
//! writer, the drivers and the service layer:
//!
//! - `Value`, `Row` and `Key` for cells, result rows and map keys
//! - `Entity` and `Record` for table-bound records with relations
//! - `Connection` for synchronous database connections
//! - `Error` and the configuration constants

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod field;
pub mod key;
pub mod record;
pub mod relationship;
pub mod row;
pub mod temporal;
pub mod value;

pub use config::{DbConfig, Environment, ServiceConfig};
pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{
    ArgumentError, ConfigError, ConnectionError, ConnectionErrorKind, Error,
    FieldValidationError, QueryError, QueryErrorKind, Result, TransactionError,
    TransactionErrorKind, TypeError, ValidationError, ValidationErrorKind,
};
pub use field::{FieldInfo, find_field};
pub use key::Key;
pub use record::{
    Entity, FieldPath, PATH_SEPARATOR, Record, assign_path, propagate_relation_defaults,
    resolve_path, validate_entity,
};
pub use relationship::{
    DefaultValue, LinkTableInfo, Related, RelatedMany, RelationDefault, RelationInfo,
    RelationKind, find_relation,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
