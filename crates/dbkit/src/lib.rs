//! dbkit - result shaping, bulk writes and record helpers over relational
//! databases.
//!
//! dbkit sits on top of a synchronous [`Connection`] and provides:
//!
//! - Result shaping: maps, nested maps, lists and scalars built from a query
//!   in row order (`assoc`, `keyed_assoc`, `table`, `values`, ...)
//! - Bulk writes: chunked multi-row INSERTs inside one transaction, upserts,
//!   filtered updates and deletes that refuse to run without a filter
//! - Records: `#[derive(Record)]` types with relations, relation defaults,
//!   dotted path access, static lookups and cascading saves
//!
//! # Quick Start
//!
//! ```ignore
//! use dbkit::prelude::*;
//!
//! #[derive(Record, Debug, Default)]
//! #[record(table = "authors")]
//! struct Author {
//!     id: Option<i64>,
//!     name: String,
//!     status: Option<String>,
//! }
//!
//! #[derive(Record, Debug, Default)]
//! #[record(table = "posts")]
//! struct Post {
//!     id: Option<i64>,
//!     title: String,
//!     author_id: Option<i64>,
//!     #[record(relation(kind = "belongs_to", defaults(status = "active")))]
//!     author: Related<Author>,
//! }
//!
//! let db = DbService::new(SqliteConnection::open_memory()?);
//!
//! let mut post = Post { title: "Hello".into(), ..Post::default() };
//! post.author.set(Author { name: "Ada".into(), ..Author::default() });
//! post.save(&db)?;
//!
//! let titles = db.assoc(&Select::from("posts").columns(&["id", "title"]))?;
//! let name = post.get_path("author.name")?;
//! ```

pub mod records;
pub mod service;
pub mod shape;

pub use dbkit_core::{
    ArgumentError, ColumnInfo, Connection, DbConfig, DefaultValue, Dialect, Entity, Environment,
    Error, FieldInfo, FieldPath, FromValue, Key, LinkTableInfo, QueryError, QueryErrorKind,
    Record, Related, RelatedMany, RelationDefault, RelationInfo, RelationKind, Result, Row,
    ServiceConfig, TransactionError, ValidationError, Value, temporal,
};
pub use dbkit_macros::Record;
pub use dbkit_query::{
    Conditions, Filter, InsertRow, InsertStatement, OrderBy, OrderDirection, QueryDescriptor,
    RawQuery, Select, escape, is_numeric, literal, to_storage, to_storage_map, where_clause,
};
#[cfg(feature = "sqlite")]
pub use dbkit_sqlite::{SqliteConfig, SqliteConnection};

pub use records::RecordExt;
pub use service::DbService;
pub use shape::{RecordList, RecordMap, RowMap};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Conditions, Connection, DbService, Entity, Error, Filter, InsertRow, Key, OrderBy,
        RawQuery, Record, RecordExt, Related, RelatedMany, Result, Row, Select, Value,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteConnection;
}
