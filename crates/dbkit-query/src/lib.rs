//! SQL text construction for dbkit.
//!
//! `dbkit-query` is the **statement layer**. It turns values, condition maps
//! and record metadata into SQL for a given [`Dialect`](dbkit_core::Dialect):
//!
//! - **Escaping**: `escape`, `literal`, and the storage normalization used
//!   before values are written.
//! - **Where clauses**: `Conditions` maps and the `Filter` accepted by
//!   updates and deletes.
//! - **Inserts**: multi-row and upsert statements for bulk writes.
//! - **Selects**: the `Select` query descriptor executed by the service.

pub mod clause;
pub mod escape;
pub mod insert;
pub mod select;
pub mod where_clause;

pub use clause::{OrderBy, OrderDirection};
pub use escape::{escape, is_numeric, literal, to_storage, to_storage_map};
pub use insert::{InsertRow, InsertStatement};
pub use select::{QueryDescriptor, RawQuery, Select};
pub use where_clause::{Conditions, Filter, where_clause};
