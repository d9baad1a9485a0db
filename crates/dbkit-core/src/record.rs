//! The record capability: table-bound entities with relations.
//!
//! [`Entity`] is the object-safe half. It lets generic code (path access,
//! relation-default propagation, cascading saves) walk a graph of related
//! records without knowing their concrete types. [`Record`] adds the static
//! metadata and row hydration, and is normally derived with
//! `#[derive(Record)]`.

use std::fmt;
use std::str::FromStr;

use crate::Result;
use crate::error::{ArgumentError, Error, ValidationError};
use crate::field::FieldInfo;
use crate::relationship::{RelationInfo, find_relation};
use crate::row::Row;
use crate::value::Value;

/// Separator between the segments of a field path.
pub const PATH_SEPARATOR: char = '.';

/// Runtime access to a record and the records attached to it.
pub trait Entity {
    /// The table this record is stored in.
    fn table(&self) -> &'static str;

    /// The Rust type name, used in diagnostics.
    fn type_name(&self) -> &'static str;

    /// The primary key field name.
    fn primary_key(&self) -> &'static str;

    /// Persisted fields, in declaration order.
    fn field_infos(&self) -> &'static [FieldInfo];

    /// Declared relations.
    fn relations(&self) -> &'static [RelationInfo];

    /// Read a persisted field by Rust or column name.
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Assign a persisted field by Rust or column name.
    #[allow(clippy::result_large_err)]
    fn set_field(&mut self, name: &str, value: Value) -> Result<()>;

    /// The records attached through a relation.
    ///
    /// `None` if the record has no such relation; an empty list if nothing
    /// is attached.
    fn related(&self, relation: &str) -> Option<Vec<&dyn Entity>>;

    /// Mutable access to the records attached through a relation.
    fn related_mut(&mut self, relation: &str) -> Option<Vec<&mut dyn Entity>>;

    /// Hydrate fetched rows and attach them through a relation.
    #[allow(clippy::result_large_err)]
    fn load_related(&mut self, relation: &str, rows: &[Row]) -> Result<()>;

    /// Detach whatever is attached through a relation. Nothing stored is
    /// touched. Returns `false` for an unknown relation.
    fn unset_related(&mut self, relation: &str) -> bool;

    /// Record-specific validation run before every save.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Ok(())
    }

    /// The primary key value, if set.
    fn id(&self) -> Option<Value> {
        self.get_field(self.primary_key()).filter(|v| !v.is_null())
    }

    /// Has this record never been stored (no primary key value)?
    fn is_new(&self) -> bool {
        self.id().is_none_or(|v| v.is_falsy())
    }

    /// Column/value pairs of every persisted field, in declaration order.
    fn to_values(&self) -> Vec<(&'static str, Value)> {
        self.field_infos()
            .iter()
            .map(|f| (f.column_name, self.get_field(f.name).unwrap_or(Value::Null)))
            .collect()
    }

    /// JSON snapshot of the persisted fields, keyed by field name.
    fn snapshot(&self) -> serde_json::Value {
        let map = self
            .field_infos()
            .iter()
            .map(|f| {
                let value = self.get_field(f.name).unwrap_or(Value::Null);
                (f.name.to_string(), value.to_json())
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// A record type bound to one table.
///
/// # Example
///
/// ```ignore
/// use dbkit::prelude::*;
///
/// #[derive(Record, Debug, Default)]
/// #[record(table = "posts")]
/// struct Post {
///     id: Option<i64>,
///     title: String,
///     author_id: Option<i64>,
///     #[record(relation(kind = "belongs_to", local_key = "author_id"))]
///     author: Related<Author>,
/// }
/// ```
pub trait Record: Entity + Sized + Send + Sync {
    /// The name of the database table.
    const TABLE: &'static str;

    /// Short alias used when the table is joined.
    const ALIAS: Option<&'static str> = None;

    /// The primary key field name.
    const PRIMARY_KEY: &'static str = "id";

    /// Relation metadata for this record type.
    const RELATIONS: &'static [RelationInfo] = &[];

    /// Persisted fields, in declaration order.
    fn fields() -> &'static [FieldInfo];

    /// Construct a record from a database row.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Names of the persisted fields.
    fn field_names() -> Vec<&'static str> {
        Self::fields().iter().map(|f| f.name).collect()
    }

    /// Read a value through a `.`-separated path such as `author.name`.
    ///
    /// Returns `Ok(None)` when a relation along the path has nothing attached.
    #[allow(clippy::result_large_err)]
    fn get_path(&self, path: &str) -> Result<Option<Value>> {
        resolve_path(self, &path.parse()?)
    }

    /// Assign a value through a `.`-separated path such as `author.name`.
    #[allow(clippy::result_large_err)]
    fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        assign_path(self, &path.parse()?, value.into())
    }
}

/// A parsed field path: zero or more relation names followed by a field.
///
/// A segment following a collection relation is the index of the record
/// within it, e.g. `comments.0.body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Build a path from explicit selectors.
    #[allow(clippy::result_large_err)]
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(path_error("path is empty"));
        }
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(path_error(format!(
                "path '{}' has an empty segment",
                segments.join(".")
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(path_error("path is empty"));
        }
        Self::from_segments(s.split(PATH_SEPARATOR))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

fn path_error(message: impl Into<String>) -> Error {
    Error::Argument(ArgumentError::new("path", message))
}

/// Splits `segments` into the index into a relation's records and the rest.
#[allow(clippy::result_large_err)]
fn split_index<'a>(
    entity: &dyn Entity,
    relation: &str,
    segments: &'a [String],
) -> Result<(usize, &'a [String])> {
    let info = find_relation(entity.relations(), relation).ok_or_else(|| {
        path_error(format!(
            "{} has no relation '{}'",
            entity.type_name(),
            relation
        ))
    })?;

    let (index, rest) = if info.kind.is_collection() {
        let Some((first, rest)) = segments.split_first() else {
            return Err(path_error(format!("'{}' needs an index", relation)));
        };
        let index = first.parse::<usize>().map_err(|_| {
            path_error(format!("'{}' is not an index into '{}'", first, relation))
        })?;
        (index, rest)
    } else {
        (0, segments)
    };

    if rest.is_empty() {
        return Err(path_error(format!(
            "path ends at relation '{}' instead of a field",
            relation
        )));
    }
    Ok((index, rest))
}

/// Read the value a path points at.
#[allow(clippy::result_large_err)]
pub fn resolve_path(entity: &dyn Entity, path: &FieldPath) -> Result<Option<Value>> {
    resolve_segments(entity, path.segments())
}

fn resolve_segments(entity: &dyn Entity, segments: &[String]) -> Result<Option<Value>> {
    match segments {
        [] => Err(path_error("path is empty")),
        [field] => entity.get_field(field).map(Some).ok_or_else(|| {
            path_error(format!("{} has no field '{}'", entity.type_name(), field))
        }),
        [relation, rest @ ..] => {
            let (index, rest) = split_index(entity, relation, rest)?;
            let targets = entity.related(relation).unwrap_or_default();
            match targets.get(index) {
                Some(target) => resolve_segments(*target, rest),
                None => {
                    tracing::debug!(
                        record = entity.type_name(),
                        relation = relation.as_str(),
                        "path crosses a detached relation"
                    );
                    Ok(None)
                }
            }
        }
    }
}

/// Assign the value a path points at.
#[allow(clippy::result_large_err)]
pub fn assign_path(entity: &mut dyn Entity, path: &FieldPath, value: Value) -> Result<()> {
    assign_segments(entity, path.segments(), value)
}

fn assign_segments(entity: &mut dyn Entity, segments: &[String], value: Value) -> Result<()> {
    match segments {
        [] => Err(path_error("path is empty")),
        [field] => {
            if entity.get_field(field).is_none() {
                return Err(path_error(format!(
                    "{} has no field '{}'",
                    entity.type_name(),
                    field
                )));
            }
            entity.set_field(field, value)
        }
        [relation, rest @ ..] => {
            let (index, rest) = split_index(entity, relation, rest)?;
            let type_name = entity.type_name();
            let mut targets = entity.related_mut(relation).unwrap_or_default();
            if index >= targets.len() {
                return Err(path_error(format!(
                    "{}.{} has no attached record to assign through",
                    type_name, relation
                )));
            }
            let target = targets.swap_remove(index);
            assign_segments(target, rest, value)
        }
    }
}

/// Force each relation's default field values onto the records attached
/// through it.
#[allow(clippy::result_large_err)]
pub fn propagate_relation_defaults(entity: &mut dyn Entity) -> Result<()> {
    for relation in entity.relations() {
        if !relation.has_defaults() {
            continue;
        }
        let Some(targets) = entity.related_mut(relation.name) else {
            continue;
        };
        for target in targets {
            for default in relation.defaults {
                target.set_field(default.field, default.value.to_value())?;
            }
        }
    }
    Ok(())
}

/// Run the built-in required-field check and the record's own validation.
///
/// On failure the error carries a snapshot of the record and its type name.
pub fn validate_entity(entity: &dyn Entity) -> std::result::Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    for field in entity.field_infos() {
        if field.is_required() && entity.get_field(field.name).is_none_or(|v| v.is_null()) {
            errors.add_required(field.name);
        }
    }
    if let Err(custom) = entity.validate() {
        errors.extend(custom);
    }

    errors
        .into_result()
        .map_err(|e| e.with_record(entity.snapshot(), entity.type_name()))
}
