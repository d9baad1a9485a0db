//! Relation metadata and the containers holding related records.
//!
//! Relations are declared at compile time (via the derive macro) as static
//! metadata on each record type. A relation may carry `defaults`: field
//! values that every related row reached through it must have. Fetches
//! through the relation filter on them and saves force them onto attached
//! related records, so reads and writes agree.

use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The type of association between two record types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationKind {
    /// The owner holds the foreign key: a `Post` belongs to an `Author`.
    #[default]
    BelongsTo,
    /// The related record holds the foreign key: an `Author` has one `Profile`.
    HasOne,
    /// The related records hold the foreign key: an `Author` has many `Post`s.
    HasMany,
    /// Association through a link table: `Post`s have many `Tag`s.
    HasManyToMany,
}

impl RelationKind {
    /// Does this relation hold a list of records?
    pub const fn is_collection(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::HasManyToMany)
    }

    /// Parse the attribute spelling (`belongs_to`, `has_one`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "belongs_to" => Some(RelationKind::BelongsTo),
            "has_one" => Some(RelationKind::HasOne),
            "has_many" => Some(RelationKind::HasMany),
            "has_many_to_many" => Some(RelationKind::HasManyToMany),
            _ => None,
        }
    }
}

/// Information about a link table for many-to-many relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTableInfo {
    /// The link table name (e.g., `"post_tags"`).
    pub table_name: &'static str,

    /// Column in the link table matching the owner's key (e.g., `"post_id"`).
    pub local_column: &'static str,

    /// Column in the link table matching the related key (e.g., `"tag_id"`).
    pub remote_column: &'static str,
}

impl LinkTableInfo {
    #[must_use]
    pub const fn new(
        table_name: &'static str,
        local_column: &'static str,
        remote_column: &'static str,
    ) -> Self {
        Self {
            table_name,
            local_column,
            remote_column,
        }
    }
}

/// A literal value a relation default pins a field to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Text(&'static str),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            DefaultValue::Text(s) => Value::Text(s.to_string()),
            DefaultValue::Int(v) => Value::BigInt(v),
            DefaultValue::Float(v) => Value::Double(v),
            DefaultValue::Bool(v) => Value::Bool(v),
        }
    }
}

/// One `field = value` pair of a relation's `defaults`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationDefault {
    pub field: &'static str,
    pub value: DefaultValue,
}

impl RelationDefault {
    pub const fn new(field: &'static str, value: DefaultValue) -> Self {
        Self { field, value }
    }
}

/// Metadata about a relation between record types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationInfo {
    /// Name (alias) of the relation; also the field holding the related records.
    pub name: &'static str,

    /// The related record's table name.
    pub related_table: &'static str,

    /// Kind of relation.
    pub kind: RelationKind,

    /// Column on the owner side of the join.
    ///
    /// The foreign key for `BelongsTo`, the owner's key otherwise.
    pub local_key: &'static str,

    /// Column on the related side of the join.
    ///
    /// The referenced key for `BelongsTo`, the foreign key for `HasOne` and
    /// `HasMany`, the related key for `HasManyToMany`.
    pub remote_key: &'static str,

    /// Link table for many-to-many relations.
    pub link_table: Option<LinkTableInfo>,

    /// Extra raw SQL condition applied when fetching through the relation.
    pub conditions: Option<&'static str>,

    /// Field values pinned on every related record.
    pub defaults: &'static [RelationDefault],
}

impl RelationInfo {
    /// Create a relation joining `id` to `id`; set the keys with the builder.
    #[must_use]
    pub const fn new(name: &'static str, related_table: &'static str, kind: RelationKind) -> Self {
        Self {
            name,
            related_table,
            kind,
            local_key: "id",
            remote_key: "id",
            link_table: None,
            conditions: None,
            defaults: &[],
        }
    }

    #[must_use]
    pub const fn local_key(mut self, key: &'static str) -> Self {
        self.local_key = key;
        self
    }

    #[must_use]
    pub const fn remote_key(mut self, key: &'static str) -> Self {
        self.remote_key = key;
        self
    }

    /// Set the link table (many-to-many).
    #[must_use]
    pub const fn link_table(mut self, info: LinkTableInfo) -> Self {
        self.link_table = Some(info);
        self
    }

    #[must_use]
    pub const fn conditions(mut self, sql: &'static str) -> Self {
        self.conditions = Some(sql);
        self
    }

    /// Field values forced onto related records and required when fetching.
    #[must_use]
    pub const fn defaults(mut self, defaults: &'static [RelationDefault]) -> Self {
        self.defaults = defaults;
        self
    }

    pub const fn has_defaults(&self) -> bool {
        !self.defaults.is_empty()
    }

    /// Column/value pairs a fetch through this relation must match.
    pub fn fetch_conditions(&self) -> Vec<(&'static str, Value)> {
        self.defaults
            .iter()
            .map(|d| (d.field, d.value.to_value()))
            .collect()
    }
}

/// Find a relation by name.
pub fn find_relation(
    relations: &'static [RelationInfo],
    name: &str,
) -> Option<&'static RelationInfo> {
    relations.iter().find(|r| r.name == name)
}

/// A related single record (belongs-to or has-one).
///
/// States:
/// - **Unloaded**: nothing attached and nothing fetched yet
/// - **Missing**: fetched, but no related row exists
/// - **Attached**: a record is held, either fetched or assigned by the caller
pub struct Related<T> {
    record: Option<Box<T>>,
    fetched: bool,
}

impl<T> Related<T> {
    /// Create an empty relation (nothing attached).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            record: None,
            fetched: false,
        }
    }

    /// Create with an attached record.
    #[must_use]
    pub fn loaded(record: T) -> Self {
        Self {
            record: Some(Box::new(record)),
            fetched: true,
        }
    }

    /// The attached record, if any.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.record.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.record.as_deref_mut()
    }

    /// Attach a record, replacing any previous one.
    pub fn set(&mut self, record: T) {
        self.record = Some(Box::new(record));
        self.fetched = true;
    }

    /// Record the outcome of a fetch; `None` means no related row exists.
    pub fn set_loaded(&mut self, record: Option<T>) {
        self.record = record.map(Box::new);
        self.fetched = true;
    }

    /// Detach the record without touching anything stored.
    pub fn take(&mut self) -> Option<T> {
        self.fetched = false;
        self.record.take().map(|boxed| *boxed)
    }

    /// Has the relation been fetched or assigned (including fetched-as-null)?
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.fetched
    }

    /// Is nothing attached?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record.is_none()
    }
}

impl<T> Default for Related<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Clone> Clone for Related<T> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
            fetched: self.fetched,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Related<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (&self.record, self.fetched) {
            (Some(_), _) => "attached",
            (None, true) => "missing",
            (None, false) => "unloaded",
        };

        f.debug_struct("Related")
            .field("state", &state)
            .field("record", &self.get())
            .finish()
    }
}

impl<T: Serialize> Serialize for Related<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.get() {
            Some(record) => record.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Related<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let opt = Option::<T>::deserialize(deserializer)?;
        Ok(match opt {
            Some(record) => Self::loaded(record),
            None => Self::empty(),
        })
    }
}

/// A collection of related records (has-many or many-to-many).
pub struct RelatedMany<T> {
    records: Vec<T>,
    fetched: bool,
}

impl<T> RelatedMany<T> {
    /// Create an unloaded, empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            fetched: false,
        }
    }

    /// Create with attached records.
    #[must_use]
    pub fn loaded(records: Vec<T>) -> Self {
        Self {
            records,
            fetched: true,
        }
    }

    /// The attached records, if the collection was fetched or assigned.
    #[must_use]
    pub fn get(&self) -> Option<&[T]> {
        self.fetched.then_some(self.records.as_slice())
    }

    /// Attach one more record.
    pub fn push(&mut self, record: T) {
        self.records.push(record);
        self.fetched = true;
    }

    /// Replace the attached records.
    pub fn set_loaded(&mut self, records: Vec<T>) {
        self.records = records;
        self.fetched = true;
    }

    /// Detach every record without touching anything stored.
    pub fn clear(&mut self) {
        self.records.clear();
        self.fetched = false;
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.fetched
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.records.iter_mut()
    }
}

impl<T> Default for RelatedMany<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for RelatedMany<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            fetched: self.fetched,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RelatedMany<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelatedMany")
            .field("loaded", &self.fetched)
            .field("records", &self.records)
            .finish()
    }
}

impl<T: Serialize> Serialize for RelatedMany<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RelatedMany<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::loaded(Vec::<T>::deserialize(deserializer)?))
    }
}

impl<'a, T> IntoIterator for &'a RelatedMany<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
