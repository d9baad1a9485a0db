//! Lookups, saving and deleting for every [`Record`] type.

use dbkit_core::{
    Connection, Entity, Error, Record, RelationInfo, RelationKind, Result, Value, find_field,
    propagate_relation_defaults, validate_entity,
};
use dbkit_query::{Conditions, OrderBy, Select};

use crate::service::{DbService, pk_column};
use crate::shape::{self, Assoc};

/// Table-level helpers available on every record type.
///
/// # Example
///
/// ```ignore
/// let ada = Author::get_by_name(&db, "Ada")?;
/// let mut post = Post { title: "Hello".into(), ..Post::default() };
/// post.author.set(ada.unwrap());
/// post.save(&db)?;
/// ```
#[allow(clippy::result_large_err)]
pub trait RecordExt: Record {
    /// Records matching `select`.
    fn find<C: Connection>(db: &DbService<C>, select: &Select) -> Result<Vec<Self>> {
        db.objects(select)
    }

    /// Every stored record of this type.
    fn find_all<C: Connection>(db: &DbService<C>) -> Result<Vec<Self>> {
        db.objects(&Select::record::<Self>())
    }

    /// The first record matching `select`.
    fn find_first<C: Connection>(db: &DbService<C>, select: &Select) -> Result<Option<Self>> {
        db.object(&select.clone().limit(1))
    }

    /// First column to second column of every row `select` fetches,
    /// typically `id -> name`.
    fn find_assoc<C: Connection>(db: &DbService<C>, select: &Select) -> Result<Assoc> {
        shape::assoc(db.fetch(select)?)
    }

    /// The record with the given primary key. A falsy id finds nothing
    /// without querying.
    fn get_by_id<C: Connection>(db: &DbService<C>, id: impl Into<Value>) -> Result<Option<Self>> {
        let id = id.into();
        if id.is_falsy() {
            return Ok(None);
        }
        db.object(
            &Select::record::<Self>()
                .filter_eq(pk_column::<Self>(), id)
                .limit(1),
        )
    }

    /// The records with the given primary keys. No ids finds nothing without
    /// querying.
    fn get_by_id_list<C, I, V>(db: &DbService<C>, ids: I) -> Result<Vec<Self>>
    where
        C: Connection,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        db.objects(&Select::record::<Self>().filter_in(pk_column::<Self>(), ids))
    }

    /// The first record whose `name` is `name`.
    fn get_by_name<C: Connection>(db: &DbService<C>, name: &str) -> Result<Option<Self>> {
        db.object(
            &Select::record::<Self>()
                .filter_eq(name_column::<Self>(), name)
                .limit(1),
        )
    }

    /// Every record's `name`.
    fn get_name_list<C: Connection>(db: &DbService<C>) -> Result<Vec<Value>> {
        db.values(&Select::record::<Self>().columns(&[name_column::<Self>()]), false)
    }

    /// `id -> name` ordered by name.
    fn get_name_map<C: Connection>(db: &DbService<C>) -> Result<Assoc> {
        let name = name_column::<Self>();
        db.assoc(
            &Select::record::<Self>()
                .columns(&[pk_column::<Self>(), name])
                .order_by(OrderBy::asc(name)),
        )
    }

    /// Detach whatever is attached through `relation` without touching the
    /// stored rows.
    fn unset_relation(&mut self, relation: &str) -> bool {
        self.unset_related(relation)
    }

    /// Store the record together with the records attached to it.
    ///
    /// Relation defaults are forced onto attached records at every level of
    /// the cascade before they are written. Within one
    /// transaction, belongs-to parents are stored before the record (their
    /// key is copied into its local key), then the record is inserted or
    /// updated, then has-one and has-many children are stored with their
    /// remote key pointing back at it. Many-to-many targets get a link row.
    ///
    /// Any failure rolls everything back. Validation failures come back as
    /// [`Error::Validation`] carrying a snapshot of the offending record.
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = Self::TABLE))]
    fn save<C: Connection>(&mut self, db: &DbService<C>) -> Result<()> {
        db.connection().begin()?;
        match persist(db, self) {
            Ok(()) => db.commit_or_rollback(),
            Err(e) => {
                tracing::debug!(error = %e, "Save failed, rolling back");
                db.rollback_quietly();
                Err(e)
            }
        }
    }

    /// Delete the stored row. Returns whether a row was removed.
    ///
    /// A foreign key violation comes back as [`Error::ForeignKeyDelete`].
    #[tracing::instrument(level = "debug", skip(self, db), fields(table = Self::TABLE))]
    fn delete<C: Connection>(&self, db: &DbService<C>) -> Result<bool> {
        let Some(id) = self.id() else {
            return Err(Error::Argument(dbkit_core::ArgumentError::new(
                "delete",
                format!("{} has no primary key value", self.type_name()),
            )));
        };
        let clause = Conditions::new()
            .eq(pk_column::<Self>(), id)
            .to_sql(db.dialect());
        db.connection()
            .delete_rows(Self::TABLE, &clause)
            .map(|affected| affected > 0)
            .map_err(|e| e.into_foreign_key_delete(db.config().foreign_key_error_code))
    }
}

impl<T: Record> RecordExt for T {}

fn name_column<T: Record>() -> &'static str {
    find_field(T::fields(), "name").map_or("name", |f| f.column_name)
}

#[allow(clippy::result_large_err)]
fn persist<C: Connection>(db: &DbService<C>, entity: &mut dyn Entity) -> Result<()> {
    propagate_relation_defaults(entity)?;

    for relation in entity.relations() {
        if relation.kind == RelationKind::BelongsTo {
            persist_parent(db, entity, relation)?;
        }
    }

    validate_entity(entity).map_err(Error::Validation)?;
    write_row(db, entity)?;

    for relation in entity.relations() {
        match relation.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                persist_children(db, entity, relation)?;
            }
            RelationKind::HasManyToMany => persist_links(db, entity, relation)?,
            RelationKind::BelongsTo => {}
        }
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn persist_parent<C: Connection>(
    db: &DbService<C>,
    entity: &mut dyn Entity,
    relation: &RelationInfo,
) -> Result<()> {
    let key = {
        let Some(mut parents) = entity.related_mut(relation.name) else {
            return Ok(());
        };
        let Some(parent) = parents.pop() else {
            return Ok(());
        };
        persist(db, &mut *parent)?;
        parent.get_field(relation.remote_key)
    };
    match key {
        Some(key) => entity.set_field(relation.local_key, key),
        None => Ok(()),
    }
}

#[allow(clippy::result_large_err)]
fn persist_children<C: Connection>(
    db: &DbService<C>,
    entity: &mut dyn Entity,
    relation: &RelationInfo,
) -> Result<()> {
    let Some(key) = entity.get_field(relation.local_key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let Some(children) = entity.related_mut(relation.name) else {
        return Ok(());
    };
    for child in children {
        child.set_field(relation.remote_key, key.clone())?;
        persist(db, child)?;
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn persist_links<C: Connection>(
    db: &DbService<C>,
    entity: &mut dyn Entity,
    relation: &RelationInfo,
) -> Result<()> {
    let Some(link) = relation.link_table else {
        return Ok(());
    };
    let Some(key) = entity.get_field(relation.local_key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let Some(targets) = entity.related_mut(relation.name) else {
        return Ok(());
    };
    for target in targets {
        persist(db, &mut *target)?;
        let Some(target_key) = target.get_field(relation.remote_key) else {
            continue;
        };
        let linked = db.exists(
            &Select::from(link.table_name)
                .columns(&[link.local_column])
                .filter_eq(link.local_column, key.clone())
                .filter_eq(link.remote_column, target_key.clone())
                .limit(1),
        )?;
        if !linked {
            db.connection().insert_row(
                link.table_name,
                &[link.local_column, link.remote_column],
                vec![key.clone(), target_key],
            )?;
        }
    }
    Ok(())
}

/// INSERT a new record (assigning its generated id) or UPDATE a stored one.
#[allow(clippy::result_large_err)]
fn write_row<C: Connection>(db: &DbService<C>, entity: &mut dyn Entity) -> Result<()> {
    let conn = db.connection();
    let table = entity.table();
    let pk_name = entity.primary_key();
    let pk = entity.field_infos().iter().find(|f| f.name == pk_name);
    let was_new = entity.is_new();

    let stored = match (pk, entity.id()) {
        (Some(pk), Some(id)) if !was_new => db.exists(
            &Select::from(table)
                .columns(&[pk.column_name])
                .filter_eq(pk.column_name, id)
                .limit(1),
        )?,
        _ => false,
    };

    if stored {
        let Some(pk) = pk else {
            return Ok(());
        };
        let id = entity.id().unwrap_or(Value::Null);
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for field in entity.field_infos().iter().filter(|f| !f.primary_key) {
            columns.push(field.column_name);
            values.push(entity.get_field(field.name).unwrap_or(Value::Null));
        }
        if columns.is_empty() {
            return Ok(());
        }
        let clause = Conditions::new()
            .eq(pk.column_name, id)
            .to_sql(db.dialect());
        tracing::debug!(record = entity.type_name(), "Updating record");
        conn.update_rows(table, &columns, values, &clause)?;
        return Ok(());
    }

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for field in entity.field_infos() {
        let value = entity.get_field(field.name).unwrap_or(Value::Null);
        let generated =
            field.auto_increment && (value.is_null() || (field.primary_key && value.is_falsy()));
        if generated {
            continue;
        }
        columns.push(field.column_name);
        values.push(value);
    }
    tracing::debug!(record = entity.type_name(), "Inserting record");
    let id = conn.insert_row(table, &columns, values)?;
    match pk {
        Some(pk) if pk.auto_increment && was_new => entity.set_field(pk.name, Value::BigInt(id)),
        _ => Ok(()),
    }
}
