//! Result shaping: turning fetched rows into maps, lists and scalars.
//!
//! Every function here consumes the rows of one executed query, in the order
//! the database emitted them. Map outputs are [`IndexMap`]s keyed by [`Key`],
//! so iterating a shaped result visits entries in first-seen row order.
//!
//! Positional shapes read cells by ordinal, never by name, so column aliases
//! in the query do not matter. A row narrower than the shape needs is an
//! [`Error::Argument`]. The shapes built from hydrated records read fields by
//! name instead.

use dbkit_core::error::ArgumentError;
use dbkit_core::{Entity, Error, Key, Result, Row, Value};
use indexmap::IndexMap;
use std::collections::HashMap;

/// A row as an ordered column name to value map.
pub type RowMap = IndexMap<String, Value>;

/// `col1 -> col2`
pub type Assoc = IndexMap<Key, Value>;

/// `col1 -> col2 -> col3`
pub type KeyedAssoc = IndexMap<Key, IndexMap<Key, Value>>;

/// `col1 -> col2 -> col3 -> col4`
pub type TableAssoc4d = IndexMap<Key, IndexMap<Key, IndexMap<Key, Value>>>;

/// `col1 -> col2 -> row`
pub type Table = IndexMap<Key, IndexMap<Key, RowMap>>;

/// `col1 -> col2 -> [row, ...]`
pub type ArrayTable = IndexMap<Key, IndexMap<Key, Vec<RowMap>>>;

/// `field_a -> field_b -> [record, ...]`
pub type ObjectTable<T> = IndexMap<Key, IndexMap<Key, Vec<T>>>;

/// A container records are appended to, in fetch order.
///
/// `DbService::object_list` fills whichever container the caller names.
pub trait RecordList<T>: Default {
    fn append(&mut self, record: T);
}

impl<T> RecordList<T> for Vec<T> {
    fn append(&mut self, record: T) {
        self.push(record);
    }
}

impl<T> RecordList<T> for std::collections::VecDeque<T> {
    fn append(&mut self, record: T) {
        self.push_back(record);
    }
}

/// A container records are stored in under a key taken from one of their
/// fields. A later record with the same key replaces the earlier one.
pub trait RecordMap<T>: Default {
    fn insert_keyed(&mut self, key: Key, record: T);
}

impl<T> RecordMap<T> for IndexMap<Key, T> {
    fn insert_keyed(&mut self, key: Key, record: T) {
        self.insert(key, record);
    }
}

impl<T> RecordMap<T> for HashMap<Key, T> {
    fn insert_keyed(&mut self, key: Key, record: T) {
        self.insert(key, record);
    }
}

impl<T> RecordMap<T> for std::collections::BTreeMap<Key, T> {
    fn insert_keyed(&mut self, key: Key, record: T) {
        self.insert(key, record);
    }
}

fn shape_error(operation: &'static str, message: impl Into<String>) -> Error {
    Error::Argument(ArgumentError::new(operation, message))
}

/// Split a row into its first `N` cells and the rest, by position.
fn leading<const N: usize>(operation: &'static str, row: Row) -> Result<([Value; N], Vec<Value>)> {
    let width = row.len();
    let mut values = row.into_values().into_iter();
    let mut head = Vec::with_capacity(N);
    for _ in 0..N {
        match values.next() {
            Some(v) => head.push(v),
            None => {
                return Err(shape_error(
                    operation,
                    format!("row has {} columns, at least {} are needed", width, N),
                ));
            }
        }
    }
    let head: [Value; N] = head
        .try_into()
        .map_err(|_| shape_error(operation, "row split failed"))?;
    Ok((head, values.collect()))
}

/// Every row, as column maps.
pub fn rows(rows: Vec<Row>) -> Vec<RowMap> {
    rows.iter().map(Row::to_map).collect()
}

/// The first row, or an empty map when nothing was fetched.
pub fn row(rows: Vec<Row>) -> RowMap {
    rows.first().map(Row::to_map).unwrap_or_default()
}

/// The first cell of the first row; `Null` when nothing was fetched.
pub fn value(rows: Vec<Row>) -> Value {
    rows.into_iter()
        .next()
        .and_then(|r| r.into_values().into_iter().next())
        .unwrap_or(Value::Null)
}

/// The first cell of every row.
pub fn values(rows: Vec<Row>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|r| r.into_values().into_iter().next())
        .collect()
}

/// Was at least one row fetched?
pub fn exists(rows: &[Row]) -> bool {
    !rows.is_empty()
}

/// `col1 -> col2`. A repeated first column keeps the last row's value.
pub fn assoc(rows: Vec<Row>) -> Result<Assoc> {
    let mut out = IndexMap::with_capacity(rows.len());
    for row in rows {
        let ([key, value], _) = leading::<2>("assoc", row)?;
        out.insert(Key::from_value(&key), value);
    }
    Ok(out)
}

/// `col1 -> rest of the row`. The key column is removed from the row map.
pub fn keyed_rows(rows: Vec<Row>) -> Result<IndexMap<Key, RowMap>> {
    let mut out = IndexMap::with_capacity(rows.len());
    for row in rows {
        let mut map = row.to_map();
        let Some((_, key)) = map.shift_remove_index(0) else {
            return Err(shape_error("keyed_rows", "row has no columns"));
        };
        out.insert(Key::from_value(&key), map);
    }
    Ok(out)
}

/// `col1 -> col2 -> col3`. A repeated `(col1, col2)` pair keeps the last value.
pub fn keyed_assoc(rows: Vec<Row>) -> Result<KeyedAssoc> {
    let mut out: KeyedAssoc = IndexMap::new();
    for row in rows {
        let ([first, second, third], _) = leading::<3>("keyed_assoc", row)?;
        out.entry(Key::from_value(&first))
            .or_default()
            .insert(Key::from_value(&second), third);
    }
    Ok(out)
}

/// `col1 -> col2 -> col3 -> col4`.
pub fn table_assoc_4d(rows: Vec<Row>) -> Result<TableAssoc4d> {
    let mut out: TableAssoc4d = IndexMap::new();
    for row in rows {
        let ([first, second, third, fourth], _) = leading::<4>("table_assoc_4d", row)?;
        out.entry(Key::from_value(&first))
            .or_default()
            .entry(Key::from_value(&second))
            .or_default()
            .insert(Key::from_value(&third), fourth);
    }
    Ok(out)
}

/// `col1 -> [col2, ...]` in row order.
///
/// With `remove_empty`, falsy second cells are left out; the key is still
/// created so every distinct first column appears in the result.
pub fn keyed_values(rows: Vec<Row>, remove_empty: bool) -> Result<IndexMap<Key, Vec<Value>>> {
    let mut out: IndexMap<Key, Vec<Value>> = IndexMap::new();
    for row in rows {
        let ([key, value], _) = leading::<2>("keyed_values", row)?;
        let list = out.entry(Key::from_value(&key)).or_default();
        if remove_empty && value.is_falsy() {
            continue;
        }
        list.push(value);
    }
    Ok(out)
}

/// `col1 -> col2 -> row`. The full row, key columns included, is stored; a
/// repeated key pair keeps the last row.
pub fn table(rows: Vec<Row>) -> Result<Table> {
    let mut out: Table = IndexMap::new();
    for row in rows {
        let (first, second) = first_two_keys("table", &row)?;
        out.entry(first).or_default().insert(second, row.to_map());
    }
    Ok(out)
}

/// `col1 -> col2 -> [row, ...]`. Rows sharing a key pair are appended.
pub fn array_table(rows: Vec<Row>) -> Result<ArrayTable> {
    let mut out: ArrayTable = IndexMap::new();
    for row in rows {
        let (first, second) = first_two_keys("array_table", &row)?;
        out.entry(first)
            .or_default()
            .entry(second)
            .or_default()
            .push(row.to_map());
    }
    Ok(out)
}

fn first_two_keys(operation: &'static str, row: &Row) -> Result<(Key, Key)> {
    match (row.get(0), row.get(1)) {
        (Some(first), Some(second)) => Ok((Key::from_value(first), Key::from_value(second))),
        _ => Err(shape_error(
            operation,
            format!("row has {} columns, at least 2 are needed", row.len()),
        )),
    }
}

fn field_key(operation: &'static str, record: &dyn Entity, field: &str) -> Result<Key> {
    record
        .get_field(field)
        .map(|v| Key::from_value(&v))
        .ok_or_else(|| {
            shape_error(
                operation,
                format!("{} has no field '{}'", record.type_name(), field),
            )
        })
}

/// `record.first -> record.second -> [record, ...]`, appending on repeats.
pub fn object_table<T: Entity>(
    records: Vec<T>,
    first: &str,
    second: &str,
) -> Result<ObjectTable<T>> {
    let mut out: ObjectTable<T> = IndexMap::new();
    for record in records {
        let a = field_key("object_table", &record, first)?;
        let b = field_key("object_table", &record, second)?;
        out.entry(a).or_default().entry(b).or_default().push(record);
    }
    Ok(out)
}

/// Key records by one of their fields. A repeated key keeps the last record.
pub fn to_map<T: Entity>(records: Vec<T>, field: &str) -> Result<IndexMap<Key, T>> {
    collect_map(records, field)
}

/// Fill a caller-chosen list container.
pub fn collect_list<T, L: RecordList<T>>(records: Vec<T>) -> L {
    let mut list = L::default();
    for record in records {
        list.append(record);
    }
    list
}

/// Fill a caller-chosen keyed container, keying each record by `field`.
pub fn collect_map<T: Entity, M: RecordMap<T>>(records: Vec<T>, field: &str) -> Result<M> {
    let mut map = M::default();
    for record in records {
        let key = field_key("object_map", &record, field)?;
        map.insert_keyed(key, record);
    }
    Ok(map)
}
