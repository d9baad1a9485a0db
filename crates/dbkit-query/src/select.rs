//! SELECT query descriptors.

use dbkit_core::{Dialect, Record, RelationInfo, RelationKind, Value};

use crate::clause::OrderBy;
use crate::where_clause::Conditions;

/// A query the shaping functions can execute.
///
/// `column_names` is the declared output column list. Shapes that need an exact
/// column count check it before anything is executed; an empty list means
/// the query selects `*`.
pub trait QueryDescriptor {
    /// The declared output columns.
    fn column_names(&self) -> Vec<String>;

    /// SQL text and bound parameters for the given dialect.
    fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>);
}

/// Raw SQL with an explicit column declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    sql: String,
    params: Vec<Value>,
    columns: Vec<String>,
}

impl RawQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Declare the output columns.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Bind parameters, written with the dialect's placeholders.
    pub fn params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

impl QueryDescriptor for RawQuery {
    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn to_sql(&self, _dialect: Dialect) -> (String, Vec<Value>) {
        (self.sql.clone(), self.params.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Eq(String, Value),
    In(String, Vec<Value>),
    InSelect(String, Box<Select>),
    IsNull(String),
    Raw(String),
    Conditions(Conditions),
}

/// A SELECT over one table.
///
/// # Example
///
/// ```ignore
/// let query = Select::from("users")
///     .columns(&["id", "name"])
///     .filter_eq("active", 1)
///     .order_by(OrderBy::asc("name"));
/// let names = db.assoc(&query)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    columns: Vec<String>,
    predicates: Vec<Predicate>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    /// Select `*` from a table.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Select `*` from a record type's table.
    pub fn record<T: Record>() -> Self {
        Self::from(T::TABLE)
    }

    /// Select the records attached to an owner through `relation`.
    ///
    /// `owner_key` is the owner's value of the relation's local key. The
    /// relation's extra condition and its default field values are part of
    /// the filter.
    pub fn related(relation: &RelationInfo, owner_key: Value) -> Self {
        let mut select = Self::from(relation.related_table);
        select = match (relation.kind, relation.link_table) {
            (RelationKind::HasManyToMany, Some(link)) => {
                let link_select = Self::from(link.table_name)
                    .columns(&[link.remote_column])
                    .filter_eq(link.local_column, owner_key);
                select.filter_in_select(relation.remote_key, link_select)
            }
            _ => select.filter_eq(relation.remote_key, owner_key),
        };
        if let Some(conditions) = relation.conditions {
            select = select.filter_raw(conditions);
        }
        for (field, value) in relation.fetch_conditions() {
            select = select.filter_eq(field, value);
        }
        select
    }

    /// Replace the column list.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Add one output column or expression.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// `column = value`, bound as a parameter.
    pub fn filter_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq(column.into(), value.into()));
        self
    }

    /// `column IN (values...)`; an empty list matches nothing.
    pub fn filter_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.predicates.push(Predicate::In(column.into(), values));
        self
    }

    /// `column IN (SELECT ...)`.
    pub fn filter_in_select(mut self, column: impl Into<String>, select: Select) -> Self {
        self.predicates
            .push(Predicate::InSelect(column.into(), Box::new(select)));
        self
    }

    /// `column IS NULL`.
    pub fn filter_null(mut self, column: impl Into<String>) -> Self {
        self.predicates.push(Predicate::IsNull(column.into()));
        self
    }

    /// A raw SQL condition, inserted verbatim.
    pub fn filter_raw(mut self, sql: impl Into<String>) -> Self {
        self.predicates.push(Predicate::Raw(sql.into()));
        self
    }

    /// Column conditions rendered as literals.
    pub fn filter_conditions(mut self, conditions: Conditions) -> Self {
        self.predicates.push(Predicate::Conditions(conditions));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Build the SQL, numbering placeholders after the `params` already bound.
    fn build_into(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns,
            dialect.quote_identifier(&self.table)
        );

        let mut clauses = Vec::new();
        for predicate in &self.predicates {
            let clause = match predicate {
                Predicate::Eq(column, value) => {
                    params.push(value.clone());
                    format!("{} = {}", column, dialect.placeholder(params.len()))
                }
                Predicate::In(_, values) if values.is_empty() => "1 = 0".to_string(),
                Predicate::In(column, values) => {
                    let placeholders: Vec<String> = values
                        .iter()
                        .map(|v| {
                            params.push(v.clone());
                            dialect.placeholder(params.len())
                        })
                        .collect();
                    format!("{} IN ({})", column, placeholders.join(", "))
                }
                Predicate::InSelect(column, select) => {
                    format!("{} IN ({})", column, select.build_into(dialect, params))
                }
                Predicate::IsNull(column) => format!("{} IS NULL", column),
                Predicate::Raw(raw) => format!("({})", raw),
                Predicate::Conditions(conditions) => {
                    let rendered = conditions.to_sql(dialect);
                    if rendered.is_empty() {
                        continue;
                    }
                    rendered
                }
            };
            clauses.push(clause);
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self.order_by.iter().map(OrderBy::to_sql).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }
}

impl QueryDescriptor for Select {
    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.build_into(dialect, &mut params);
        (sql, params)
    }
}

impl<Q: QueryDescriptor + ?Sized> QueryDescriptor for &Q {
    fn column_names(&self) -> Vec<String> {
        (**self).column_names()
    }

    fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        (**self).to_sql(dialect)
    }
}
