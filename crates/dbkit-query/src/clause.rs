//! ORDER BY clause.

use dbkit_core::DbConfig;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    /// Parse `asc` / `desc` in any letter case.
    pub fn parse(direction: &str) -> Option<Self> {
        let direction = direction.trim().to_ascii_lowercase();
        if !DbConfig::SQL_SORT_DIRECTIONS.contains(&direction.as_str()) {
            return None;
        }
        if direction == DbConfig::SQL_SORT_DESCENDING {
            Some(OrderDirection::Desc)
        } else {
            Some(OrderDirection::Asc)
        }
    }

    pub const fn as_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: String,
    direction: OrderDirection,
}

impl OrderBy {
    /// Create an ascending order by clause.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order by clause.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }

    pub fn new(column: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    /// Generate SQL for this ORDER BY term.
    pub fn to_sql(&self) -> String {
        format!("{} {}", self.column, self.direction.as_sql())
    }
}
