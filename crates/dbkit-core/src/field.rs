//! Static field registration for records.

/// Metadata about a record field/column.
///
/// Every record type declares its persisted fields once, in order, as a
/// `&'static [FieldInfo]`. The derive macro builds this list from the struct
/// definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Database column name (may differ from field name)
    pub column_name: &'static str,
    /// Whether this field accepts NULL
    pub nullable: bool,
    /// Whether this is the primary key
    pub primary_key: bool,
    /// Whether the database assigns this value on insert
    pub auto_increment: bool,
}

impl FieldInfo {
    /// Create a non-null field whose column has the same name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column_name: name,
            nullable: false,
            primary_key: false,
            auto_increment: false,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Mark as the primary key. Primary keys are auto-increment unless
    /// told otherwise.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self.auto_increment = value;
        self
    }

    /// Set auto-increment flag.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Must this field hold a value before the record is saved?
    pub const fn is_required(&self) -> bool {
        !self.nullable && !self.auto_increment
    }
}

/// Find a field by Rust name or column name.
pub fn find_field(fields: &'static [FieldInfo], name: &str) -> Option<&'static FieldInfo> {
    fields
        .iter()
        .find(|f| f.name == name || f.column_name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldInfo] = &[
        FieldInfo::new("id").primary_key(true),
        FieldInfo::new("author_id").nullable(true),
        FieldInfo::new("title").column("post_title"),
    ];

    #[test]
    fn test_builder_flags() {
        assert!(FIELDS[0].primary_key && FIELDS[0].auto_increment);
        assert!(!FIELDS[0].is_required());
        assert!(!FIELDS[1].is_required());
        assert!(FIELDS[2].is_required());
        assert_eq!(FIELDS[2].column_name, "post_title");
    }

    #[test]
    fn test_find_field_by_either_name() {
        assert_eq!(find_field(FIELDS, "title").map(|f| f.name), Some("title"));
        assert_eq!(find_field(FIELDS, "post_title").map(|f| f.name), Some("title"));
        assert!(find_field(FIELDS, "body").is_none());
    }
}
