//! SQL dialect differences that statement rendering depends on.

/// SQL dialect for generating database-specific SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Render a string as a quoted SQL literal.
    ///
    /// Standard SQL doubles single quotes. MySQL also treats the backslash
    /// as an escape character, so control characters and quotes are
    /// backslash-escaped there.
    pub fn escape_string(self, s: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("'{}'", s.replace('\'', "''")),
            Dialect::Mysql => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\0' => out.push_str("\\0"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\x1a' => out.push_str("\\Z"),
                        '\\' => out.push_str("\\\\"),
                        '\'' => out.push_str("\\'"),
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                }
                out.push('\'');
                out
            }
        }
    }

    /// Statement that turns foreign key enforcement on or off for the session.
    pub const fn foreign_key_checks_sql(self, enabled: bool) -> &'static str {
        match (self, enabled) {
            (Dialect::Mysql, true) => "SET FOREIGN_KEY_CHECKS = 1",
            (Dialect::Mysql, false) => "SET FOREIGN_KEY_CHECKS = 0",
            (Dialect::Sqlite, true) => "PRAGMA foreign_keys = ON",
            (Dialect::Sqlite, false) => "PRAGMA foreign_keys = OFF",
            (Dialect::Postgres, true) => "SET session_replication_role = DEFAULT",
            (Dialect::Postgres, false) => "SET session_replication_role = replica",
        }
    }

    /// Clause that turns an INSERT into an upsert overwriting `columns`.
    ///
    /// `conflict_key` is the unique column Postgres needs as the conflict
    /// target; MySQL and SQLite resolve the conflicting key themselves.
    pub fn upsert_clause(self, conflict_key: &str, columns: &[&str]) -> String {
        match self {
            Dialect::Mysql => {
                let sets: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let col = self.quote_identifier(c);
                        format!("{col} = VALUES({col})")
                    })
                    .collect();
                format!(" ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
            Dialect::Sqlite | Dialect::Postgres => {
                let sets: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let col = self.quote_identifier(c);
                        format!("{col} = excluded.{col}")
                    })
                    .collect();
                let target = if self == Dialect::Postgres {
                    format!(" ({})", self.quote_identifier(conflict_key))
                } else {
                    String::new()
                };
                format!(" ON CONFLICT{target} DO UPDATE SET {}", sets.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::Sqlite.placeholder(2), "?2");
        assert_eq!(Dialect::Mysql.placeholder(2), "?");
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(Dialect::Sqlite.quote_identifier("my\"col"), "\"my\"\"col\"");
        assert_eq!(Dialect::Mysql.quote_identifier("my`col"), "`my``col`");
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(Dialect::Sqlite.escape_string("O'Brien"), "'O''Brien'");
        assert_eq!(Dialect::Mysql.escape_string("O'Brien"), "'O\\'Brien'");
        assert_eq!(Dialect::Mysql.escape_string("a\\b\nc"), "'a\\\\b\\nc'");
    }

    #[test]
    fn test_upsert_clause() {
        assert_eq!(
            Dialect::Mysql.upsert_clause("id", &["id", "name"]),
            " ON DUPLICATE KEY UPDATE `id` = VALUES(`id`), `name` = VALUES(`name`)"
        );
        assert_eq!(
            Dialect::Sqlite.upsert_clause("id", &["name"]),
            " ON CONFLICT DO UPDATE SET \"name\" = excluded.\"name\""
        );
        assert_eq!(
            Dialect::Postgres.upsert_clause("id", &["name"]),
            " ON CONFLICT (\"id\") DO UPDATE SET \"name\" = excluded.\"name\""
        );
    }

    #[test]
    fn test_foreign_key_checks_sql() {
        assert_eq!(
            Dialect::Mysql.foreign_key_checks_sql(false),
            "SET FOREIGN_KEY_CHECKS = 0"
        );
        assert_eq!(
            Dialect::Sqlite.foreign_key_checks_sql(true),
            "PRAGMA foreign_keys = ON"
        );
    }
}
