//! Database constants and service configuration.

use crate::error::{ConfigError, Error, Result};

/// Fixed database constants shared by the drivers and the service.
#[derive(Debug, Clone, Copy)]
pub struct DbConfig;

impl DbConfig {
    /// Driver code for "cannot delete or update a parent row".
    pub const ERROR_CODE_FK_CONSTRAINT_FAIL: i32 = 1451;
    /// Driver code for "user has exceeded the max connections resource".
    pub const ERROR_CODE_TOO_MANY_USER_CONNECTIONS: i32 = 1226;

    pub const SQL_DATE_FORMAT: &'static str = "%Y-%m-%d";
    pub const SQL_DATETIME_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";
    pub const SQL_TIME_FORMAT: &'static str = "%H:%M:%S";

    pub const SQL_SORT_ASCENDING: &'static str = "asc";
    pub const SQL_SORT_DESCENDING: &'static str = "desc";
    pub const SQL_SORT_DIRECTIONS: [&'static str; 2] =
        [Self::SQL_SORT_ASCENDING, Self::SQL_SORT_DESCENDING];

    /// Rows per INSERT statement in bulk writes.
    pub const BULK_CHUNK_SIZE: usize = 1000;
}

/// Deployment environment. Some failures are logged only in development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Dev,
    #[default]
    Production,
}

impl Environment {
    /// Parse an environment name (`dev`, `development`, `prod`, `production`).
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(Error::Config(ConfigError {
                message: format!("unknown environment '{}'", other),
                source: None,
            })),
        }
    }

    pub const fn is_dev(self) -> bool {
        matches!(self, Environment::Dev)
    }
}

/// Configuration for a `DbService`.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Deployment environment
    pub env: Environment,
    /// Maximum rows per INSERT statement in bulk writes
    pub bulk_chunk_size: usize,
    /// Driver error code that marks a foreign key violation
    pub foreign_key_error_code: i32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            bulk_chunk_size: DbConfig::BULK_CHUNK_SIZE,
            foreign_key_error_code: DbConfig::ERROR_CODE_FK_CONSTRAINT_FAIL,
        }
    }
}

impl ServiceConfig {
    /// Environment variable read by [`ServiceConfig::from_env`].
    pub const ENV_VAR: &'static str = "DBKIT_ENV";

    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration whose environment comes from `DBKIT_ENV`.
    ///
    /// An unset variable keeps the production default.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(name) = std::env::var(Self::ENV_VAR) {
            config.env = Environment::parse(&name)?;
        }
        Ok(config)
    }

    /// Set the deployment environment.
    pub fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Set the bulk insert chunk size. Zero is treated as one.
    pub fn bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size.max(1);
        self
    }

    /// Set the driver code recognized as a foreign key violation.
    pub fn foreign_key_error_code(mut self, code: i32) -> Self {
        self.foreign_key_error_code = code;
        self
    }
}
