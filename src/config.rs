use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::SqlAdapterError;
use crate::interpolation::{PlaceholderStyle, StrategyFactory};
use crate::types::DatabaseType;

fn default_pool_size() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pg_port() -> u16 {
    5432
}

/// Options for a `SQLite` backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteOptions {
    pub db_path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.opts.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.opts.busy_timeout_ms = busy_timeout_ms;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build a [`Connection`] with the `SQLite` default placeholder style.
    ///
    /// # Errors
    /// Returns `ConfigError` if the `sqlite` feature is disabled or the pool cannot be created.
    pub async fn build(self) -> Result<Connection, SqlAdapterError> {
        AdapterConfig::sqlite(self.finish()).connect().await
    }
}

/// Options for a `PostgreSQL` backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresOptions {
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub dbname: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Fluent builder for `PostgreSQL` options.
#[derive(Debug, Clone)]
pub struct PostgresOptionsBuilder {
    opts: PostgresOptions,
}

impl PostgresOptionsBuilder {
    #[must_use]
    pub fn new(host: impl Into<String>, dbname: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            opts: PostgresOptions {
                host: host.into(),
                port: default_pg_port(),
                dbname: dbname.into(),
                user: user.into(),
                password: None,
                pool_size: default_pool_size(),
            },
        }
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.opts.port = port;
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.opts.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.opts.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn finish(self) -> PostgresOptions {
        self.opts
    }

    /// Build a [`Connection`] with `$N` placeholders.
    ///
    /// # Errors
    /// Returns `ConfigError` if the `postgres` feature is disabled or the pool cannot be created.
    pub async fn build(self) -> Result<Connection, SqlAdapterError> {
        AdapterConfig::postgres(self.finish()).connect().await
    }
}

/// Top-level adapter configuration, loadable from JSON.
///
/// ```rust
/// use sql_engine_adapter::prelude::*;
///
/// let cfg = AdapterConfig::from_json_str(
///     r#"{ "database_type": "sqlite", "sqlite": { "db_path": ":memory:", "pool_size": 1 } }"#,
/// )
/// .unwrap();
/// assert_eq!(cfg.database_type, DatabaseType::Sqlite);
/// assert_eq!(cfg.effective_placeholder_style(), PlaceholderStyle::Question);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub database_type: DatabaseType,
    /// Overrides the backend's default placeholder style.
    #[serde(default)]
    pub placeholder_style: Option<PlaceholderStyle>,
    #[serde(default)]
    pub sqlite: Option<SqliteOptions>,
    #[serde(default)]
    pub postgres: Option<PostgresOptions>,
}

impl AdapterConfig {
    #[must_use]
    pub fn sqlite(options: SqliteOptions) -> Self {
        Self {
            database_type: DatabaseType::Sqlite,
            placeholder_style: None,
            sqlite: Some(options),
            postgres: None,
        }
    }

    #[must_use]
    pub fn postgres(options: PostgresOptions) -> Self {
        Self {
            database_type: DatabaseType::Postgres,
            placeholder_style: None,
            sqlite: None,
            postgres: Some(options),
        }
    }

    #[must_use]
    pub fn with_placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder_style = Some(style);
        self
    }

    /// # Errors
    /// Returns `ConfigError` if `json` is not a valid configuration.
    pub fn from_json_str(json: &str) -> Result<Self, SqlAdapterError> {
        serde_json::from_str(json)
            .map_err(|e| SqlAdapterError::ConfigError(format!("invalid adapter config: {e}")))
    }

    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SqlAdapterError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SqlAdapterError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    #[must_use]
    pub fn effective_placeholder_style(&self) -> PlaceholderStyle {
        self.placeholder_style
            .unwrap_or(match self.database_type {
                DatabaseType::Sqlite => PlaceholderStyle::Question,
                DatabaseType::Postgres => PlaceholderStyle::Postgres,
            })
    }

    /// Open the configured backend.
    ///
    /// # Errors
    /// Returns `ConfigError` if the backend section is missing, the backend is not compiled in,
    /// or its pool cannot be created.
    pub async fn connect(&self) -> Result<Connection, SqlAdapterError> {
        let factory = StrategyFactory::for_style(self.effective_placeholder_style());
        match self.database_type {
            DatabaseType::Sqlite => {
                let opts = self.sqlite.as_ref().ok_or_else(|| {
                    SqlAdapterError::ConfigError("missing `sqlite` section".into())
                })?;
                connect_sqlite(opts, factory).await
            }
            DatabaseType::Postgres => {
                let opts = self.postgres.as_ref().ok_or_else(|| {
                    SqlAdapterError::ConfigError("missing `postgres` section".into())
                })?;
                connect_postgres(opts, factory).await
            }
        }
    }
}

impl Connection {
    /// # Errors
    /// See [`AdapterConfig::connect`].
    pub async fn from_config(config: &AdapterConfig) -> Result<Self, SqlAdapterError> {
        config.connect().await
    }
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(
    opts: &SqliteOptions,
    factory: StrategyFactory,
) -> Result<Connection, SqlAdapterError> {
    let native = crate::sqlite::SqliteConnection::open(opts).await?;
    Ok(Connection::new(std::sync::Arc::new(native), factory))
}

#[cfg(not(feature = "sqlite"))]
#[allow(clippy::unused_async)]
async fn connect_sqlite(
    _opts: &SqliteOptions,
    _factory: StrategyFactory,
) -> Result<Connection, SqlAdapterError> {
    Err(SqlAdapterError::ConfigError(
        "sqlite support is not enabled in this build".into(),
    ))
}

#[cfg(feature = "postgres")]
async fn connect_postgres(
    opts: &PostgresOptions,
    factory: StrategyFactory,
) -> Result<Connection, SqlAdapterError> {
    let native = crate::postgres::PgConnection::open(opts).await?;
    Ok(Connection::new(std::sync::Arc::new(native), factory))
}

#[cfg(not(feature = "postgres"))]
#[allow(clippy::unused_async)]
async fn connect_postgres(
    _opts: &PostgresOptions,
    _factory: StrategyFactory,
) -> Result<Connection, SqlAdapterError> {
    Err(SqlAdapterError::ConfigError(
        "postgres support is not enabled in this build".into(),
    ))
}
