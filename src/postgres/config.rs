use std::future::Future;

use bb8::{ManageConnection, Pool, PooledConnection};
use tokio_postgres::{Client, NoTls};
use tracing::debug;

use crate::config::PostgresOptions;
use crate::error::{DriverError, SqlAdapterError};

pub type PgPool = Pool<PgManager>;

pub(crate) type PgPooledConnection = PooledConnection<'static, PgManager>;

/// bb8 manager for Postgres clients.
#[derive(Debug, Clone)]
pub struct PgManager {
    config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn from_options(opts: &PostgresOptions) -> Self {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&opts.host)
            .port(opts.port)
            .dbname(&opts.dbname)
            .user(&opts.user);
        if let Some(password) = &opts.password {
            config.password(password);
        }
        Self::new(config)
    }

    /// Build a pool from this manager.
    ///
    /// # Errors
    /// Returns `ConfigError` if pool creation fails.
    pub async fn build_pool(self, max_size: u32) -> Result<PgPool, SqlAdapterError> {
        Pool::builder()
            .max_size(max_size.max(1))
            .build(self)
            .await
            .map_err(|e| SqlAdapterError::ConfigError(format!("postgres pool error: {e}")))
    }
}

impl ManageConnection for PgManager {
    type Connection = Client;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        async move {
            debug!(hosts = ?cfg.get_hosts(), db = ?cfg.get_dbname(), "postgres connect");
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!(error = %e, "postgres connection task ended");
                }
            });
            Ok(client)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query("SELECT 1").await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

pub(crate) fn pool_error(err: bb8::RunError<tokio_postgres::Error>) -> DriverError {
    match err {
        bb8::RunError::User(inner) => DriverError::Postgres(inner),
        bb8::RunError::TimedOut => {
            DriverError::Pool("timed out waiting for a postgres connection".into())
        }
    }
}
