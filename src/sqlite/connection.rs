use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::spawn_blocking;
use tracing::debug;

use crate::config::SqliteOptions;
use crate::driver::{
    BufferedRows, ExecOutcome, NativeConnection, NativeRows, NativeStatement, NativeTransaction,
};
use crate::error::{DriverError, SqlAdapterError};
use crate::types::{IsolationLevel, RowValues, TxOptions};

use super::config::{SharedSqliteConnection, SqliteManager, SqlitePool, SqlitePooledConnection};
use super::params::convert_params;
use super::query;
use super::statement::SqliteStatement;
use super::transaction::SqliteTransaction;

/// Interrupts the connection if a blocking call is abandoned before it reports back.
struct InterruptOnDrop(Option<SharedSqliteConnection>);

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            debug!("sqlite call abandoned; interrupting the running statement");
            handle.interrupt();
        }
    }
}

/// Run synchronous `rusqlite` logic on a blocking worker while holding the connection lock.
///
/// Dropping the returned future interrupts the statement the worker is running. A statement
/// that already finished, or has not started yet, is not affected.
pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, DriverError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
    R: Send + 'static,
{
    let mut pending = InterruptOnDrop(Some(Arc::clone(&conn)));
    let res = spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard).map_err(DriverError::from)
    })
    .await;
    pending.0 = None;
    res.map_err(|e| DriverError::Other(format!("sqlite spawn_blocking join error: {e}")))?
}

pub(crate) fn pool_error(err: bb8::RunError<DriverError>) -> DriverError {
    match err {
        bb8::RunError::User(inner) => inner,
        bb8::RunError::TimedOut => DriverError::Pool("timed out waiting for a sqlite connection".into()),
    }
}

fn begin_sql(options: &TxOptions) -> &'static str {
    if options.read_only {
        debug!("sqlite has no read-only transactions; starting a regular one");
    }
    match options.isolation {
        Some(IsolationLevel::Serializable) => "BEGIN IMMEDIATE",
        _ => "BEGIN DEFERRED",
    }
}

/// Pooled `SQLite` handle implementing the native connection boundary.
///
/// `close` drops this handle's pool. Idle connections close once the last clone of the pool goes
/// away; open transactions and prepared statements each keep one until they are finished.
pub struct SqliteConnection {
    pool: Mutex<Option<SqlitePool>>,
}

impl SqliteConnection {
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool: Mutex::new(Some(pool)),
        }
    }

    /// Open a pool for `opts.db_path`.
    ///
    /// # Errors
    /// Returns `ConfigError` if the pool cannot be built.
    pub async fn open(opts: &SqliteOptions) -> Result<Self, SqlAdapterError> {
        let manager = SqliteManager::new(
            opts.db_path.clone(),
            Duration::from_millis(opts.busy_timeout_ms),
        );
        let pool = manager.build_pool(opts.pool_size).await?;
        Ok(Self::from_pool(pool))
    }

    fn pool(&self) -> Result<SqlitePool, DriverError> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DriverError::Closed)
    }

    async fn checkout(&self) -> Result<SqlitePooledConnection, DriverError> {
        self.pool()?.get_owned().await.map_err(pool_error)
    }
}

#[async_trait]
impl NativeConnection for SqliteConnection {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn NativeTransaction>, DriverError> {
        let pooled = self.checkout().await?;
        let sql = begin_sql(options);
        run_blocking(Arc::clone(&*pooled), move |c| c.execute_batch(sql)).await?;
        Ok(Box::new(SqliteTransaction::new(pooled)))
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn NativeStatement>, DriverError> {
        let pool = self.pool()?;
        let pooled = pool.get_owned().await.map_err(pool_error)?;
        let sql_owned = sql.to_owned();
        run_blocking(Arc::clone(&*pooled), move |c| query::warm(c, &sql_owned)).await?;
        Ok(Box::new(SqliteStatement::on_pool(pool, sql)))
    }

    async fn query(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn NativeRows>, DriverError> {
        let pooled = self.checkout().await?;
        let sql_owned = sql.to_owned();
        let values = convert_params(args);
        let result_set =
            run_blocking(Arc::clone(&*pooled), move |c| query::select(c, &sql_owned, &values))
                .await?;
        Ok(Box::new(BufferedRows::from(result_set)))
    }

    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        let pooled = self.checkout().await?;
        let sql_owned = sql.to_owned();
        let values = convert_params(args);
        run_blocking(Arc::clone(&*pooled), move |c| query::execute(c, &sql_owned, &values)).await
    }

    async fn ping(&self) -> Result<(), DriverError> {
        let pooled = self.checkout().await?;
        run_blocking(Arc::clone(&*pooled), |c| c.query_row("SELECT 1", [], |_| Ok(()))).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DriverError::Closed)?;
        debug!(state = ?pool.state(), "closing sqlite pool");
        drop(pool);
        Ok(())
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.pool().ok().map(|pool| pool.state());
        f.debug_struct("SqliteConnection")
            .field("pool", &state)
            .finish()
    }
}
