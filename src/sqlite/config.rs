use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bb8::{ManageConnection, Pool, PooledConnection};
use tokio::sync::{Mutex, MutexGuard, TryLockError};
use tokio::task::spawn_blocking;

use crate::error::{DriverError, SqlAdapterError};

use super::connection::run_blocking;

/// A `rusqlite` connection plus the handle that interrupts whatever it is running.
pub struct SqliteHandle {
    conn: Mutex<rusqlite::Connection>,
    interrupt: rusqlite::InterruptHandle,
}

impl SqliteHandle {
    fn new(conn: rusqlite::Connection) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Mutex::new(conn),
            interrupt,
        }
    }

    /// Abort the statement currently running on this connection, if any.
    pub(crate) fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    pub(crate) fn blocking_lock(&self) -> MutexGuard<'_, rusqlite::Connection> {
        self.conn.blocking_lock()
    }

    pub(crate) fn try_lock(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, TryLockError> {
        self.conn.try_lock()
    }
}

/// A connection shared between the pool and blocking workers.
pub type SharedSqliteConnection = Arc<SqliteHandle>;

pub type SqlitePool = Pool<SqliteManager>;

pub(crate) type SqlitePooledConnection = PooledConnection<'static, SqliteManager>;

/// bb8 manager for `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    db_path: String,
    busy_timeout: Duration,
}

impl SqliteManager {
    #[must_use]
    pub fn new(db_path: impl Into<String>, busy_timeout: Duration) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout,
        }
    }

    /// Build a pool from this manager.
    ///
    /// # Errors
    /// Returns `ConfigError` if the pool cannot be created.
    pub async fn build_pool(self, max_size: u32) -> Result<SqlitePool, SqlAdapterError> {
        Pool::builder()
            .max_size(max_size.max(1))
            .build(self)
            .await
            .map_err(|e| SqlAdapterError::ConfigError(format!("sqlite pool error: {e}")))
    }
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = DriverError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let db_path = self.db_path.clone();
        let busy_timeout = self.busy_timeout;
        async move {
            let conn = spawn_blocking(move || -> Result<rusqlite::Connection, rusqlite::Error> {
                let conn = rusqlite::Connection::open(&db_path)?;
                conn.busy_timeout(busy_timeout)?;
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                Ok(conn)
            })
            .await
            .map_err(|e| DriverError::Other(format!("sqlite spawn_blocking join error: {e}")))??;
            Ok(Arc::new(SqliteHandle::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let handle = Arc::clone(conn);
        async move { run_blocking(handle, |c| c.query_row("SELECT 1", [], |_| Ok(()))).await }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
