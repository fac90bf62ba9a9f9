use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::warn;

use crate::driver::{BufferedRows, ExecOutcome, NativeRows, NativeStatement, NativeTransaction};
use crate::error::DriverError;
use crate::types::RowValues;

use super::config::{SharedSqliteConnection, SqlitePooledConnection};
use super::connection::run_blocking;
use super::params::convert_params;
use super::query;
use super::statement::SqliteStatement;

fn transaction_closed() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ABORT),
        Some("transaction is no longer open".into()),
    )
}

/// The pooled connection a transaction runs on; shared with statements prepared inside it.
///
/// The pooled connection is released once the transaction finishes. If it is dropped while
/// still open, a best-effort rollback runs first.
///
/// `live` is only read and cleared under the connection lock. Work queued before the transaction
/// ended, such as a call abandoned on cancellation, finds it cleared and never runs.
pub(crate) struct TxConn {
    handle: SharedSqliteConnection,
    live: Arc<AtomicBool>,
    pooled: Mutex<Option<SqlitePooledConnection>>,
}

impl TxConn {
    fn handle(&self) -> Result<SharedSqliteConnection, DriverError> {
        let guard = self.pooled.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            Ok(Arc::clone(&self.handle))
        } else {
            Err(DriverError::Closed)
        }
    }

    /// Run `func` inside the transaction, unless it ended before the worker got the lock.
    pub(crate) async fn run<F, R>(&self, func: F) -> Result<R, DriverError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let live = Arc::clone(&self.live);
        run_blocking(self.handle()?, move |c| {
            if live.load(Ordering::Acquire) {
                func(c)
            } else {
                Err(transaction_closed())
            }
        })
        .await
    }

    fn release(&self) -> Option<SqlitePooledConnection> {
        self.pooled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for TxConn {
    fn drop(&mut self) {
        let Some(pooled) = self
            .pooled
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        warn!("sqlite transaction dropped while active; rolling back");
        let handle = Arc::clone(&self.handle);
        let live = Arc::clone(&self.live);
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                let _ = run_blocking(handle, move |c| {
                    live.store(false, Ordering::Release);
                    c.execute_batch("ROLLBACK")
                })
                .await;
                drop(pooled);
            });
        } else if let Ok(guard) = handle.try_lock() {
            live.store(false, Ordering::Release);
            let _ = guard.execute_batch("ROLLBACK");
        }
    }
}

pub(crate) struct SqliteTransaction {
    conn: Arc<TxConn>,
}

impl SqliteTransaction {
    pub(crate) fn new(pooled: SqlitePooledConnection) -> Self {
        Self {
            conn: Arc::new(TxConn {
                handle: Arc::clone(&*pooled),
                live: Arc::new(AtomicBool::new(true)),
                pooled: Mutex::new(Some(pooled)),
            }),
        }
    }

    /// Commit or roll back, then hand the connection back to the pool.
    ///
    /// A rollback issued after a cancelled call waits for that call's worker, so the pooled
    /// connection is never released mid-statement.
    async fn finish(&self, sql: &'static str) -> Result<(), DriverError> {
        let live = Arc::clone(&self.conn.live);
        let res = self.conn.run(move |c| {
            live.store(false, Ordering::Release);
            // an interrupted write already rolled the transaction back
            if sql == "ROLLBACK" && c.is_autocommit() {
                return Ok(());
            }
            let res = c.execute_batch(sql);
            if res.is_err() && !c.is_autocommit() {
                let _ = c.execute_batch("ROLLBACK");
            }
            res
        })
        .await;
        drop(self.conn.release());
        res
    }
}

#[async_trait]
impl NativeTransaction for SqliteTransaction {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn NativeStatement>, DriverError> {
        let sql_owned = sql.to_owned();
        self.conn.run(move |c| query::warm(c, &sql_owned)).await?;
        Ok(Box::new(SqliteStatement::in_transaction(
            Arc::clone(&self.conn),
            sql,
        )))
    }

    async fn query(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn NativeRows>, DriverError> {
        let sql_owned = sql.to_owned();
        let values = convert_params(args);
        let result_set = self
            .conn
            .run(move |c| query::select(c, &sql_owned, &values))
            .await?;
        Ok(Box::new(BufferedRows::from(result_set)))
    }

    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        let sql_owned = sql.to_owned();
        let values = convert_params(args);
        self.conn
            .run(move |c| query::execute(c, &sql_owned, &values))
            .await
    }

    async fn commit(&self) -> Result<(), DriverError> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), DriverError> {
        self.finish("ROLLBACK").await
    }
}
