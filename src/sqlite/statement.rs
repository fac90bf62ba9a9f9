use std::sync::Arc;

use async_trait::async_trait;

use crate::driver::{BufferedRows, ExecOutcome, NativeRows, NativeStatement};
use crate::error::DriverError;
use crate::types::RowValues;

use super::config::SqlitePool;
use super::connection::{pool_error, run_blocking};
use super::params::convert_params;
use super::query;
use super::transaction::TxConn;

enum StatementTarget {
    Pool(SqlitePool),
    Transaction(Arc<TxConn>),
}

/// Prepared `SQLite` statement.
///
/// `rusqlite` statements borrow their connection, so only the SQL is kept; each execution
/// resolves it through the connection's statement cache.
pub(crate) struct SqliteStatement {
    sql: Arc<str>,
    target: StatementTarget,
}

impl SqliteStatement {
    pub(crate) fn on_pool(pool: SqlitePool, sql: &str) -> Self {
        Self {
            sql: Arc::from(sql),
            target: StatementTarget::Pool(pool),
        }
    }

    pub(crate) fn in_transaction(conn: Arc<TxConn>, sql: &str) -> Self {
        Self {
            sql: Arc::from(sql),
            target: StatementTarget::Transaction(conn),
        }
    }

    async fn run<F, R>(&self, func: F) -> Result<R, DriverError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        match &self.target {
            StatementTarget::Pool(pool) => {
                let pooled = pool.get_owned().await.map_err(pool_error)?;
                run_blocking(Arc::clone(&*pooled), func).await
            }
            StatementTarget::Transaction(conn) => conn.run(func).await,
        }
    }
}

#[async_trait]
impl NativeStatement for SqliteStatement {
    async fn query(&self, args: &[RowValues]) -> Result<Box<dyn NativeRows>, DriverError> {
        let sql = Arc::clone(&self.sql);
        let values = convert_params(args);
        let result_set = self.run(move |c| query::select(c, &sql, &values)).await?;
        Ok(Box::new(BufferedRows::from(result_set)))
    }

    async fn exec(&self, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        let sql = Arc::clone(&self.sql);
        let values = convert_params(args);
        self.run(move |c| query::execute(c, &sql, &values)).await
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        Ok(())
    }
}
