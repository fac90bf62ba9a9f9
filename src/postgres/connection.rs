use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::config::PostgresOptions;
use crate::driver::{
    BufferedRows, ExecOutcome, NativeConnection, NativeRows, NativeStatement, NativeTransaction,
};
use crate::error::{DriverError, SqlAdapterError};
use crate::types::{IsolationLevel, RowValues, TxOptions};

use super::config::{PgManager, PgPool, PgPooledConnection, pool_error};
use super::params::param_refs;
use super::query::build_result_set;
use super::statement::PgStatement;
use super::transaction::PgTransaction;

pub(crate) fn begin_sql(options: &TxOptions) -> String {
    let mut sql = String::from("BEGIN");
    if let Some(level) = options.isolation {
        sql.push_str(match level {
            IsolationLevel::ReadUncommitted => " ISOLATION LEVEL READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => " ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => " ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => " ISOLATION LEVEL SERIALIZABLE",
        });
    }
    if options.read_only {
        sql.push_str(" READ ONLY");
    }
    sql
}

/// Pooled Postgres handle implementing the native connection boundary.
///
/// Calls that are cancelled are dropped on the client side only; a statement already sent keeps
/// running on the server. Inside a transaction the adapter then rolls the transaction back, but an
/// ad-hoc autocommit write may still apply.
///
/// `close` drops this handle's pool. Idle clients disconnect once the last clone of the pool goes
/// away; open transactions and prepared statements each keep one until they are finished.
pub struct PgConnection {
    pool: Mutex<Option<PgPool>>,
}

impl PgConnection {
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: Mutex::new(Some(pool)),
        }
    }

    /// Build a pool for `opts`. Connections are opened lazily.
    ///
    /// # Errors
    /// Returns `ConfigError` if the pool cannot be built.
    pub async fn open(opts: &PostgresOptions) -> Result<Self, SqlAdapterError> {
        let pool = PgManager::from_options(opts)
            .build_pool(opts.pool_size)
            .await?;
        Ok(Self::from_pool(pool))
    }

    fn pool(&self) -> Result<PgPool, DriverError> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DriverError::Closed)
    }

    async fn checkout(&self) -> Result<PgPooledConnection, DriverError> {
        self.pool()?.get_owned().await.map_err(pool_error)
    }
}

#[async_trait]
impl NativeConnection for PgConnection {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn NativeTransaction>, DriverError> {
        let client = self.checkout().await?;
        client.batch_execute(&begin_sql(options)).await?;
        Ok(Box::new(PgTransaction::new(client)))
    }

    /// Validates `sql` on one pooled client, then releases it. The statement is re-prepared on
    /// whichever client serves each execution.
    async fn prepare(&self, sql: &str) -> Result<Box<dyn NativeStatement>, DriverError> {
        let pool = self.pool()?;
        let client = pool.get_owned().await.map_err(pool_error)?;
        client.prepare(sql).await?;
        Ok(Box::new(PgStatement::on_pool(pool, sql)))
    }

    async fn query(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn NativeRows>, DriverError> {
        let client = self.checkout().await?;
        let stmt = client.prepare(sql).await?;
        let rows = client.query(&stmt, &param_refs(args)).await?;
        Ok(Box::new(BufferedRows::from(build_result_set(&stmt, &rows)?)))
    }

    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        let client = self.checkout().await?;
        let rows_affected = client.execute(sql, &param_refs(args)).await?;
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn ping(&self) -> Result<(), DriverError> {
        let client = self.checkout().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DriverError::Closed)?;
        debug!(state = ?pool.state(), "closing postgres pool");
        drop(pool);
        Ok(())
    }
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.pool().ok().map(|pool| pool.state());
        f.debug_struct("PgConnection").field("pool", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_passes_options_through() {
        assert_eq!(begin_sql(&TxOptions::default()), "BEGIN");
        let opts = TxOptions::default()
            .with_isolation(IsolationLevel::Serializable)
            .read_only(true);
        assert_eq!(begin_sql(&opts), "BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY");
    }
}
