use std::sync::Arc;

use async_trait::async_trait;

use crate::driver::{BufferedRows, ExecOutcome, NativeRows, NativeStatement};
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::config::{PgPool, pool_error};
use super::params::param_refs;
use super::query::build_result_set;
use super::transaction::PgTxConn;

/// Where a statement runs.
///
/// Connection-bound statements keep only their SQL and are prepared on whichever pooled client
/// serves the call. Statements prepared in a transaction stay on its session.
enum StatementTarget {
    Pool { pool: PgPool, sql: Arc<str> },
    Transaction {
        conn: Arc<PgTxConn>,
        stmt: tokio_postgres::Statement,
    },
}

pub(crate) struct PgStatement {
    target: StatementTarget,
}

impl PgStatement {
    pub(crate) fn on_pool(pool: PgPool, sql: &str) -> Self {
        Self {
            target: StatementTarget::Pool {
                pool,
                sql: Arc::from(sql),
            },
        }
    }

    pub(crate) fn in_transaction(conn: Arc<PgTxConn>, stmt: tokio_postgres::Statement) -> Self {
        Self {
            target: StatementTarget::Transaction { conn, stmt },
        }
    }
}

#[async_trait]
impl NativeStatement for PgStatement {
    async fn query(&self, args: &[RowValues]) -> Result<Box<dyn NativeRows>, DriverError> {
        let refs = param_refs(args);
        let result_set: ResultSet = match &self.target {
            StatementTarget::Pool { pool, sql } => {
                let client = pool.get().await.map_err(pool_error)?;
                let stmt = client.prepare(sql).await?;
                let rows = client.query(&stmt, &refs).await?;
                build_result_set(&stmt, &rows)?
            }
            StatementTarget::Transaction { conn, stmt } => {
                let guard = conn.client.lock().await;
                let client = guard.as_ref().ok_or(DriverError::Closed)?;
                let rows = client.query(stmt, &refs).await?;
                build_result_set(stmt, &rows)?
            }
        };
        Ok(Box::new(BufferedRows::from(result_set)))
    }

    async fn exec(&self, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        let refs = param_refs(args);
        let rows_affected = match &self.target {
            StatementTarget::Pool { pool, sql } => {
                let client = pool.get().await.map_err(pool_error)?;
                let stmt = client.prepare(sql).await?;
                client.execute(&stmt, &refs).await?
            }
            StatementTarget::Transaction { conn, stmt } => {
                let guard = conn.client.lock().await;
                let client = guard.as_ref().ok_or(DriverError::Closed)?;
                client.execute(stmt, &refs).await?
            }
        };
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        // dropping the statement deallocates it on the server
        Ok(())
    }
}
