use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::driver::{BufferedRows, ExecOutcome, NativeRows, NativeStatement, NativeTransaction};
use crate::error::DriverError;
use crate::types::RowValues;

use super::config::PgPooledConnection;
use super::params::param_refs;
use super::query::build_result_set;
use super::statement::PgStatement;

/// Pooled client holding the open transaction; shared with statements prepared inside it.
pub(crate) struct PgTxConn {
    pub(crate) client: Mutex<Option<PgPooledConnection>>,
}

impl Drop for PgTxConn {
    fn drop(&mut self) {
        let Some(client) = self.client.get_mut().take() else {
            return;
        };
        warn!("postgres transaction dropped while active; rolling back");
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                let _ = client.batch_execute("ROLLBACK").await;
            });
        }
    }
}

pub(crate) struct PgTransaction {
    conn: Arc<PgTxConn>,
}

impl PgTransaction {
    pub(crate) fn new(client: PgPooledConnection) -> Self {
        Self {
            conn: Arc::new(PgTxConn {
                client: Mutex::new(Some(client)),
            }),
        }
    }

    async fn finish(&self, sql: &'static str) -> Result<(), DriverError> {
        let client = self.conn.client.lock().await.take().ok_or(DriverError::Closed)?;
        let res = client.batch_execute(sql).await;
        if res.is_err() && !client.is_closed() {
            let _ = client.batch_execute("ROLLBACK").await;
        }
        res.map_err(DriverError::from)
    }
}

#[async_trait]
impl NativeTransaction for PgTransaction {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn NativeStatement>, DriverError> {
        let guard = self.conn.client.lock().await;
        let client = guard.as_ref().ok_or(DriverError::Closed)?;
        let stmt = client.prepare(sql).await?;
        Ok(Box::new(PgStatement::in_transaction(
            Arc::clone(&self.conn),
            stmt,
        )))
    }

    async fn query(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn NativeRows>, DriverError> {
        let guard = self.conn.client.lock().await;
        let client = guard.as_ref().ok_or(DriverError::Closed)?;
        let stmt = client.prepare(sql).await?;
        let rows = client.query(&stmt, &param_refs(args)).await?;
        Ok(Box::new(BufferedRows::from(build_result_set(&stmt, &rows)?)))
    }

    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        let guard = self.conn.client.lock().await;
        let client = guard.as_ref().ok_or(DriverError::Closed)?;
        let rows_affected = client.execute(sql, &param_refs(args)).await?;
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn commit(&self) -> Result<(), DriverError> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), DriverError> {
        self.finish("ROLLBACK").await
    }
}
