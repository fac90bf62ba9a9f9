//! Boundary to the concrete database client.
//!
//! Backends implement these traits; everything above them (routing, transactions, statements,
//! interpolation) is backend independent. Native failures are returned as [`DriverError`] and
//! never reinterpreted.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::{RowValues, TxOptions};

/// Raw outcome of a native exec call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// `None` when the backend has no notion of a last inserted id.
    pub last_insert_id: Option<i64>,
}

/// The shared native handle. Must be safe for concurrent use.
#[async_trait]
pub trait NativeConnection: Send + Sync + fmt::Debug {
    /// Short backend label used in logs.
    fn backend(&self) -> &'static str;

    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn NativeTransaction>, DriverError>;

    async fn prepare(&self, sql: &str) -> Result<Box<dyn NativeStatement>, DriverError>;

    async fn query(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn NativeRows>, DriverError>;

    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<ExecOutcome, DriverError>;

    async fn ping(&self) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// An open native transaction. Commit and rollback are each called at most once.
#[async_trait]
pub trait NativeTransaction: Send + Sync {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn NativeStatement>, DriverError>;

    async fn query(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn NativeRows>, DriverError>;

    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<ExecOutcome, DriverError>;

    async fn commit(&self) -> Result<(), DriverError>;

    async fn rollback(&self) -> Result<(), DriverError>;
}

/// A native prepared statement, bound to whichever handle prepared it.
#[async_trait]
pub trait NativeStatement: Send + Sync {
    async fn query(&self, args: &[RowValues]) -> Result<Box<dyn NativeRows>, DriverError>;

    async fn exec(&self, args: &[RowValues]) -> Result<ExecOutcome, DriverError>;

    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// A forward-only native cursor.
#[async_trait]
pub trait NativeRows: Send + Sync {
    fn columns(&self) -> Arc<Vec<String>>;

    /// `Ok(None)` once the cursor is exhausted.
    async fn next(&mut self) -> Result<Option<Vec<RowValues>>, DriverError>;

    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// Cursor over a result set the backend has already materialised.
#[derive(Debug)]
pub struct BufferedRows {
    columns: Arc<Vec<String>>,
    rows: std::vec::IntoIter<Vec<RowValues>>,
}

impl From<ResultSet> for BufferedRows {
    fn from(result_set: ResultSet) -> Self {
        let (columns, rows) = result_set.into_parts();
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

#[async_trait]
impl NativeRows for BufferedRows {
    fn columns(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.columns)
    }

    async fn next(&mut self) -> Result<Option<Vec<RowValues>>, DriverError> {
        Ok(self.rows.next())
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        Ok(())
    }
}
