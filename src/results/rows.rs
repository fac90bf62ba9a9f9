use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::driver::NativeRows;
use crate::error::{Operation, SqlAdapterError};

use super::row::Row;

/// Forward-only cursor over a query result.
///
/// Every call to [`next`](Rows::next) derives a fresh [`Row`] from the current cursor position;
/// rows are never cached between calls. [`close`](Rows::close) consumes the cursor.
pub struct Rows {
    native: Box<dyn NativeRows>,
    columns: Arc<Vec<String>>,
    exhausted: bool,
}

impl Rows {
    pub(crate) fn new(native: Box<dyn NativeRows>) -> Self {
        let columns = native.columns();
        Self {
            native,
            columns,
            exhausted: false,
        }
    }

    /// Ordered column names of the result.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Advance the cursor. `Ok(None)` signals exhaustion and keeps being returned afterwards.
    ///
    /// # Errors
    /// Returns `ExecutionFailure` if the native fetch fails, or `Cancelled`/`DeadlineExceeded`.
    pub async fn next(&mut self, ctx: &Context) -> Result<Option<Row>, SqlAdapterError> {
        if self.exhausted {
            return Ok(None);
        }
        let native = &mut self.native;
        let fetched = ctx
            .run(Operation::RowsNext, async move {
                native
                    .next()
                    .await
                    .map_err(SqlAdapterError::execution(Operation::RowsNext))
            })
            .await?;
        match fetched {
            Some(values) => Ok(Some(Row::new(Arc::clone(&self.columns), values))),
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Release the cursor.
    ///
    /// # Errors
    /// Returns `ExecutionFailure` if the native close fails.
    pub async fn close(self, ctx: &Context) -> Result<(), SqlAdapterError> {
        let native = self.native;
        ctx.run(Operation::RowsClose, async move {
            native
                .close()
                .await
                .map_err(SqlAdapterError::execution(Operation::RowsClose))
        })
        .await
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.columns)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}
