use std::fmt;
use std::sync::Arc;

use crate::connection::Connection;
use crate::context::Context;
use crate::driver::{ExecOutcome, NativeStatement};
use crate::error::{Operation, SqlAdapterError};
use crate::interpolation::InterpolationStrategy;
use crate::query::{Parameters, Query};
use crate::results::{ExecResult, InsertResult, Rows};
use crate::transaction::TxShared;
use crate::types::RowValues;

/// The executor that serviced `Prepare`. Fixed for the statement's whole lifetime.
pub(crate) enum StatementBinding {
    Connection(Connection),
    Transaction(Arc<TxShared>),
}

impl StatementBinding {
    fn ensure_usable(&self, op: Operation) -> Result<(), SqlAdapterError> {
        match self {
            StatementBinding::Connection(conn) => conn.ensure_open(op),
            StatementBinding::Transaction(shared) => shared.ensure_active(op),
        }
    }

    fn note_failure(&self, err: &SqlAdapterError) {
        if let StatementBinding::Transaction(shared) = self {
            shared.note_failure(err);
        }
    }
}

/// A prepared statement.
///
/// Keeps the strategy instance created at prepare time and the original query. Every execution
/// re-interpolates the original template with that same instance, so only argument values
/// change between calls. [`close`](Self::close) consumes the statement.
pub struct Statement {
    native: Box<dyn NativeStatement>,
    strategy: Box<dyn InterpolationStrategy>,
    query: Arc<Query>,
    sql: String,
    binding: StatementBinding,
}

impl Statement {
    pub(crate) fn new(
        native: Box<dyn NativeStatement>,
        strategy: Box<dyn InterpolationStrategy>,
        query: Arc<Query>,
        sql: String,
        binding: StatementBinding,
    ) -> Self {
        Self {
            native,
            strategy,
            query,
            sql,
            binding,
        }
    }

    /// Dialect SQL the statement was prepared with.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The query the statement was prepared from.
    #[must_use]
    pub fn original_query(&self) -> &Query {
        &self.query
    }

    /// Whether the statement was prepared inside a transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        matches!(self.binding, StatementBinding::Transaction(_))
    }

    fn bind(&mut self, op: Operation, params: &Parameters) -> Result<Vec<RowValues>, SqlAdapterError> {
        self.binding.ensure_usable(op)?;
        let (_, args) = params.interpolate(self.query.template(), self.strategy.as_mut())?;
        Ok(args)
    }

    /// # Errors
    /// `MalformedQuery` if `params` do not fit the template, `TransactionState` if the owning
    /// transaction has finished, `ExecutionFailure` for native failures.
    pub async fn query(
        &mut self,
        ctx: &Context,
        params: &Parameters,
    ) -> Result<Rows, SqlAdapterError> {
        let args = self.bind(Operation::Query, params)?;
        let native = self.native.as_ref();
        let cursor = ctx
            .run(Operation::Query, async {
                native
                    .query(&args)
                    .await
                    .map_err(SqlAdapterError::execution(Operation::Query))
            })
            .await
            .inspect_err(|err| self.binding.note_failure(err))?;
        Ok(Rows::new(cursor))
    }

    /// # Errors
    /// See [`query`](Self::query).
    pub async fn insert(
        &mut self,
        ctx: &Context,
        params: &Parameters,
    ) -> Result<InsertResult, SqlAdapterError> {
        self.run_exec(ctx, params, Operation::Insert)
            .await
            .map(InsertResult::from)
    }

    /// Insert viewed as a plain result.
    ///
    /// # Errors
    /// See [`query`](Self::query).
    pub async fn exec(
        &mut self,
        ctx: &Context,
        params: &Parameters,
    ) -> Result<ExecResult, SqlAdapterError> {
        self.run_exec(ctx, params, Operation::Exec)
            .await
            .map(|outcome| InsertResult::from(outcome).into())
    }

    async fn run_exec(
        &mut self,
        ctx: &Context,
        params: &Parameters,
        op: Operation,
    ) -> Result<ExecOutcome, SqlAdapterError> {
        let args = self.bind(op, params)?;
        let native = self.native.as_ref();
        let res = ctx
            .run(op, async {
                native
                    .exec(&args)
                    .await
                    .map_err(SqlAdapterError::execution(op))
            })
            .await;
        if let Err(err) = &res {
            self.binding.note_failure(err);
        }
        res
    }

    /// Release the native statement.
    ///
    /// # Errors
    /// `ExecutionFailure` if the native close fails.
    pub async fn close(self, ctx: &Context) -> Result<(), SqlAdapterError> {
        let native = self.native;
        ctx.run(Operation::StatementClose, async move {
            native
                .close()
                .await
                .map_err(SqlAdapterError::execution(Operation::StatementClose))
        })
        .await
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("query", &self.query)
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}
