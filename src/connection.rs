use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::context::Context;
use crate::driver::{ExecOutcome, NativeConnection};
use crate::error::{DriverError, Operation, SqlAdapterError};
use crate::interpolation::StrategyFactory;
use crate::query::Query;
use crate::results::{ExecResult, InsertResult, Rows};
use crate::statement::{Statement, StatementBinding};
use crate::transaction::{NestedTransaction, Transaction};
use crate::types::TxOptions;

struct ConnectionInner {
    native: Arc<dyn NativeConnection>,
    factory: StrategyFactory,
    closed: AtomicBool,
}

/// Shared handle to a native database connection plus the strategy factory for its dialect.
///
/// Cloning is cheap and every clone refers to the same native handle. Operations that are not
/// routed through a transaction run here, each with a fresh interpolation strategy.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn new(native: Arc<dyn NativeConnection>, factory: StrategyFactory) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                native,
                factory,
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn factory(&self) -> &StrategyFactory {
        &self.inner.factory
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.inner.native.backend()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self, op: Operation) -> Result<(), SqlAdapterError> {
        if self.is_closed() {
            Err(SqlAdapterError::ConnectionFailure {
                op,
                source: DriverError::Closed,
            })
        } else {
            Ok(())
        }
    }

    /// Run an ad-hoc query against the connection.
    ///
    /// # Errors
    /// `MalformedQuery` if interpolation fails, `ExecutionFailure` for native failures, or
    /// `ConnectionFailure` if the connection was closed.
    pub async fn query(&self, ctx: &Context, query: &Query) -> Result<Rows, SqlAdapterError> {
        self.ensure_open(Operation::Query)?;
        let mut strategy = self.inner.factory.create();
        let (sql, args) = query.interpolate(strategy.as_mut())?;
        let native = &self.inner.native;
        let cursor = ctx
            .run(Operation::Query, async {
                native
                    .query(&sql, &args)
                    .await
                    .map_err(SqlAdapterError::execution(Operation::Query))
            })
            .await?;
        Ok(Rows::new(cursor))
    }

    /// Autocommit write on a pooled handle.
    ///
    /// A `Cancelled` or `DeadlineExceeded` result does not mean nothing was written: the SQLite
    /// backend interrupts the running statement, but a Postgres statement already sent to the
    /// server runs to completion and commits.
    ///
    /// # Errors
    /// Same as [`query`](Self::query).
    pub async fn insert(
        &self,
        ctx: &Context,
        query: &Query,
    ) -> Result<InsertResult, SqlAdapterError> {
        self.run_exec(ctx, query, Operation::Insert)
            .await
            .map(InsertResult::from)
    }

    /// Insert viewed as a plain result, with the same cancellation caveat.
    ///
    /// # Errors
    /// Same as [`query`](Self::query).
    pub async fn exec(&self, ctx: &Context, query: &Query) -> Result<ExecResult, SqlAdapterError> {
        self.run_exec(ctx, query, Operation::Exec)
            .await
            .map(|outcome| InsertResult::from(outcome).into())
    }

    async fn run_exec(
        &self,
        ctx: &Context,
        query: &Query,
        op: Operation,
    ) -> Result<ExecOutcome, SqlAdapterError> {
        self.ensure_open(op)?;
        let mut strategy = self.inner.factory.create();
        let (sql, args) = query.interpolate(strategy.as_mut())?;
        let native = &self.inner.native;
        ctx.run(op, async {
            native
                .exec(&sql, &args)
                .await
                .map_err(SqlAdapterError::execution(op))
        })
        .await
    }

    /// Prepare `query` against the connection; the statement stays bound here.
    ///
    /// The template is interpolated before the native client is contacted, so a malformed query
    /// never reaches it.
    ///
    /// # Errors
    /// `MalformedQuery` for template/parameter mismatches, `PrepareFailure` for native failures.
    pub async fn prepare(&self, ctx: &Context, query: &Query) -> Result<Statement, SqlAdapterError> {
        self.ensure_open(Operation::Prepare)?;
        let mut strategy = self.inner.factory.create();
        let sql = query.interpolated_text(strategy.as_mut())?;
        let native = &self.inner.native;
        let prepared = ctx
            .run(Operation::Prepare, async {
                native.prepare(&sql).await.map_err(SqlAdapterError::prepare)
            })
            .await?;
        debug!(backend = self.backend(), sql = %sql, "prepared statement on connection");
        Ok(Statement::new(
            prepared,
            strategy,
            Arc::new(query.clone()),
            sql,
            StatementBinding::Connection(self.clone()),
        ))
    }

    /// Start a single-level transaction with `options` passed through to the native client.
    ///
    /// # Errors
    /// `ConnectionFailure` if the native begin fails.
    pub async fn begin(
        &self,
        ctx: &Context,
        options: &TxOptions,
    ) -> Result<Transaction, SqlAdapterError> {
        self.ensure_open(Operation::Begin)?;
        let native = &self.inner.native;
        let tx = ctx
            .run(Operation::Begin, async {
                native
                    .begin(options)
                    .await
                    .map_err(SqlAdapterError::connection(Operation::Begin))
            })
            .await?;
        debug!(backend = self.backend(), ?options, "transaction started");
        Ok(Transaction::new(tx, self.inner.factory.clone()))
    }

    /// Start an outermost transaction that reports itself as nestable.
    ///
    /// # Errors
    /// See [`begin`](Self::begin).
    pub async fn begin_nested(
        &self,
        ctx: &Context,
        options: &TxOptions,
    ) -> Result<NestedTransaction, SqlAdapterError> {
        self.begin(ctx, options).await.map(NestedTransaction::new)
    }

    /// # Errors
    /// `ConnectionFailure` if the native client is unreachable.
    pub async fn ping(&self, ctx: &Context) -> Result<(), SqlAdapterError> {
        self.ensure_open(Operation::Ping)?;
        let native = &self.inner.native;
        ctx.run(Operation::Ping, async {
            native
                .ping()
                .await
                .map_err(SqlAdapterError::connection(Operation::Ping))
        })
        .await
    }

    /// Close the native connection. Every later connection-level call fails.
    ///
    /// If the native close fails the connection stays open and `close` may be called again.
    ///
    /// # Errors
    /// `ConnectionFailure` if already closed or the native close fails.
    pub async fn close(&self, ctx: &Context) -> Result<(), SqlAdapterError> {
        self.ensure_open(Operation::Close)?;
        let native = &self.inner.native;
        ctx.run(Operation::Close, async {
            native
                .close()
                .await
                .map_err(SqlAdapterError::connection(Operation::Close))
        })
        .await?;
        // only a successful native close retires the connection
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("native", &self.inner.native)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
