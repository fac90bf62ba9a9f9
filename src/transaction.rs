use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::Context;
use crate::driver::{ExecOutcome, NativeTransaction};
use crate::error::{Operation, SqlAdapterError};
use crate::interpolation::{InterpolationStrategy, StrategyFactory};
use crate::query::Query;
use crate::results::{ExecResult, InsertResult, Rows};
use crate::statement::{Statement, StatementBinding};
use crate::types::TxOptions;

/// Lifecycle of a transaction. Everything but `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
    /// Commit or rollback failed, or a call inside the transaction was cancelled. The outcome
    /// is unknown to the caller; the backend is asked to roll back.
    Aborted,
}

impl TxState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, TxState::Active)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxState::Active => "active",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
            TxState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Native handle plus state, shared with statements prepared inside the transaction.
pub(crate) struct TxShared {
    native: Arc<dyn NativeTransaction>,
    state: Mutex<TxState>,
}

impl TxShared {
    pub(crate) fn native(&self) -> &dyn NativeTransaction {
        self.native.as_ref()
    }

    pub(crate) fn state(&self) -> TxState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: TxState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub(crate) fn ensure_active(&self, op: Operation) -> Result<(), SqlAdapterError> {
        match self.state() {
            TxState::Active => Ok(()),
            state => Err(SqlAdapterError::TransactionState(format!(
                "cannot {op} on a {state} transaction"
            ))),
        }
    }

    /// React to a failed call made inside this transaction.
    ///
    /// A cancelled or timed-out call may still have reached the client, so the transaction is
    /// marked `Aborted` and rolled back in the background. Later commits fail with
    /// `TransactionState`.
    pub(crate) fn note_failure(&self, err: &SqlAdapterError) {
        if !err.is_interrupted() {
            return;
        }
        self.set_state(TxState::Aborted);
        warn!(error = %err, "transaction aborted by an interrupted call; rolling back");
        let native = Arc::clone(&self.native);
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                if let Err(e) = native.rollback().await {
                    debug!(error = %e, "background rollback failed");
                }
            });
        }
    }

    /// Commit or roll back exactly once; any failure leaves the transaction `Aborted`.
    async fn finish(&self, ctx: &Context, op: Operation) -> Result<(), SqlAdapterError> {
        self.ensure_active(op)?;
        let native = self.native.as_ref();
        let res = ctx
            .run(op, async {
                let res = if op == Operation::Commit {
                    native.commit().await
                } else {
                    native.rollback().await
                };
                res.map_err(SqlAdapterError::execution(op))
            })
            .await;
        let next = match (&res, op) {
            (Ok(()), Operation::Commit) => TxState::Committed,
            (Ok(()), _) => TxState::RolledBack,
            (Err(_), _) => TxState::Aborted,
        };
        self.set_state(next);
        debug!(state = %next, "transaction finished");
        if let Err(err) = &res {
            self.note_failure(err);
        }
        res
    }
}

/// Operations every transaction executor offers, whatever its nesting level.
///
/// `exec` is `insert` viewed as a plain result: one native call backs both.
#[async_trait]
pub trait QueryExecTransaction: Send + Sync {
    async fn query(&mut self, ctx: &Context, query: &Query) -> Result<Rows, SqlAdapterError>;

    async fn insert(
        &mut self,
        ctx: &Context,
        query: &Query,
    ) -> Result<InsertResult, SqlAdapterError>;

    async fn exec(&mut self, ctx: &Context, query: &Query) -> Result<ExecResult, SqlAdapterError> {
        self.insert(ctx, query).await.map(ExecResult::from)
    }

    /// Prepare a statement bound to this transaction for its whole lifetime.
    async fn prepare(&self, ctx: &Context, query: &Query) -> Result<Statement, SqlAdapterError>;

    async fn commit(&mut self, ctx: &Context) -> Result<(), SqlAdapterError>;

    async fn rollback(&mut self, ctx: &Context) -> Result<(), SqlAdapterError>;

    fn state(&self) -> TxState;
}

/// A single-level transaction.
///
/// Holds one interpolation strategy instance for every query issued directly against it.
pub struct Transaction {
    shared: Arc<TxShared>,
    strategy: Box<dyn InterpolationStrategy>,
    factory: StrategyFactory,
}

impl Transaction {
    pub(crate) fn new(native: Box<dyn NativeTransaction>, factory: StrategyFactory) -> Self {
        Self {
            shared: Arc::new(TxShared {
                native: Arc::from(native),
                state: Mutex::new(TxState::Active),
            }),
            strategy: factory.create(),
            factory,
        }
    }

    async fn run_exec(
        &mut self,
        ctx: &Context,
        query: &Query,
        op: Operation,
    ) -> Result<ExecOutcome, SqlAdapterError> {
        self.shared.ensure_active(op)?;
        let (sql, args) = query.interpolate(self.strategy.as_mut())?;
        let native = self.shared.native();
        let res = ctx
            .run(op, async {
                native
                    .exec(&sql, &args)
                    .await
                    .map_err(SqlAdapterError::execution(op))
            })
            .await;
        if let Err(err) = &res {
            self.shared.note_failure(err);
        }
        res
    }
}

#[async_trait]
impl QueryExecTransaction for Transaction {
    async fn query(&mut self, ctx: &Context, query: &Query) -> Result<Rows, SqlAdapterError> {
        self.shared.ensure_active(Operation::Query)?;
        let (sql, args) = query.interpolate(self.strategy.as_mut())?;
        let native = self.shared.native();
        let cursor = ctx
            .run(Operation::Query, async {
                native
                    .query(&sql, &args)
                    .await
                    .map_err(SqlAdapterError::execution(Operation::Query))
            })
            .await
            .inspect_err(|err| self.shared.note_failure(err))?;
        Ok(Rows::new(cursor))
    }

    async fn insert(
        &mut self,
        ctx: &Context,
        query: &Query,
    ) -> Result<InsertResult, SqlAdapterError> {
        self.run_exec(ctx, query, Operation::Insert)
            .await
            .map(InsertResult::from)
    }

    async fn exec(&mut self, ctx: &Context, query: &Query) -> Result<ExecResult, SqlAdapterError> {
        self.run_exec(ctx, query, Operation::Exec)
            .await
            .map(|outcome| InsertResult::from(outcome).into())
    }

    async fn prepare(&self, ctx: &Context, query: &Query) -> Result<Statement, SqlAdapterError> {
        self.shared.ensure_active(Operation::Prepare)?;
        let mut strategy = self.factory.create();
        let sql = query.interpolated_text(strategy.as_mut())?;
        let native = self.shared.native();
        let prepared = ctx
            .run(Operation::Prepare, async {
                native.prepare(&sql).await.map_err(SqlAdapterError::prepare)
            })
            .await
            .inspect_err(|err| self.shared.note_failure(err))?;
        debug!(sql = %sql, "prepared statement in transaction");
        Ok(Statement::new(
            prepared,
            strategy,
            Arc::new(query.clone()),
            sql,
            StatementBinding::Transaction(Arc::clone(&self.shared)),
        ))
    }

    async fn commit(&mut self, ctx: &Context) -> Result<(), SqlAdapterError> {
        self.shared.finish(ctx, Operation::Commit).await
    }

    async fn rollback(&mut self, ctx: &Context) -> Result<(), SqlAdapterError> {
        self.shared.finish(ctx, Operation::Rollback).await
    }

    fn state(&self) -> TxState {
        self.shared.state()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.shared.state())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// A transaction that advertises nesting. Starting a further level is not supported; every
/// other operation behaves exactly like [`Transaction`].
#[derive(Debug)]
pub struct NestedTransaction {
    inner: Transaction,
}

impl NestedTransaction {
    pub(crate) fn new(inner: Transaction) -> Self {
        Self { inner }
    }

    /// Start a further-nested transaction.
    ///
    /// # Errors
    /// Always `Unsupported`; no native call is made.
    #[allow(clippy::unused_async)]
    pub async fn begin(
        &self,
        _ctx: &Context,
        _options: &TxOptions,
    ) -> Result<NestedTransaction, SqlAdapterError> {
        Err(SqlAdapterError::Unsupported(
            "nested transactions are not supported".into(),
        ))
    }
}

#[async_trait]
impl QueryExecTransaction for NestedTransaction {
    async fn query(&mut self, ctx: &Context, query: &Query) -> Result<Rows, SqlAdapterError> {
        self.inner.query(ctx, query).await
    }

    async fn insert(
        &mut self,
        ctx: &Context,
        query: &Query,
    ) -> Result<InsertResult, SqlAdapterError> {
        self.inner.insert(ctx, query).await
    }

    async fn exec(&mut self, ctx: &Context, query: &Query) -> Result<ExecResult, SqlAdapterError> {
        self.inner.exec(ctx, query).await
    }

    async fn prepare(&self, ctx: &Context, query: &Query) -> Result<Statement, SqlAdapterError> {
        self.inner.prepare(ctx, query).await
    }

    async fn commit(&mut self, ctx: &Context) -> Result<(), SqlAdapterError> {
        self.inner.commit(ctx).await
    }

    async fn rollback(&mut self, ctx: &Context) -> Result<(), SqlAdapterError> {
        self.inner.rollback(ctx).await
    }

    fn state(&self) -> TxState {
        self.inner.state()
    }
}

/// The transaction executor attached to a request, if any.
#[derive(Debug)]
pub enum TxExecutor {
    Single(Transaction),
    Nested(NestedTransaction),
}

impl TxExecutor {
    pub fn as_executor_mut(&mut self) -> &mut dyn QueryExecTransaction {
        match self {
            TxExecutor::Single(tx) => tx,
            TxExecutor::Nested(tx) => tx,
        }
    }

    #[must_use]
    pub fn state(&self) -> TxState {
        match self {
            TxExecutor::Single(tx) => tx.state(),
            TxExecutor::Nested(tx) => tx.state(),
        }
    }

    #[must_use]
    pub fn is_nested(&self) -> bool {
        matches!(self, TxExecutor::Nested(_))
    }
}

impl From<Transaction> for TxExecutor {
    fn from(tx: Transaction) -> Self {
        TxExecutor::Single(tx)
    }
}

impl From<NestedTransaction> for TxExecutor {
    fn from(tx: NestedTransaction) -> Self {
        TxExecutor::Nested(tx)
    }
}
