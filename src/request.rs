use crate::error::SqlAdapterError;
use crate::query::{Parameters, Query};
use crate::results::{ExecResult, InsertResult, Row, Rows};
use crate::statement::Statement;
use crate::transaction::TxExecutor;
use crate::types::TxOptions;

/// Per-request state shared between the hook engine and the adapter.
///
/// The engine fills the inputs (query, parameters, transaction options); hooks attach what
/// they produce (transaction executor, statement, rows, row, results) or record an error.
#[derive(Debug, Default)]
pub struct Request {
    pub(crate) query: Option<Query>,
    pub(crate) parameters: Option<Parameters>,
    pub(crate) tx_options: TxOptions,
    pub(crate) executor: Option<TxExecutor>,
    pub(crate) statement: Option<Statement>,
    pub(crate) rows: Option<Rows>,
    pub(crate) row: Option<Row>,
    pub(crate) result: Option<ExecResult>,
    pub(crate) insert_result: Option<InsertResult>,
    pub(crate) error: Option<SqlAdapterError>,
}

impl Request {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub fn with_tx_options(mut self, options: TxOptions) -> Self {
        self.tx_options = options;
        self
    }

    pub fn set_query(&mut self, query: Query) {
        self.query = Some(query);
    }

    #[must_use]
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Values bound by the statement hooks.
    pub fn set_parameters(&mut self, parameters: Parameters) {
        self.parameters = Some(parameters);
    }

    #[must_use]
    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }

    pub fn set_tx_options(&mut self, options: TxOptions) {
        self.tx_options = options;
    }

    #[must_use]
    pub fn tx_options(&self) -> &TxOptions {
        &self.tx_options
    }

    #[must_use]
    pub fn executor(&self) -> Option<&TxExecutor> {
        self.executor.as_ref()
    }

    pub fn executor_mut(&mut self) -> Option<&mut TxExecutor> {
        self.executor.as_mut()
    }

    /// Detach the transaction executor, e.g. once the engine is done with a finished one.
    pub fn take_executor(&mut self) -> Option<TxExecutor> {
        self.executor.take()
    }

    #[must_use]
    pub fn statement(&self) -> Option<&Statement> {
        self.statement.as_ref()
    }

    pub fn take_statement(&mut self) -> Option<Statement> {
        self.statement.take()
    }

    #[must_use]
    pub fn rows(&self) -> Option<&Rows> {
        self.rows.as_ref()
    }

    pub fn take_rows(&mut self) -> Option<Rows> {
        self.rows.take()
    }

    /// The row produced by the latest `RowsNext`; `None` once the cursor is exhausted.
    #[must_use]
    pub fn row(&self) -> Option<&Row> {
        self.row.as_ref()
    }

    pub fn take_row(&mut self) -> Option<Row> {
        self.row.take()
    }

    #[must_use]
    pub fn result(&self) -> Option<&ExecResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn insert_result(&self) -> Option<&InsertResult> {
        self.insert_result.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&SqlAdapterError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<SqlAdapterError> {
        self.error.take()
    }

    pub(crate) fn set_error(&mut self, error: SqlAdapterError) {
        self.error = Some(error);
    }
}
