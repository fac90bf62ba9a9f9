use std::fmt;

use thiserror::Error;

/// Top-level operation an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Begin,
    Prepare,
    Query,
    Insert,
    Exec,
    Commit,
    Rollback,
    Ping,
    Close,
    RowsNext,
    RowsClose,
    StatementClose,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Begin => "begin",
            Operation::Prepare => "prepare",
            Operation::Query => "query",
            Operation::Insert => "insert",
            Operation::Exec => "exec",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
            Operation::Ping => "ping",
            Operation::Close => "close",
            Operation::RowsNext => "rows next",
            Operation::RowsClose => "rows close",
            Operation::StatementClose => "statement close",
        };
        f.write_str(name)
    }
}

/// Failure reported by a native database client, passed through uninterpreted.
#[derive(Debug, Error)]
pub enum DriverError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    #[error("pool checkout error: {0}")]
    Pool(String),

    #[error("connection is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum SqlAdapterError {
    #[error("connection failure during {op}: {source}")]
    ConnectionFailure {
        op: Operation,
        #[source]
        source: DriverError,
    },

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("prepare failed: {source}")]
    PrepareFailure {
        #[source]
        source: DriverError,
    },

    #[error("{op} failed: {source}")]
    ExecutionFailure {
        op: Operation,
        #[source]
        source: DriverError,
    },

    #[error("scan error: {0}")]
    ScanError(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("transaction state error: {0}")]
    TransactionState(String),

    #[error("{0} cancelled")]
    Cancelled(Operation),

    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(Operation),

    #[error("request has no {0} attached")]
    MissingAttachment(&'static str),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl SqlAdapterError {
    pub(crate) fn connection(op: Operation) -> impl FnOnce(DriverError) -> Self {
        move |source| SqlAdapterError::ConnectionFailure { op, source }
    }

    pub(crate) fn execution(op: Operation) -> impl FnOnce(DriverError) -> Self {
        move |source| SqlAdapterError::ExecutionFailure { op, source }
    }

    pub(crate) fn prepare(source: DriverError) -> Self {
        SqlAdapterError::PrepareFailure { source }
    }

    /// Whether the call was cut short by cancellation or its deadline.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            SqlAdapterError::Cancelled(_) | SqlAdapterError::DeadlineExceeded(_)
        )
    }

    /// The operation this error was attributed to, when one was recorded.
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        match self {
            SqlAdapterError::ConnectionFailure { op, .. }
            | SqlAdapterError::ExecutionFailure { op, .. } => Some(*op),
            SqlAdapterError::PrepareFailure { .. } => Some(Operation::Prepare),
            SqlAdapterError::Cancelled(op) | SqlAdapterError::DeadlineExceeded(op) => Some(*op),
            _ => None,
        }
    }
}
