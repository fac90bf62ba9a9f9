//! Convenient imports for common functionality.

pub use crate::config::{
    AdapterConfig, PostgresOptions, PostgresOptionsBuilder, SqliteOptions, SqliteOptionsBuilder,
};
pub use crate::connection::Connection;
pub use crate::context::Context;
pub use crate::dispatch::SqlAdapter;
pub use crate::driver::{
    BufferedRows, ExecOutcome, NativeConnection, NativeRows, NativeStatement, NativeTransaction,
};
pub use crate::error::{DriverError, Operation, SqlAdapterError};
pub use crate::hooks::{Flow, Hook, HookHandler, HookRegistry, install_nested, install_single};
pub use crate::interpolation::{
    DollarNumberedStrategy, InterpolationStrategy, PlaceholderStyle, QuestionMarkStrategy,
    QuestionNumberedStrategy, StrategyFactory,
};
pub use crate::query::{Parameters, Query};
pub use crate::request::Request;
pub use crate::results::{ExecResult, FromRow, FromValue, InsertResult, ResultSet, Row, Rows};
pub use crate::statement::Statement;
pub use crate::transaction::{
    NestedTransaction, QueryExecTransaction, Transaction, TxExecutor, TxState,
};
pub use crate::types::{DatabaseType, IsolationLevel, RowValues, TxOptions};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PgConnection, PgManager};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConnection, SqliteManager};
