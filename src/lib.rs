//! Execution adapter between a SQL hook engine and a concrete database client.
//!
//! For each hook invocation the adapter picks the executor that services the call (the shared
//! [`Connection`], the transaction attached to the [`Request`], or a prepared [`Statement`]),
//! rewrites the engine-agnostic [`Query`] into the client's placeholder dialect and wraps the
//! native results.
//!
//! ```rust,no_run
//! use sql_engine_adapter::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlAdapterError> {
//! let conn = SqliteOptionsBuilder::new("app.db").build().await?;
//! let adapter = SqlAdapter::new(conn);
//! let ctx = Context::background();
//!
//! let mut req = Request::new().with_query(Query::positional(
//!     "INSERT INTO t (a) VALUES (?)",
//!     vec![RowValues::Int(5)],
//! ));
//! for hook in [Hook::Begin, Hook::Insert, Hook::Commit] {
//!     if adapter.handle(hook, &ctx, &mut req).await == Flow::Halt {
//!         return Err(req.take_error().expect("halted hooks record an error"));
//!     }
//! }
//! assert_eq!(req.insert_result().map(InsertResult::rows_affected), Some(1));
//! # Ok(()) }
//! ```

pub mod config;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod hooks;
pub mod interpolation;
pub mod prelude;
pub mod query;
pub mod request;
pub mod results;
pub mod statement;
pub mod transaction;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{
    AdapterConfig, PostgresOptions, PostgresOptionsBuilder, SqliteOptions, SqliteOptionsBuilder,
};
pub use connection::Connection;
pub use context::Context;
pub use dispatch::SqlAdapter;
pub use error::{DriverError, Operation, SqlAdapterError};
pub use hooks::{Flow, Hook, HookHandler, HookRegistry, install_nested, install_single};
pub use query::{Parameters, Query};
pub use request::Request;
pub use statement::Statement;
pub use transaction::{NestedTransaction, QueryExecTransaction, Transaction, TxExecutor, TxState};
pub use types::{DatabaseType, IsolationLevel, RowValues, TxOptions};
