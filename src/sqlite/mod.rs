//! `SQLite` backend.
//!
//! `rusqlite` connections are pooled by `bb8` and every blocking call runs on
//! `tokio::task::spawn_blocking` behind a per-connection mutex. Results are materialised before
//! they are handed back as a cursor.

mod config;
mod connection;
mod params;
mod query;
mod statement;
mod transaction;

pub use config::{SharedSqliteConnection, SqliteHandle, SqliteManager, SqlitePool};
pub use connection::SqliteConnection;
pub use query::build_result_set;
