//! `PostgreSQL` backend over `tokio-postgres`, pooled by `bb8`.

mod config;
mod connection;
mod params;
mod query;
mod statement;
mod transaction;

pub use config::{PgManager, PgPool};
pub use connection::PgConnection;
pub use query::{build_result_set, postgres_extract_value};
