mod exec;
mod result_set;
mod row;
mod rows;

pub use exec::{ExecResult, InsertResult};
pub use result_set::ResultSet;
pub use row::{FromRow, FromValue, Row};
pub use rows::Rows;
