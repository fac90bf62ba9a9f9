use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use crate::driver::ExecOutcome;
use crate::results::ResultSet;
use crate::types::RowValues;

fn sqlite_extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, rusqlite::Error> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Run a prepared statement and materialise every row.
///
/// # Errors
/// Returns the native error if the statement fails or a value cannot be read.
pub fn build_result_set(stmt: &mut Statement, params: &[Value]) -> Result<ResultSet, rusqlite::Error> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

pub(crate) fn select(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<ResultSet, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(sql)?;
    build_result_set(&mut stmt, params)
}

pub(crate) fn execute(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<ExecOutcome, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(sql)?;
    let changed = stmt.execute(params_from_iter(params.iter()))?;
    Ok(ExecOutcome {
        rows_affected: u64::try_from(changed).unwrap_or(u64::MAX),
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

/// Compile `sql` into the connection's statement cache.
pub(crate) fn warm(conn: &rusqlite::Connection, sql: &str) -> Result<(), rusqlite::Error> {
    conn.prepare_cached(sql).map(drop)
}
