use std::sync::Arc;

use crate::types::RowValues;

/// A fully materialised native result: column names plus row values.
///
/// Backends that cannot hand out a live cursor build one of these and wrap it in
/// [`BufferedRows`](crate::driver::BufferedRows).
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Column names shared by all rows (to avoid duplicating in each row)
    column_names: Arc<Vec<String>>,
    rows: Vec<Vec<RowValues>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            column_names: Arc::new(Vec::new()),
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_names = column_names;
    }

    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        &self.column_names
    }

    /// Add a row to the result set
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        self.rows.push(row_values);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn into_parts(self) -> (Arc<Vec<String>>, Vec<Vec<RowValues>>) {
        (self.column_names, self.rows)
    }
}
