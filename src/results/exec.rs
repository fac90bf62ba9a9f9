use crate::driver::ExecOutcome;

/// Outcome of an exec call: rows affected, read once from the native result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    rows_affected: u64,
}

impl ExecResult {
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }
}

/// Outcome of an insert: rows affected plus the last inserted identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertResult {
    rows_affected: u64,
    last_insert_id: Option<i64>,
}

impl InsertResult {
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// `None` on backends without a last-insert-id concept (`PostgreSQL`).
    #[must_use]
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }
}

impl From<ExecOutcome> for InsertResult {
    fn from(outcome: ExecOutcome) -> Self {
        Self {
            rows_affected: outcome.rows_affected,
            last_insert_id: outcome.last_insert_id,
        }
    }
}

impl From<InsertResult> for ExecResult {
    fn from(result: InsertResult) -> Self {
        Self {
            rows_affected: result.rows_affected,
        }
    }
}
