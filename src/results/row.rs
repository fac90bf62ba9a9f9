use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::SqlAdapterError;
use crate::types::RowValues;

/// Conversion from a column value into a Rust destination type.
pub trait FromValue: Sized {
    /// # Errors
    /// Returns a description of the mismatch when `value` cannot become `Self`.
    fn from_value(value: &RowValues) -> Result<Self, String>;
}

fn mismatch(value: &RowValues, target: &str) -> String {
    format!("cannot convert {} value into {target}", value.type_name())
}

impl FromValue for RowValues {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        match value {
            RowValues::Int(i) => Ok(*i),
            RowValues::Bool(b) => Ok(i64::from(*b)),
            other => Err(mismatch(other, "i64")),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        let wide = i64::from_value(value).map_err(|_| mismatch(value, "i32"))?;
        i32::try_from(wide).map_err(|e| format!("integer {wide} out of range for i32: {e}"))
    }
}

impl FromValue for u64 {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        let wide = i64::from_value(value).map_err(|_| mismatch(value, "u64"))?;
        u64::try_from(wide).map_err(|e| format!("integer {wide} out of range for u64: {e}"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value.as_float().ok_or_else(|| mismatch(value, "f64"))
    }
}

impl FromValue for bool {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value.as_bool().copied().ok_or_else(|| mismatch(value, "bool"))
    }
}

impl FromValue for String {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        match value {
            RowValues::Text(s) => Ok(s.clone()),
            RowValues::JSON(v) => Ok(v.to_string()),
            other => Err(mismatch(other, "String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        match value {
            RowValues::Blob(b) => Ok(b.clone()),
            RowValues::Text(s) => Ok(s.clone().into_bytes()),
            other => Err(mismatch(other, "Vec<u8>")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        value
            .as_timestamp()
            .ok_or_else(|| mismatch(value, "NaiveDateTime"))
    }
}

impl FromValue for JsonValue {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        match value {
            RowValues::JSON(v) => Ok(v.clone()),
            RowValues::Text(s) => serde_json::from_str(s).map_err(|e| format!("invalid json: {e}")),
            other => Err(mismatch(other, "serde_json::Value")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &RowValues) -> Result<Self, String> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// Positional binding of a whole row into a tuple of destinations.
pub trait FromRow: Sized {
    /// # Errors
    /// Returns `ScanError` if the arity differs from the row width or a column fails to convert.
    fn from_row(row: &Row) -> Result<Self, SqlAdapterError>;
}

macro_rules! impl_from_row_tuple {
    ($len:expr => $($ty:ident : $idx:tt),+) => {
        impl<$($ty: FromValue),+> FromRow for ($($ty,)+) {
            fn from_row(row: &Row) -> Result<Self, SqlAdapterError> {
                if row.len() != $len {
                    return Err(SqlAdapterError::ScanError(format!(
                        "expected {} destination values, row has {} columns",
                        $len,
                        row.len()
                    )));
                }
                Ok(($(row.get::<$ty>($idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(1 => A:0);
impl_from_row_tuple!(2 => A:0, B:1);
impl_from_row_tuple!(3 => A:0, B:1, C:2);
impl_from_row_tuple!(4 => A:0, B:1, C:2, D:3);
impl_from_row_tuple!(5 => A:0, B:1, C:2, D:3, E:4);
impl_from_row_tuple!(6 => A:0, B:1, C:2, D:3, E:4, F:5);
impl_from_row_tuple!(7 => A:0, B:1, C:2, D:3, E:4, F:5, G:6);
impl_from_row_tuple!(8 => A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7);

/// One positioned result, detached from the cursor that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<RowValues>,
}

impl Row {
    pub(crate) fn new(columns: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        Self { columns, values }
    }

    /// Ordered column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert the value at `index`.
    ///
    /// # Errors
    /// Returns `ScanError` if the index is out of range or the value does not convert.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T, SqlAdapterError> {
        let value = self.values.get(index).ok_or_else(|| {
            SqlAdapterError::ScanError(format!(
                "column index {index} out of range ({} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
            .map_err(|msg| SqlAdapterError::ScanError(format!("column {index}: {msg}")))
    }

    /// Convert the value of the named column.
    ///
    /// # Errors
    /// Returns `ScanError` if no column has that name or the value does not convert.
    pub fn get_by_name<T: FromValue>(&self, column: &str) -> Result<T, SqlAdapterError> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| SqlAdapterError::ScanError(format!("no column named `{column}`")))?;
        self.get(index)
    }

    /// Bind every column, in order, into a tuple of destinations.
    ///
    /// ```rust
    /// # use sql_engine_adapter::results::Row;
    /// # fn demo(row: &Row) -> Result<(), sql_engine_adapter::SqlAdapterError> {
    /// let (id, name): (i64, Option<String>) = row.scan()?;
    /// # let _ = (id, name);
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    /// Returns `ScanError` on arity or type mismatch; no default is substituted.
    pub fn scan<T: FromRow>(&self) -> Result<T, SqlAdapterError> {
        T::from_row(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<RowValues>) -> Row {
        let columns = (0..values.len()).map(|i| format!("c{i}")).collect();
        Row::new(Arc::new(columns), values)
    }

    #[test]
    fn scans_tuple_positionally() {
        let r = row(vec![
            RowValues::Int(5),
            RowValues::Text("five".into()),
            RowValues::Null,
        ]);
        let (id, name, missing): (i64, String, Option<f64>) = r.scan().unwrap();
        assert_eq!(id, 5);
        assert_eq!(name, "five");
        assert_eq!(missing, None);
    }

    #[test]
    fn type_mismatch_is_scan_error() {
        let r = row(vec![RowValues::Text("x".into())]);
        let err = r.scan::<(i64,)>().unwrap_err();
        assert!(matches!(err, SqlAdapterError::ScanError(_)));
    }

    #[test]
    fn null_into_non_option_is_scan_error() {
        let r = row(vec![RowValues::Null]);
        assert!(matches!(
            r.get::<String>(0),
            Err(SqlAdapterError::ScanError(_))
        ));
    }

    #[test]
    fn arity_mismatch_is_scan_error() {
        let r = row(vec![RowValues::Int(1), RowValues::Int(2)]);
        assert!(matches!(
            r.scan::<(i64,)>(),
            Err(SqlAdapterError::ScanError(_))
        ));
    }

    #[test]
    fn lookup_by_name() {
        let r = Row::new(
            Arc::new(vec!["id".into(), "flag".into()]),
            vec![RowValues::Int(9), RowValues::Int(1)],
        );
        assert_eq!(r.get_by_name::<i32>("id").unwrap(), 9);
        assert!(r.get_by_name::<bool>("flag").unwrap());
        assert!(r.get_by_name::<i64>("nope").is_err());
    }
}
