//! SQL value types moved between source and target.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type hint for NULL values.
///
/// A NULL still has a column type; the target needs it to create the column
/// when a whole batch is NULL in that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint.
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    /// Arbitrary-precision decimal (decimal, numeric).
    Decimal(Decimal),
    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlNullType for this value.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::String(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }

    /// Prepare a value for loading.
    ///
    /// Decimals become `f64`, including typed NULLs, so a decimal column
    /// lands as `double precision` whatever the first batch holds. The
    /// conversion is lossy beyond ~15 significant digits. Everything else
    /// passes through unchanged.
    #[must_use]
    pub fn normalize(self) -> SqlValue {
        match self {
            SqlValue::Decimal(d) => match d.to_f64() {
                Some(f) => SqlValue::F64(f),
                None => SqlValue::Null(SqlNullType::F64),
            },
            SqlValue::Null(SqlNullType::Decimal) => SqlValue::Null(SqlNullType::F64),
            other => other,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

/// A batch of rows with the destination column names they load into.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Destination (sanitized) column names, in row order.
    pub columns: Vec<String>,

    /// Rows in this batch.
    pub rows: Vec<Vec<SqlValue>>,
}

impl Batch {
    /// Create a new batch.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column types for this batch: the first non-NULL value of each column,
    /// falling back to the NULL type hint of the first row.
    pub fn column_types(&self) -> Vec<SqlNullType> {
        (0..self.columns.len())
            .map(|idx| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .find(|v| !v.is_null())
                    .or_else(|| self.rows.first().and_then(|row| row.get(idx)))
                    .map(SqlValue::null_type)
                    .unwrap_or(SqlNullType::String)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null(SqlNullType::String).is_null());
        assert!(!SqlValue::I32(42).is_null());
    }

    #[test]
    fn test_normalize_decimal_to_float() {
        let d = Decimal::from_str("123.45").unwrap();
        assert_eq!(SqlValue::Decimal(d).normalize(), SqlValue::F64(123.45));
    }

    #[test]
    fn test_normalize_decimal_is_lossy() {
        let d = Decimal::from_str("12345678901234567890.123456789").unwrap();
        match SqlValue::Decimal(d).normalize() {
            SqlValue::F64(f) => assert!((f - 1.2345678901234567e19).abs() < 1e6),
            other => panic!("expected F64, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_null_decimal() {
        assert_eq!(
            SqlValue::Null(SqlNullType::Decimal).normalize(),
            SqlValue::Null(SqlNullType::F64)
        );
    }

    #[test]
    fn test_normalize_passes_other_values_through() {
        let values = vec![
            SqlValue::I32(7),
            SqlValue::String("x".into()),
            SqlValue::F32(1.5),
            SqlValue::Null(SqlNullType::I64),
            SqlValue::Bytes(vec![1, 2, 3]),
        ];
        for v in values {
            assert_eq!(v.clone().normalize(), v);
        }
    }

    #[test]
    fn test_column_types_skip_leading_nulls() {
        let batch = Batch::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![SqlValue::Null(SqlNullType::String), SqlValue::Null(SqlNullType::I32)],
                vec![SqlValue::I64(5), SqlValue::Null(SqlNullType::I32)],
            ],
        );
        assert_eq!(
            batch.column_types(),
            vec![SqlNullType::I64, SqlNullType::I32]
        );
    }

    #[test]
    fn test_batch_len() {
        let batch = Batch::new(vec!["id".into()], vec![vec![1i32.into()], vec![2i32.into()]]);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }
}
