//! Data type definitions for Tessel.

use crate::value::Value;

/// Supported column data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Date and time stored as Unix timestamp (milliseconds)
    DateTime,
    /// Binary data
    Bytes,
}

impl DataType {
    /// Returns the zero value used when a NOT NULL column has no declared default.
    pub fn zero_value(&self) -> Value {
        match self {
            DataType::Boolean => Value::Boolean(false),
            DataType::Int32 => Value::Int32(0),
            DataType::Int64 => Value::Int64(0),
            DataType::Float64 => Value::Float64(0.0),
            DataType::String => Value::String(String::new()),
            DataType::DateTime => Value::DateTime(0),
            DataType::Bytes => Value::Bytes(Vec::new()),
        }
    }

    /// Returns whether columns of this type accept null unless told otherwise.
    pub fn is_nullable_by_default(&self) -> bool {
        matches!(self, DataType::Bytes)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_value_matches_type() {
        for dt in [
            DataType::Boolean,
            DataType::Int32,
            DataType::Int64,
            DataType::Float64,
            DataType::String,
            DataType::DateTime,
            DataType::Bytes,
        ] {
            assert_eq!(dt.zero_value().data_type(), Some(dt));
        }
    }

    #[test]
    fn test_nullable_by_default() {
        assert!(!DataType::Int64.is_nullable_by_default());
        assert!(!DataType::String.is_nullable_by_default());
        assert!(DataType::Bytes.is_nullable_by_default());
    }
}
