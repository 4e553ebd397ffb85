//! Rows and row identities.

use crate::value::Value;
use core::fmt;

/// Identifier of a table source, unique within a database.
pub type TableId = u32;

/// Physical row number inside one table source. Allocated once, never reused.
pub type RowNumber = u64;

/// Composite identity of a row: the table it lives in and its row number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    table: TableId,
    number: RowNumber,
}

impl RowId {
    pub fn new(table: TableId, number: RowNumber) -> Self {
        Self { table, number }
    }

    #[inline]
    pub fn table(&self) -> TableId {
        self.table
    }

    #[inline]
    pub fn number(&self) -> RowNumber {
        self.number
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.table, self.number)
    }
}

/// The values of one row, indexed by column position.
///
/// Rows are immutable once handed to a table source; an update stores a new
/// row under a new row number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value at the given column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Sets a value at the given column index. Returns false when out of range.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Projects the values at `columns`, substituting null for missing positions.
    pub fn key(&self, columns: &[usize]) -> Vec<Value> {
        columns
            .iter()
            .map(|&i| self.values.get(i).cloned().unwrap_or(Value::Null))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_get_set() {
        let mut row = Row::new(vec![Value::Int64(1), Value::String("Alice".into())]);
        assert_eq!(row.get(1), Some(&Value::String("Alice".into())));
        assert!(row.set(0, Value::Int64(100)));
        assert_eq!(row.get(0), Some(&Value::Int64(100)));
        assert!(!row.set(10, Value::Int64(999)));
    }

    #[test]
    fn test_row_key_projection() {
        let row = Row::new(vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
        assert_eq!(row.key(&[2, 0]), vec![Value::Int64(3), Value::Int64(1)]);
        assert_eq!(row.key(&[5]), vec![Value::Null]);
    }

    #[test]
    fn test_row_id_ordering() {
        let a = RowId::new(1, 10);
        let b = RowId::new(1, 11);
        let c = RowId::new(2, 0);
        assert!(a < b && b < c);
        assert_eq!(a.to_string(), "(1,10)");
    }
}
