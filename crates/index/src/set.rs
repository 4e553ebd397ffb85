//! Row-existence index and the per-table `IndexSet`.
//!
//! An `IndexSet` is the committed (or merged) index state of one table at a
//! point in time: the row-existence index plus one `ColumnIndex` per column.
//! Cloning it is a snapshot; every component is copy-on-write.

use crate::column::ColumnIndex;
use crate::traits::Index;
use std::collections::BTreeSet;
use std::sync::Arc;
use tessel_core::{RowNumber, Value};

/// Set of visible row numbers, iterated in ascending order.
#[derive(Clone, Debug, Default)]
pub struct RowIndex {
    rows: Arc<BTreeSet<RowNumber>>,
}

impl RowIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row: RowNumber) -> bool {
        if self.rows.contains(&row) {
            return false;
        }
        Arc::make_mut(&mut self.rows).insert(row)
    }

    pub fn remove(&mut self, row: RowNumber) -> bool {
        if !self.rows.contains(&row) {
            return false;
        }
        Arc::make_mut(&mut self.rows).remove(&row)
    }

    #[inline]
    pub fn contains(&self, row: RowNumber) -> bool {
        self.rows.contains(&row)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowNumber> + '_ {
        self.rows.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<RowNumber> {
        self.iter().collect()
    }

    pub fn shares_storage(&self, other: &RowIndex) -> bool {
        Arc::ptr_eq(&self.rows, &other.rows)
    }
}

/// Every index of one table at a point in time.
#[derive(Clone, Debug)]
pub struct IndexSet {
    rows: RowIndex,
    columns: Vec<ColumnIndex>,
}

impl IndexSet {
    /// Creates an empty index set for a table with `column_count` columns.
    pub fn new(column_count: usize) -> Self {
        Self {
            rows: RowIndex::new(),
            columns: vec![ColumnIndex::new(); column_count],
        }
    }

    /// Reassembles a set from individually maintained indexes.
    pub fn from_parts(rows: RowIndex, columns: Vec<ColumnIndex>) -> Self {
        Self { rows, columns }
    }

    #[inline]
    pub fn rows(&self) -> &RowIndex {
        &self.rows
    }

    pub fn column(&self, column: usize) -> Option<&ColumnIndex> {
        self.columns.get(column)
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Makes `row` visible and indexes its values.
    pub fn insert_row(&mut self, row: RowNumber, values: &[Value]) {
        self.rows.insert(row);
        for (index, value) in self.columns.iter_mut().zip(values) {
            index.insert(value.clone(), row);
        }
    }

    /// Hides `row` and drops its values from the column indexes.
    pub fn remove_row(&mut self, row: RowNumber, values: &[Value]) {
        self.rows.remove(row);
        for (index, value) in self.columns.iter_mut().zip(values) {
            index.remove(value, row);
        }
    }
}
