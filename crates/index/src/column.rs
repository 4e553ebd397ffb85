//! Persistent column index.
//!
//! The entries live behind an `Arc`; cloning a `ColumnIndex` is a snapshot
//! and the first write to a shared snapshot copies it (`Arc::make_mut`), so
//! a transaction mutating its copy never disturbs the committed one.

use crate::traits::{Index, KeyRange, RangeIndex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tessel_core::{RowNumber, Value};

/// Index of one column: value → rows holding that value.
#[derive(Clone, Debug, Default)]
pub struct ColumnIndex {
    entries: Arc<BTreeMap<Value, BTreeSet<RowNumber>>>,
    len: usize,
}

impl ColumnIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if both indexes still share the same storage.
    pub fn shares_storage(&self, other: &ColumnIndex) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// Rows equal to `key`, without allocating a vector.
    pub fn rows_for(&self, key: &Value) -> Option<&BTreeSet<RowNumber>> {
        self.entries.get(key)
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

impl Index<Value> for ColumnIndex {
    fn insert(&mut self, key: Value, row: RowNumber) {
        if Arc::make_mut(&mut self.entries).entry(key).or_default().insert(row) {
            self.len += 1;
        }
    }

    fn remove(&mut self, key: &Value, row: RowNumber) -> bool {
        if !self.entries.get(key).is_some_and(|rows| rows.contains(&row)) {
            return false;
        }
        let entries = Arc::make_mut(&mut self.entries);
        if let Some(rows) = entries.get_mut(key) {
            rows.remove(&row);
            if rows.is_empty() {
                entries.remove(key);
            }
        }
        self.len -= 1;
        true
    }

    fn get(&self, key: &Value) -> Vec<RowNumber> {
        self.entries
            .get(key)
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default()
    }

    fn contains_key(&self, key: &Value) -> bool {
        self.entries.contains_key(key)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.entries = Arc::new(BTreeMap::new());
        self.len = 0;
    }
}

impl RangeIndex<Value> for ColumnIndex {
    fn get_range(
        &self,
        range: Option<&KeyRange<Value>>,
        reverse: bool,
        limit: Option<usize>,
        skip: usize,
    ) -> Vec<RowNumber> {
        let all = KeyRange::All;
        let range = range.unwrap_or(&all);
        if range.is_empty() {
            return Vec::new();
        }
        let limit = limit.unwrap_or(usize::MAX);
        let matched = self.entries.range::<Value, _>(range.bounds());
        if reverse {
            matched
                .rev()
                .flat_map(|(_, rows)| rows.iter().rev().copied())
                .skip(skip)
                .take(limit)
                .collect()
        } else {
            matched
                .flat_map(|(_, rows)| rows.iter().copied())
                .skip(skip)
                .take(limit)
                .collect()
        }
    }
}
