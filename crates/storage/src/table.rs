//! Transaction-private view of one table.
//!
//! A `TransactionTable` pairs the committed index snapshot taken when its
//! transaction began with the transaction's own journal. Indexes are not
//! updated on every write; each cached index records how much of the
//! journal it has seen and replays the rest when it is next read.

use crate::journal::{TableEvent, TableEventRegistry};
use crate::source::TableSource;
use std::sync::Arc;
use tessel_core::schema::Table;
use tessel_core::{Error, Result, Row, RowId, RowNumber, TableId, Value};
use tessel_index::{ColumnIndex, Index, IndexSet, KeyRange, RangeIndex, RowIndex};
use tracing::trace;

/// An index together with the journal position it reflects.
#[derive(Clone, Debug)]
struct Cached<I> {
    index: I,
    watermark: usize,
}

/// A table as seen by one transaction.
#[derive(Debug)]
pub struct TransactionTable {
    source: Arc<TableSource>,
    schema: Arc<Table>,
    index_set: IndexSet,
    journal: TableEventRegistry,
    row_cache: Option<Cached<RowIndex>>,
    column_cache: Vec<Option<Cached<ColumnIndex>>>,
    read_only: bool,
    checkpoint: usize,
}

impl TransactionTable {
    pub(crate) fn new(source: Arc<TableSource>, index_set: IndexSet, read_only: bool) -> Self {
        let schema = source.schema();
        Self::with_schema(source, schema, index_set, read_only)
    }

    pub(crate) fn with_schema(
        source: Arc<TableSource>,
        schema: Arc<Table>,
        index_set: IndexSet,
        read_only: bool,
    ) -> Self {
        let column_count = index_set.column_count();
        let table_id = source.id();
        Self {
            source,
            schema,
            index_set,
            journal: TableEventRegistry::new(table_id),
            row_cache: None,
            column_cache: vec![None; column_count],
            read_only,
            checkpoint: 0,
        }
    }

    #[inline]
    pub fn table_id(&self) -> TableId {
        self.source.id()
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// The definition this transaction sees, including its own alterations.
    pub fn schema(&self) -> &Arc<Table> {
        &self.schema
    }

    pub fn source(&self) -> &Arc<TableSource> {
        &self.source
    }

    pub fn journal(&self) -> &TableEventRegistry {
        &self.journal
    }

    pub fn has_changes(&self) -> bool {
        !self.journal.is_empty()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only || self.source.is_read_only()
    }

    pub fn get_value(&self, row: RowNumber, column: usize) -> Result<Value> {
        self.source
            .get_value(row, column)
            .ok_or_else(|| Error::row_not_found(self.name(), row))
    }

    pub fn get_row(&self, row: RowNumber) -> Result<Arc<Row>> {
        self.source
            .get_row(row)
            .ok_or_else(|| Error::row_not_found(self.name(), row))
    }

    pub fn row_count(&mut self) -> usize {
        self.row_index().len()
    }

    /// Visible row numbers in ascending order.
    pub fn rows(&mut self) -> Vec<RowNumber> {
        self.row_index().to_vec()
    }

    pub fn contains_row(&mut self, row: RowNumber) -> bool {
        self.row_index().contains(row)
    }

    /// The index of `column`, caught up with this transaction's changes.
    pub fn get_index(&mut self, column: usize) -> Result<&ColumnIndex> {
        if column >= self.column_cache.len() {
            return Err(Error::invalid_operation(format!(
                "Table {} has no column {}",
                self.name(),
                column
            )));
        }
        Ok(self.column_index(column))
    }

    /// Visible rows whose `column` equals `value`.
    pub fn select_equal(&mut self, column: usize, value: &Value) -> Result<Vec<RowNumber>> {
        Ok(self.get_index(column)?.get(value))
    }

    /// Visible rows whose `column` falls in `range`, ordered by key.
    pub fn select_range(&mut self, column: usize, range: &KeyRange<Value>) -> Result<Vec<RowNumber>> {
        Ok(self.get_index(column)?.get_range(Some(range), false, None, 0))
    }

    /// Visible rows whose values at `columns` equal `key`.
    pub fn select_key(&mut self, columns: &[usize], key: &[Value]) -> Result<Vec<RowNumber>> {
        let mut matches: Option<Vec<RowNumber>> = None;
        for (column, value) in columns.iter().zip(key) {
            let rows = self.select_equal(*column, value)?;
            let next = match matches {
                None => rows,
                Some(prev) => prev.into_iter().filter(|r| rows.binary_search(r).is_ok()).collect(),
            };
            if next.is_empty() {
                return Ok(next);
            }
            matches = Some(next);
        }
        Ok(matches.unwrap_or_default())
    }

    /// Inserts a row and returns its id.
    pub fn add_row(&mut self, row: Row) -> Result<RowId> {
        self.check_writable()?;
        let number = self.source.add_row(row)?;
        self.journal.register(TableEvent::Add(number));
        Ok(RowId::new(self.table_id(), number))
    }

    /// Replaces a visible row with a new version and returns the new id.
    pub fn update_row(&mut self, row: RowNumber, new_row: Row) -> Result<RowId> {
        self.check_writable()?;
        if !self.contains_row(row) {
            return Err(Error::row_not_found(self.name(), row));
        }
        let number = self.source.add_row(new_row)?;
        self.journal.register(TableEvent::UpdateRemove(row));
        self.journal.register(TableEvent::UpdateAdd(number));
        Ok(RowId::new(self.table_id(), number))
    }

    /// Removes a visible row.
    pub fn remove_row(&mut self, row: RowNumber) -> Result<()> {
        self.check_writable()?;
        if !self.contains_row(row) {
            return Err(Error::row_not_found(self.name(), row));
        }
        self.journal.register(TableEvent::Remove(row));
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnlyTransaction);
        }
        if self.source.is_read_only() {
            return Err(Error::read_only_table(self.name()));
        }
        Ok(())
    }

    pub(crate) fn set_schema(&mut self, schema: Arc<Table>) {
        self.schema = schema;
    }

    /// Rows added and removed since the last checkpoint.
    pub(crate) fn pending_check(&self) -> (Vec<RowNumber>, Vec<RowNumber>) {
        (
            self.journal.normalized_added_rows_since(self.checkpoint),
            self.journal.normalized_removed_rows_since(self.checkpoint),
        )
    }

    pub(crate) fn has_pending_check(&self) -> bool {
        self.journal.len() > self.checkpoint
    }

    /// Marks every event so far as checked.
    pub(crate) fn checkpoint(&mut self) {
        self.checkpoint = self.journal.len();
    }

    /// Undoes every event since the last checkpoint.
    pub(crate) fn rollback_to_checkpoint(&mut self) {
        self.rollback_to(self.checkpoint);
        self.checkpoint = self.journal.len();
    }

    /// Undoes every event recorded at or after journal position `mark`.
    ///
    /// Cached indexes that already replayed part of the undone window are
    /// dropped and rebuilt from the snapshot on next use.
    pub(crate) fn rollback_to(&mut self, mark: usize) {
        let len = self.journal.len();
        if mark >= len {
            return;
        }
        self.journal.rollback(len - mark);
        if self.row_cache.as_ref().is_some_and(|c| c.watermark > mark) {
            self.row_cache = None;
        }
        for slot in &mut self.column_cache {
            if slot.as_ref().is_some_and(|c| c.watermark > mark) {
                *slot = None;
            }
        }
        trace!(table = %self.name(), undone = len - mark, "journal rolled back");
    }

    /// The full index set with every journal event applied.
    pub(crate) fn merged_index_set(&mut self) -> IndexSet {
        let rows = self.row_index().clone();
        let columns = (0..self.column_cache.len())
            .map(|c| self.column_index(c).clone())
            .collect();
        IndexSet::from_parts(rows, columns)
    }

    pub(crate) fn into_journal(self) -> TableEventRegistry {
        self.journal
    }

    fn row_index(&mut self) -> &RowIndex {
        let cached = self.row_cache.get_or_insert_with(|| Cached {
            index: self.index_set.rows().clone(),
            watermark: 0,
        });
        for event in self.journal.events_since(cached.watermark) {
            if event.is_add() {
                cached.index.insert(event.row());
            } else {
                cached.index.remove(event.row());
            }
        }
        cached.watermark = self.journal.len();
        &cached.index
    }

    fn column_index(&mut self, column: usize) -> &ColumnIndex {
        let cached = self.column_cache[column].get_or_insert_with(|| Cached {
            index: self.index_set.column(column).cloned().unwrap_or_default(),
            watermark: 0,
        });
        for event in self.journal.events_since(cached.watermark) {
            let Some(value) = self.source.get_value(event.row(), column) else {
                continue;
            };
            if event.is_add() {
                cached.index.insert(value, event.row());
            } else {
                cached.index.remove(&value, event.row());
            }
        }
        cached.watermark = self.journal.len();
        &cached.index
    }
}
