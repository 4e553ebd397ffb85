//! Journals for tracking changes made by a transaction.
//!
//! A `TableEventRegistry` is the ordered list of row events one transaction
//! performed against one table. Replaying it over the snapshot the
//! transaction started from yields the transaction's private view; replaying
//! it over the latest committed state yields what the table looks like once
//! the transaction commits. The `TransactionRegistry` carries the
//! namespace-level changes (tables created, dropped, read or redefined).

use hashbrown::HashMap;
use std::collections::BTreeSet;
use tessel_core::{RowNumber, TableId};

/// A single row event in a table journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableEvent {
    /// A row was inserted.
    Add(RowNumber),
    /// A row was removed.
    Remove(RowNumber),
    /// The new version of an updated row.
    UpdateAdd(RowNumber),
    /// The old version of an updated row.
    UpdateRemove(RowNumber),
}

impl TableEvent {
    #[inline]
    pub fn row(&self) -> RowNumber {
        match *self {
            TableEvent::Add(row)
            | TableEvent::Remove(row)
            | TableEvent::UpdateAdd(row)
            | TableEvent::UpdateRemove(row) => row,
        }
    }

    /// Returns true for `Add` and `UpdateAdd`.
    #[inline]
    pub fn is_add(&self) -> bool {
        matches!(self, TableEvent::Add(_) | TableEvent::UpdateAdd(_))
    }

    /// Returns true for `Remove` and `UpdateRemove`.
    #[inline]
    pub fn is_remove(&self) -> bool {
        !self.is_add()
    }
}

/// Ordered journal of row events against one table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableEventRegistry {
    table_id: TableId,
    events: Vec<TableEvent>,
}

impl TableEventRegistry {
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            events: Vec::new(),
        }
    }

    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Appends an event.
    pub fn register(&mut self, event: TableEvent) {
        self.events.push(event);
    }

    pub fn get(&self, index: usize) -> Option<TableEvent> {
        self.events.get(index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[TableEvent] {
        &self.events
    }

    /// Events recorded at or after position `start`.
    pub fn events_since(&self, start: usize) -> &[TableEvent] {
        &self.events[start.min(self.events.len())..]
    }

    /// Rows this journal leaves visible: every added row not subsequently
    /// removed, in order of first addition.
    pub fn normalized_added_rows(&self) -> Vec<RowNumber> {
        self.normalized_added_rows_since(0)
    }

    /// Every removed row, including old versions of updated rows.
    pub fn normalized_removed_rows(&self) -> Vec<RowNumber> {
        self.normalized_removed_rows_since(0)
    }

    /// `normalized_added_rows` restricted to the events from `start` on.
    pub fn normalized_added_rows_since(&self, start: usize) -> Vec<RowNumber> {
        let mut slots: Vec<Option<RowNumber>> = Vec::new();
        let mut positions: HashMap<RowNumber, usize> = HashMap::new();
        for event in self.events_since(start) {
            let row = event.row();
            if event.is_add() {
                if !positions.contains_key(&row) {
                    positions.insert(row, slots.len());
                    slots.push(Some(row));
                }
            } else if let Some(pos) = positions.remove(&row) {
                slots[pos] = None;
            }
        }
        slots.into_iter().flatten().collect()
    }

    /// `normalized_removed_rows` restricted to the events from `start` on.
    pub fn normalized_removed_rows_since(&self, start: usize) -> Vec<RowNumber> {
        self.events_since(start)
            .iter()
            .filter(|e| e.is_remove())
            .map(|e| e.row())
            .collect()
    }

    /// Every row number this journal physically added, in event order.
    pub fn all_added_rows(&self) -> Vec<RowNumber> {
        self.events
            .iter()
            .filter(|e| e.is_add())
            .map(|e| e.row())
            .collect()
    }

    /// Undoes the last `n` events.
    ///
    /// The window is truncated, then every row added inside it is recorded
    /// again as an `Add` immediately followed by a `Remove`, so the physical
    /// rows stay accounted for and are reclaimed like any removed row.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the number of recorded events.
    pub fn rollback(&mut self, n: usize) {
        assert!(
            n <= self.events.len(),
            "cannot roll back {} events from a journal of {}",
            n,
            self.events.len()
        );
        let start = self.events.len() - n;
        let added: Vec<RowNumber> = self.events[start..]
            .iter()
            .filter(|e| e.is_add())
            .map(|e| e.row())
            .collect();
        self.events.truncate(start);
        for row in added {
            self.events.push(TableEvent::Add(row));
            self.events.push(TableEvent::Remove(row));
        }
    }
}

/// Namespace-level changes of one transaction.
#[derive(Clone, Debug, Default)]
pub struct TransactionRegistry {
    created: Vec<(String, TableId)>,
    dropped: Vec<(String, TableId)>,
    selected: BTreeSet<TableId>,
    constraints_altered: BTreeSet<TableId>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_created(&mut self, name: impl Into<String>, table: TableId) {
        self.created.push((name.into(), table));
    }

    pub fn register_dropped(&mut self, name: impl Into<String>, table: TableId) {
        self.dropped.push((name.into(), table));
    }

    /// Records that the transaction read from `table`.
    pub fn register_selected(&mut self, table: TableId) {
        self.selected.insert(table);
    }

    pub fn register_constraints_altered(&mut self, table: TableId) {
        self.constraints_altered.insert(table);
    }

    pub fn created(&self) -> &[(String, TableId)] {
        &self.created
    }

    pub fn dropped(&self) -> &[(String, TableId)] {
        &self.dropped
    }

    pub fn selected(&self) -> &BTreeSet<TableId> {
        &self.selected
    }

    pub fn constraints_altered(&self) -> &BTreeSet<TableId> {
        &self.constraints_altered
    }

    pub fn was_created(&self, table: TableId) -> bool {
        self.created.iter().any(|(_, id)| *id == table)
    }

    pub fn was_dropped(&self, table: TableId) -> bool {
        self.dropped.iter().any(|(_, id)| *id == table)
    }

    /// Names of every object created or dropped.
    pub fn object_names(&self) -> BTreeSet<&str> {
        self.created
            .iter()
            .chain(self.dropped.iter())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn has_namespace_changes(&self) -> bool {
        !self.created.is_empty() || !self.dropped.is_empty() || !self.constraints_altered.is_empty()
    }
}
