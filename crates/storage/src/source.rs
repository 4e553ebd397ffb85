//! Shared, committed state of one table.
//!
//! A `TableSource` owns the physical rows of a table (committed, pending and
//! not yet reclaimed alike), the committed `IndexSet`, and the history of
//! journals committed against it. Transactions never write to the committed
//! indexes directly: they add physical rows here, journal the change, and
//! hand their merged indexes back at commit.

use crate::journal::{TableEvent, TableEventRegistry};
use crate::lock::Lockable;
use crate::CommitId;
use hashbrown::HashSet;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tessel_core::schema::Table;
use tessel_core::{Error, Result, Row, RowNumber, TableId, Value};
use tessel_index::IndexSet;
use tracing::{debug, trace, warn};

/// A journal together with the commit id it was committed under.
#[derive(Clone, Debug)]
pub struct CommittedJournal {
    pub commit_id: CommitId,
    pub journal: Arc<TableEventRegistry>,
}

#[derive(Debug)]
struct SourceState {
    committed: IndexSet,
    history: Vec<CommittedJournal>,
    /// Rows removed by a commit, reclaimable once no transaction that
    /// started before that commit is open.
    pending_reclaim: Vec<(CommitId, Vec<RowNumber>)>,
}

/// Shared state of one table.
#[derive(Debug)]
pub struct TableSource {
    id: TableId,
    schema: RwLock<Arc<Table>>,
    /// Commit that last replaced the schema, 0 if never.
    schema_commit_id: AtomicU64,
    read_only: AtomicBool,
    next_row: AtomicU64,
    rows: RwLock<BTreeMap<RowNumber, Arc<Row>>>,
    state: Mutex<SourceState>,
}

impl TableSource {
    pub fn new(id: TableId, schema: Table) -> Self {
        let column_count = schema.column_count();
        Self {
            id,
            schema: RwLock::new(Arc::new(schema)),
            schema_commit_id: AtomicU64::new(0),
            read_only: AtomicBool::new(false),
            next_row: AtomicU64::new(1),
            rows: RwLock::new(BTreeMap::new()),
            state: Mutex::new(SourceState {
                committed: IndexSet::new(column_count),
                history: Vec::new(),
                pending_reclaim: Vec::new(),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> String {
        self.schema.read().name().to_string()
    }

    /// The committed table definition.
    pub fn schema(&self) -> Arc<Table> {
        Arc::clone(&self.schema.read())
    }

    /// Replaces the committed schema. Call with the commit lock held.
    pub(crate) fn set_schema(&self, commit_id: CommitId, schema: Arc<Table>) {
        *self.schema.write() = schema;
        self.schema_commit_id.store(commit_id, Ordering::Release);
    }

    /// Whether a commit at or after `commit_id` replaced the schema.
    pub fn schema_changed_since(&self, commit_id: CommitId) -> bool {
        let changed = self.schema_commit_id.load(Ordering::Acquire);
        changed != 0 && changed >= commit_id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    /// Stores a new physical row and returns its number.
    ///
    /// The row is invisible to every index until a journal event names it.
    pub fn add_row(&self, row: Row) -> Result<RowNumber> {
        let schema = self.schema();
        if self.is_read_only() {
            return Err(Error::read_only_table(schema.name()));
        }
        if row.len() != schema.column_count() {
            return Err(Error::invalid_operation(format!(
                "Table {} has {} columns, row has {}",
                schema.name(),
                schema.column_count(),
                row.len()
            )));
        }
        let number = self.next_row.fetch_add(1, Ordering::Relaxed);
        self.rows.write().insert(number, Arc::new(row));
        trace!(table = %schema.name(), row = number, "physical row added");
        Ok(number)
    }

    pub fn get_row(&self, row: RowNumber) -> Option<Arc<Row>> {
        self.rows.read().get(&row).cloned()
    }

    pub fn get_value(&self, row: RowNumber, column: usize) -> Option<Value> {
        self.rows.read().get(&row).and_then(|r| r.get(column).cloned())
    }

    /// Number of physical rows still stored, including unreclaimed ones.
    pub fn physical_row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Snapshot of the committed indexes.
    pub fn create_index_set(&self) -> IndexSet {
        self.state.lock().committed.clone()
    }

    /// Journals committed with a commit id at or after `commit_id`.
    pub fn find_changes_since_commit(&self, commit_id: CommitId) -> Vec<Arc<TableEventRegistry>> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|c| c.commit_id >= commit_id)
            .map(|c| Arc::clone(&c.journal))
            .collect()
    }

    pub fn has_changes_since_commit(&self, commit_id: CommitId) -> bool {
        self.state
            .lock()
            .history
            .iter()
            .any(|c| c.commit_id >= commit_id)
    }

    /// Number of committed journals still retained.
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Applies `events` to `set`, reading row values from this source.
    pub fn replay_into(&self, set: &mut IndexSet, events: &[TableEvent]) {
        let rows = self.rows.read();
        for event in events {
            let Some(row) = rows.get(&event.row()) else {
                warn!(table = self.id, row = event.row(), "journal names a missing row");
                continue;
            };
            if event.is_add() {
                set.insert_row(event.row(), row.values());
            } else {
                set.remove_row(event.row(), row.values());
            }
        }
    }

    /// Publishes a transaction's changes.
    ///
    /// `index_set` becomes the committed index state and `journal` joins the
    /// history. Rows the journal removed are queued for reclamation; rows
    /// it both added and removed were never visible to anyone else and are
    /// dropped immediately.
    pub fn commit_transaction_change(
        &self,
        commit_id: CommitId,
        journal: TableEventRegistry,
        index_set: IndexSet,
    ) {
        let added: HashSet<RowNumber> = journal.all_added_rows().into_iter().collect();
        let (transient, removed): (Vec<RowNumber>, Vec<RowNumber>) = journal
            .normalized_removed_rows()
            .into_iter()
            .partition(|r| added.contains(r));

        {
            let mut state = self.state.lock();
            state.committed = index_set;
            state.history.push(CommittedJournal {
                commit_id,
                journal: Arc::new(journal),
            });
            if !removed.is_empty() {
                state.pending_reclaim.push((commit_id, removed));
            }
        }
        if !transient.is_empty() {
            let mut rows = self.rows.write();
            for row in &transient {
                rows.remove(row);
            }
        }
        debug!(table = self.id, commit_id, reclaimed = transient.len(), "table change committed");
    }

    /// Discards the physical rows added by a journal that will never commit.
    pub fn rollback_transaction_change(&self, journal: &TableEventRegistry) {
        let added = journal.all_added_rows();
        if added.is_empty() {
            return;
        }
        let mut rows = self.rows.write();
        for row in &added {
            rows.remove(row);
        }
        debug!(table = self.id, reclaimed = added.len(), "table change rolled back");
    }

    /// Drops history and removed rows no open transaction can observe.
    ///
    /// `min_commit_id` is the smallest start commit id among open
    /// transactions. Returns the number of physical rows reclaimed.
    pub fn collect_garbage(&self, min_commit_id: CommitId) -> usize {
        let reclaim: Vec<RowNumber> = {
            let mut state = self.state.lock();
            state.history.retain(|c| c.commit_id >= min_commit_id);
            let (ready, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending_reclaim)
                .into_iter()
                .partition(|(commit_id, _)| *commit_id < min_commit_id);
            state.pending_reclaim = keep;
            ready.into_iter().flat_map(|(_, rows)| rows).collect()
        };
        if reclaim.is_empty() {
            return 0;
        }
        let mut rows = self.rows.write();
        let count = reclaim.iter().filter(|r| rows.remove(r).is_some()).count();
        trace!(table = self.id, count, "rows reclaimed");
        count
    }
}

impl Lockable for TableSource {
    fn ref_id(&self) -> u64 {
        u64::from(self.id)
    }

    fn lock_name(&self) -> String {
        self.name()
    }
}
