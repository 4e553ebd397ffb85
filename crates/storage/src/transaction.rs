//! Transactions.
//!
//! A `Transaction` sees the committed state of every table as of the moment
//! it began, plus its own changes. Writes go to per-table journals; nothing
//! is published until `commit` validates the journals against whatever was
//! committed concurrently (see `commit.rs`).
//!
//! Row statements (`insert`, `update`, `delete`) are atomic: if one fails,
//! the events it recorded are rolled back before the error is returned.
//! Referential actions (`CASCADE`, `SET NULL`, `SET DEFAULT`) run as part of
//! the statement that triggers them.

use crate::constraint::{CheckMode, ConstraintChecker, TableContext};
use crate::journal::TransactionRegistry;
use crate::lock::{LockHandle, Lockable};
use crate::manager::TransactionManager;
use crate::source::TableSource;
use crate::table::TransactionTable;
use crate::{CommitId, TransactionId};
use core::fmt;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessel_core::schema::{ConstraintAction, Constraints, Table};
use tessel_core::{Error, Result, Row, RowId, RowNumber, TableId, Value};
use tessel_index::IndexSet;
use tracing::{debug, trace};

/// Isolation level requested for a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Snapshot reads, and commit fails if a table read was changed
    /// concurrently (when the dirty-select policy is `Error`).
    #[default]
    Serializable,
    /// Snapshot reads without the dirty-select check.
    Snapshot,
    /// Not supported.
    ReadCommitted,
    /// Not supported.
    ReadUncommitted,
}

impl IsolationLevel {
    pub fn is_supported(self) -> bool {
        matches!(self, IsolationLevel::Serializable | IsolationLevel::Snapshot)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::Serializable => "SERIALIZABLE",
            IsolationLevel::Snapshot => "SNAPSHOT",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
        };
        f.write_str(name)
    }
}

/// What commit does when a table the transaction read was modified by a
/// concurrent commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirtySelectPolicy {
    /// Fail the commit with a dirty-select conflict.
    Error,
    /// Commit anyway.
    Ignore,
}

/// Options for beginning a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub dirty_select: DirtySelectPolicy,
}

impl TransactionOptions {
    /// Serializable, read-write options with the given dirty-select policy.
    pub fn new(dirty_select: DirtySelectPolicy) -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
            read_only: false,
            dirty_select,
        }
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub(crate) fn checks_dirty_select(&self) -> bool {
        self.dirty_select == DirtySelectPolicy::Error && self.isolation == IsolationLevel::Serializable
    }
}

/// Transaction lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    /// Inside `commit`, holding the commit lock.
    Committing,
    Committed,
    RolledBack,
}

/// A table visible to a transaction, as of its start.
#[derive(Debug)]
pub(crate) struct VisibleTable {
    pub(crate) source: Arc<TableSource>,
    pub(crate) schema: Arc<Table>,
    pub(crate) index_set: IndexSet,
}

impl VisibleTable {
    pub(crate) fn new(source: Arc<TableSource>) -> Self {
        Self {
            schema: source.schema(),
            index_set: source.create_index_set(),
            source,
        }
    }
}

/// A unit of work over a consistent snapshot of the database.
///
/// Dropping an active transaction rolls it back.
pub struct Transaction {
    pub(crate) manager: Arc<TransactionManager>,
    pub(crate) id: TransactionId,
    pub(crate) commit_id: CommitId,
    pub(crate) options: TransactionOptions,
    pub(crate) visible: BTreeMap<String, VisibleTable>,
    pub(crate) tables: HashMap<TableId, TransactionTable>,
    pub(crate) registry: TransactionRegistry,
    pub(crate) state: TransactionState,
}

impl Transaction {
    pub(crate) fn new(
        manager: Arc<TransactionManager>,
        id: TransactionId,
        commit_id: CommitId,
        options: TransactionOptions,
        visible: BTreeMap<String, VisibleTable>,
    ) -> Self {
        Self {
            manager,
            id,
            commit_id,
            options,
            visible,
            tables: HashMap::new(),
            registry: TransactionRegistry::new(),
            state: TransactionState::Active,
        }
    }

    #[inline]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The commit id this transaction's snapshot was taken at.
    #[inline]
    pub fn commit_id(&self) -> CommitId {
        self.commit_id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.options.isolation
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Names of every table this transaction can see.
    pub fn table_names(&self) -> Vec<String> {
        self.visible.keys().cloned().collect()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.visible.contains_key(name)
    }

    /// Opens a table for reading and writing.
    ///
    /// Marks the table as read, which makes commit subject to the
    /// dirty-select check for it.
    pub fn get_table(&mut self, name: &str) -> Result<&mut TransactionTable> {
        self.check_active()?;
        let id = self.view_mut(name)?.table_id();
        self.registry.register_selected(id);
        self.view_mut(name)
    }

    /// Inserts a row.
    pub fn insert(&mut self, table: &str, row: Row) -> Result<RowId> {
        self.statement(|tx| tx.view_mut(table)?.add_row(row))
    }

    /// Replaces a row, applying the referential actions of foreign keys
    /// that reference it. Returns the id of the new row version.
    pub fn update(&mut self, table: &str, row: RowNumber, new_row: Row) -> Result<RowId> {
        self.statement(|tx| tx.update_row(table, row, new_row))
    }

    /// Removes a row, applying the referential actions of foreign keys
    /// that reference it.
    pub fn delete(&mut self, table: &str, row: RowNumber) -> Result<()> {
        self.statement(|tx| tx.delete_row(table, row))
    }

    /// Checks the immediate constraints of every change since the last
    /// successful check. On failure those changes are rolled back.
    pub fn assert_constraints(&mut self) -> Result<()> {
        self.check_active()?;
        let pending: Vec<(String, Vec<RowNumber>, Vec<RowNumber>)> = self
            .tables
            .values()
            .filter(|t| t.has_pending_check() && self.is_visible(t))
            .map(|t| {
                let (added, removed) = t.pending_check();
                (t.name().to_string(), added, removed)
            })
            .collect();

        let mut result = Ok(());
        for (name, added, removed) in &pending {
            result = ConstraintChecker::check_removed_rows(self, name, removed, CheckMode::Immediate)
                .and_then(|_| ConstraintChecker::check_added_rows(self, name, added, CheckMode::Immediate));
            if result.is_err() {
                break;
            }
        }

        match result {
            Ok(()) => {
                for table in self.tables.values_mut() {
                    table.checkpoint();
                }
                Ok(())
            }
            Err(e) => {
                for table in self.tables.values_mut() {
                    if table.has_pending_check() {
                        table.rollback_to_checkpoint();
                    }
                }
                debug!(id = self.id, error = %e, "constraint check failed, changes rolled back");
                Err(e)
            }
        }
    }

    /// Creates a table, visible to this transaction only until commit.
    pub fn create_table(&mut self, schema: Table) -> Result<TableId> {
        self.check_writable()?;
        let name = schema.name().to_string();
        if self.visible.contains_key(&name) {
            return Err(Error::invalid_schema(format!("Table already exists: {}", name)));
        }
        let source = self.manager.catalog().create_source(schema);
        let id = source.id();
        self.visible.insert(name.clone(), VisibleTable::new(source));
        self.registry.register_created(name, id);
        trace!(id = self.id, table = id, "table created");
        Ok(id)
    }

    /// Drops a table. Fails if another table's foreign key references it.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        if !self.visible.contains_key(name) {
            return Err(Error::table_not_found(name));
        }
        for other in self.table_names() {
            if other == name {
                continue;
            }
            let Some(schema) = self.schema_of(&other) else {
                continue;
            };
            if let Some(fk) = schema
                .constraints()
                .get_foreign_keys()
                .iter()
                .find(|fk| fk.ref_table == name)
            {
                return Err(Error::invalid_operation(format!(
                    "Table {} is referenced by foreign key {} of {}",
                    name, fk.name, other
                )));
            }
        }
        if let Some(visible) = self.visible.remove(name) {
            self.registry.register_dropped(name, visible.source.id());
        }
        Ok(())
    }

    /// Replaces the key, foreign key and check constraints of a table.
    /// Column nullability is kept. Every row is re-checked at commit.
    pub fn alter_constraints(&mut self, name: &str, constraints: Constraints) -> Result<()> {
        self.check_writable()?;
        let view = self.view_mut(name)?;
        let not_nullable = view.schema().constraints().get_not_nullable().to_vec();
        let schema = view.schema().with_constraints(constraints.not_nullable(not_nullable));
        view.set_schema(Arc::new(schema));
        let id = view.table_id();
        self.registry.register_constraints_altered(id);
        Ok(())
    }

    /// Locks tables for exclusive (`writes`) and shared (`reads`) access.
    ///
    /// The locks are held until the returned handle is dropped.
    pub fn lock_tables(&self, writes: &[&str], reads: &[&str]) -> Result<LockHandle> {
        self.check_active()?;
        if !writes.is_empty() && self.options.read_only {
            return Err(Error::ReadOnlyTransaction);
        }
        let writes = self.sources(writes)?;
        let reads = self.sources(reads)?;
        let writes: Vec<&dyn Lockable> = writes.iter().map(|s| s.as_ref() as &dyn Lockable).collect();
        let reads: Vec<&dyn Lockable> = reads.iter().map(|s| s.as_ref() as &dyn Lockable).collect();
        Ok(self
            .manager
            .locker()
            .lock(&writes, &reads, self.manager.lock_timeout())?)
    }

    /// Discards every change.
    pub fn rollback(mut self) {
        if self.is_active() {
            self.close(false);
        }
    }

    pub(crate) fn check_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionClosed)
        }
    }

    fn check_writable(&self) -> Result<()> {
        self.check_active()?;
        if self.options.read_only {
            return Err(Error::ReadOnlyTransaction);
        }
        Ok(())
    }

    /// True if the table is the one currently visible under its name.
    pub(crate) fn is_visible(&self, table: &TransactionTable) -> bool {
        self.visible
            .get(table.name())
            .is_some_and(|v| v.source.id() == table.table_id())
    }

    pub(crate) fn has_pending_changes(&self) -> bool {
        self.tables.values().any(|t| t.has_changes()) || self.registry.has_namespace_changes()
    }

    fn sources(&self, names: &[&str]) -> Result<Vec<Arc<TableSource>>> {
        names
            .iter()
            .map(|name| {
                self.visible
                    .get(*name)
                    .map(|v| Arc::clone(&v.source))
                    .ok_or_else(|| Error::table_not_found(*name))
            })
            .collect()
    }

    /// The transaction's view of `name`, created on first use.
    fn view_mut(&mut self, name: &str) -> Result<&mut TransactionTable> {
        let visible = self.visible.get(name).ok_or_else(|| Error::table_not_found(name))?;
        let read_only = self.options.read_only;
        Ok(self.tables.entry(visible.source.id()).or_insert_with(|| {
            TransactionTable::with_schema(
                Arc::clone(&visible.source),
                Arc::clone(&visible.schema),
                visible.index_set.clone(),
                read_only,
            )
        }))
    }

    /// Runs a statement, undoing its events if it fails.
    fn statement<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.check_active()?;
        let marks: HashMap<TableId, usize> = self
            .tables
            .iter()
            .map(|(id, t)| (*id, t.journal().len()))
            .collect();
        let result = f(self);
        if let Err(e) = &result {
            for (id, table) in self.tables.iter_mut() {
                table.rollback_to(marks.get(id).copied().unwrap_or(0));
            }
            debug!(id = self.id, error = %e, "statement rolled back");
        }
        result
    }

    fn update_row(&mut self, table: &str, row: RowNumber, new_row: Row) -> Result<RowId> {
        let view = self.view_mut(table)?;
        let old = view.get_row(row)?;
        let id = view.update_row(row, new_row.clone())?;
        self.apply_referential_actions(table, &old, Some(&new_row))?;
        Ok(id)
    }

    fn delete_row(&mut self, table: &str, row: RowNumber) -> Result<()> {
        let view = self.view_mut(table)?;
        view.remove_row(row)?;
        let old = view.get_row(row)?;
        self.apply_referential_actions(table, &old, None)
    }

    /// Applies `ON DELETE` (`new` is `None`) or `ON UPDATE` actions of every
    /// foreign key referencing `parent`, for a row whose old values are `old`.
    fn apply_referential_actions(&mut self, parent: &str, old: &Row, new: Option<&Row>) -> Result<()> {
        let parent_schema = self.schema_of(parent).ok_or_else(|| Error::table_not_found(parent))?;
        for child in self.table_names() {
            let Some(child_schema) = self.schema_of(&child) else {
                continue;
            };
            for fk in child_schema.constraints().get_foreign_keys() {
                if fk.ref_table != parent {
                    continue;
                }
                let action = match new {
                    Some(_) => fk.on_update,
                    None => fk.on_delete,
                };
                if action == ConstraintAction::NoAction {
                    continue;
                }
                let ref_columns = parent_schema.column_indices(&fk.ref_columns)?;
                let old_key = old.key(&ref_columns);
                if old_key.iter().any(Value::is_null) {
                    continue;
                }
                let new_key = new.map(|r| r.key(&ref_columns));
                if new_key.as_ref() == Some(&old_key) {
                    continue;
                }
                // Another visible parent row still carries the key.
                if !self.view_mut(parent)?.select_key(&ref_columns, &old_key)?.is_empty() {
                    continue;
                }

                let columns = child_schema.column_indices(&fk.columns)?;
                let referencing = self.view_mut(&child)?.select_key(&columns, &old_key)?;
                trace!(fk = %fk.name, ?action, rows = referencing.len(), "applying referential action");
                for row in referencing {
                    let view = self.view_mut(&child)?;
                    if !view.contains_row(row) {
                        continue;
                    }
                    if action == ConstraintAction::Cascade && new_key.is_none() {
                        self.delete_row(&child, row)?;
                        continue;
                    }
                    let mut values = Row::clone(&*view.get_row(row)?);
                    for (i, &column) in columns.iter().enumerate() {
                        let value = match action {
                            ConstraintAction::SetNull => Value::Null,
                            ConstraintAction::SetDefault => child_schema
                                .columns()
                                .get(column)
                                .map(|c| c.get_default_value())
                                .unwrap_or(Value::Null),
                            _ => new_key
                                .as_ref()
                                .and_then(|k| k.get(i).cloned())
                                .unwrap_or(Value::Null),
                        };
                        values.set(column, value);
                    }
                    self.update_row(&child, row, values)?;
                }
            }
        }
        Ok(())
    }

    /// Final phase of every transaction, committed or not.
    ///
    /// Journals still held were never applied: their physical rows are
    /// reclaimed. Sources created but never published are forgotten.
    pub(crate) fn close(&mut self, committed: bool) {
        for (_, table) in self.tables.drain() {
            if table.has_changes() {
                let source = Arc::clone(table.source());
                source.rollback_transaction_change(&table.into_journal());
            }
        }
        let catalog = self.manager.catalog();
        for (_, id) in self.registry.created() {
            if !committed || self.registry.was_dropped(*id) {
                catalog.discard_source(*id);
            }
        }
        self.state = if committed {
            TransactionState::Committed
        } else {
            TransactionState::RolledBack
        };
        self.manager.transaction_closed(self.id);
        debug!(id = self.id, committed, "transaction closed");
    }
}

impl TableContext for Transaction {
    fn table_mut(&mut self, name: &str) -> Result<&mut TransactionTable> {
        self.view_mut(name)
    }

    fn table_names(&self) -> Vec<String> {
        Transaction::table_names(self)
    }

    fn schema_of(&self, name: &str) -> Option<Arc<Table>> {
        let visible = self.visible.get(name)?;
        Some(match self.tables.get(&visible.source.id()) {
            Some(table) => Arc::clone(table.schema()),
            None => Arc::clone(&visible.schema),
        })
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("commit_id", &self.commit_id)
            .field("options", &self.options)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if matches!(self.state, TransactionState::Active | TransactionState::Committing) {
            debug!(id = self.id, "transaction dropped while open, rolling back");
            self.close(false);
        }
    }
}
