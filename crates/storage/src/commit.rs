//! Commit protocol.
//!
//! With the commit lock held, a commit:
//!
//! 1. fails on a dirty select (a table read but not written was changed by
//!    a concurrent commit), when the transaction checks for them;
//! 2. fails if a table it created or dropped was created or dropped
//!    concurrently;
//! 3. fails if it removed a row a concurrent commit also removed;
//! 4. fails if it changed a table that was dropped concurrently, dropped
//!    a table that was changed concurrently, or altered constraints that
//!    were altered concurrently;
//! 5. builds the view the database will have after this commit: the latest
//!    committed rows and schema of every table with this transaction's
//!    journals and constraint changes on top;
//! 6. checks every constraint, deferred ones included, against that view;
//! 7. fires the commit callbacks of the changed tables;
//! 8. assigns a commit id and publishes indexes, journals and namespace
//!    changes.
//!
//! Whatever happens, `Transaction::close` runs afterwards and reclaims what
//! was not published.

use crate::catalog::Catalog;
use crate::constraint::{CheckMode, ConstraintChecker, TableContext};
use crate::manager::{TableCommitInfo, TransactionManager};
use crate::source::TableSource;
use crate::table::TransactionTable;
use crate::transaction::{Transaction, TransactionState};
use crate::CommitId;
use hashbrown::HashSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessel_core::schema::Table;
use tessel_core::{Error, Result, RowNumber, TableId, TransactionConflict};
use tessel_index::IndexSet;
use tracing::{debug, info};

impl Transaction {
    /// Commits the transaction.
    ///
    /// On error nothing is published and the transaction is rolled back.
    /// Conflicts (`Error::Conflict`) mean a retry may succeed.
    pub fn commit(mut self) -> Result<()> {
        self.check_active()?;
        let manager = Arc::clone(&self.manager);
        let result = if self.has_pending_changes() {
            self.state = TransactionState::Committing;
            let _guard = manager.commit_guard();
            self.commit_changes(&manager)
        } else {
            Ok(())
        };
        match &result {
            Ok(()) => debug!(id = self.id, "transaction committed"),
            Err(e) => debug!(id = self.id, error = %e, "commit failed"),
        }
        self.close(result.is_ok());
        result
    }

    fn commit_changes(&mut self, manager: &TransactionManager) -> Result<()> {
        let catalog = manager.catalog();

        let mut changed: Vec<TableId> = self
            .tables
            .iter()
            .filter(|(id, t)| t.has_changes() && !self.registry.was_dropped(**id))
            .map(|(id, _)| *id)
            .collect();
        changed.sort_unstable();

        self.check_dirty_selects(catalog, &changed)?;
        self.check_namespace(catalog)?;
        self.check_row_clashes(&changed)?;
        self.check_dropped_tables(catalog, &changed)?;
        self.check_altered_tables()?;

        let mut view = CheckView::build(self, catalog);
        for &id in self.registry.constraints_altered() {
            if self.registry.was_dropped(id) {
                continue;
            }
            if let Some(name) = self.tables.get(&id).map(|t| t.name().to_string()) {
                ConstraintChecker::check_table(&mut view, &name, CheckMode::All)?;
            }
        }
        let mut infos = Vec::with_capacity(changed.len());
        for id in &changed {
            let table = &self.tables[id];
            let name = table.name().to_string();
            let added = table.journal().normalized_added_rows();
            let removed = table.journal().normalized_removed_rows();
            ConstraintChecker::check_removed_rows(&mut view, &name, &removed, CheckMode::All)?;
            ConstraintChecker::check_added_rows(&mut view, &name, &added, CheckMode::All)?;
            // Rows added and removed here were never visible outside.
            let own: HashSet<RowNumber> = table.journal().all_added_rows().into_iter().collect();
            infos.push(TableCommitInfo {
                table: name,
                commit_id: manager.next_commit_id(),
                added,
                removed: removed.into_iter().filter(|r| !own.contains(r)).collect(),
            });
        }

        for info in &infos {
            manager.fire_callbacks(info)?;
        }

        let commit_id = manager.advance_commit_id();
        for &id in self.registry.constraints_altered() {
            if let Some(table) = self.tables.get(&id) {
                table.source().set_schema(commit_id, Arc::clone(table.schema()));
            }
        }
        for id in &changed {
            let Some(mut table) = self.tables.remove(id) else {
                continue;
            };
            let index_set = view
                .take_index_set(table.name())
                .unwrap_or_else(|| table.merged_index_set());
            let source = Arc::clone(table.source());
            source.commit_transaction_change(commit_id, table.into_journal(), index_set);
        }
        catalog.apply_namespace(commit_id, self.registry.created(), self.registry.dropped());
        info!(id = self.id, commit_id, tables = changed.len(), "commit applied");
        Ok(())
    }

    fn check_dirty_selects(&self, catalog: &Catalog, changed: &[TableId]) -> Result<()> {
        if !self.options.checks_dirty_select() {
            return Ok(());
        }
        for &id in self.registry.selected() {
            if changed.contains(&id) || self.registry.was_created(id) {
                continue;
            }
            if let Some(source) = catalog.get_source(id) {
                if source.has_changes_since_commit(self.commit_id) {
                    return Err(TransactionConflict::DirtySelect {
                        table: source.name(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn check_namespace(&self, catalog: &Catalog) -> Result<()> {
        let names = self.registry.object_names();
        if names.is_empty() {
            return Ok(());
        }
        let concurrent = catalog.namespace_changes_since(self.commit_id);
        match names.into_iter().find(|n| concurrent.contains(*n)) {
            Some(name) => Err(TransactionConflict::DuplicateObject {
                name: name.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    fn check_row_clashes(&self, changed: &[TableId]) -> Result<()> {
        for id in changed {
            if self.registry.was_created(*id) {
                continue;
            }
            let table = &self.tables[id];
            let removed: HashSet<RowNumber> = table.journal().normalized_removed_rows().into_iter().collect();
            if removed.is_empty() {
                continue;
            }
            for other in table.source().find_changes_since_commit(self.commit_id) {
                if let Some(row) = other
                    .normalized_removed_rows()
                    .into_iter()
                    .find(|r| removed.contains(r))
                {
                    return Err(TransactionConflict::RowRemoveClash {
                        table: table.name().to_string(),
                        row,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn check_dropped_tables(&self, catalog: &Catalog, changed: &[TableId]) -> Result<()> {
        for &id in changed.iter().chain(self.registry.constraints_altered()) {
            if self.registry.was_created(id) || catalog.is_committed(id) {
                continue;
            }
            let table = self
                .tables
                .get(&id)
                .map(|t| t.name().to_string())
                .unwrap_or_default();
            return Err(TransactionConflict::DroppedModified { table }.into());
        }
        for (name, id) in self.registry.dropped() {
            if self.registry.was_created(*id) {
                continue;
            }
            if catalog
                .get_source(*id)
                .is_some_and(|s| s.has_changes_since_commit(self.commit_id))
            {
                return Err(TransactionConflict::TableRemoveClash { table: name.clone() }.into());
            }
        }
        Ok(())
    }

    fn check_altered_tables(&self) -> Result<()> {
        for id in self.registry.constraints_altered() {
            if self.registry.was_created(*id) {
                continue;
            }
            let Some(table) = self.tables.get(id) else {
                continue;
            };
            if table.source().schema_changed_since(self.commit_id) {
                return Err(TransactionConflict::ConstraintsAltered {
                    table: table.name().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Read-only view of the database as it will be after a commit.
struct CheckView {
    tables: BTreeMap<String, TransactionTable>,
}

impl CheckView {
    fn build(tx: &mut Transaction, catalog: &Catalog) -> Self {
        let start: CommitId = tx.commit_id;
        let mut entries: Vec<(String, Arc<TableSource>, Option<IndexSet>)> = tx
            .visible
            .iter()
            .map(|(name, v)| {
                (
                    name.clone(),
                    Arc::clone(&v.source),
                    tx.registry.was_created(v.source.id()).then(|| v.index_set.clone()),
                )
            })
            .collect();
        // Tables committed concurrently under names this transaction never saw.
        for source in catalog.committed_sources() {
            if tx.registry.was_dropped(source.id()) {
                continue;
            }
            let name = source.name();
            if entries.iter().any(|(n, ..)| *n == name) {
                continue;
            }
            entries.push((name, source, None));
        }

        let mut tables = BTreeMap::new();
        for (name, source, created_set) in entries {
            let id = source.id();
            // Constraints committed since this transaction began apply too,
            // unless it replaced them itself.
            let (schema, index_set) = match tx.tables.get_mut(&id) {
                Some(table) => {
                    let schema = if tx.registry.constraints_altered().contains(&id) {
                        Arc::clone(table.schema())
                    } else {
                        source.schema()
                    };
                    let set = if !table.has_changes() {
                        created_set.unwrap_or_else(|| source.create_index_set())
                    } else if created_set.is_some() || !source.has_changes_since_commit(start) {
                        table.merged_index_set()
                    } else {
                        let mut set = source.create_index_set();
                        source.replay_into(&mut set, table.journal().events());
                        set
                    };
                    (schema, set)
                }
                None => {
                    let set = created_set.unwrap_or_else(|| source.create_index_set());
                    (source.schema(), set)
                }
            };
            tables.insert(name, TransactionTable::with_schema(source, schema, index_set, true));
        }
        Self { tables }
    }

    /// The merged index set of `name`, for publishing.
    fn take_index_set(&mut self, name: &str) -> Option<IndexSet> {
        self.tables.get_mut(name).map(|t| t.merged_index_set())
    }
}

impl TableContext for CheckView {
    fn table_mut(&mut self, name: &str) -> Result<&mut TransactionTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn schema_of(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).map(|t| Arc::clone(t.schema()))
    }
}
