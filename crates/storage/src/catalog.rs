//! Catalog of table sources.
//!
//! This module provides the `Catalog` struct which tracks every table source,
//! which of them are committed under which name, and the namespace changes
//! (tables created or dropped) committed over time.

use crate::source::TableSource;
use crate::CommitId;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tessel_core::schema::Table;
use tessel_core::TableId;
use tracing::debug;

/// Objects created and dropped by one commit.
#[derive(Clone, Debug)]
pub struct NamespaceJournal {
    pub commit_id: CommitId,
    pub created: Vec<String>,
    pub dropped: Vec<String>,
}

/// Registry of table sources and committed table names.
#[derive(Debug)]
pub struct Catalog {
    next_table_id: AtomicU32,
    /// Every live source, committed or still pending in a transaction.
    sources: RwLock<HashMap<TableId, Arc<TableSource>>>,
    /// Committed name → table id mapping.
    committed: RwLock<BTreeMap<String, TableId>>,
    namespace: Mutex<Vec<NamespaceJournal>>,
    /// Sources dropped by a commit, kept until older snapshots close.
    dropped: Mutex<Vec<(CommitId, TableId)>>,
}

impl Catalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self {
            next_table_id: AtomicU32::new(1),
            sources: RwLock::new(HashMap::new()),
            committed: RwLock::new(BTreeMap::new()),
            namespace: Mutex::new(Vec::new()),
            dropped: Mutex::new(Vec::new()),
        }
    }

    /// Allocates a source for a new table. It stays invisible to other
    /// transactions until a commit publishes it.
    pub(crate) fn create_source(&self, schema: Table) -> Arc<TableSource> {
        let id = self.next_table_id.fetch_add(1, Ordering::Relaxed);
        let source = Arc::new(TableSource::new(id, schema));
        self.sources.write().insert(id, Arc::clone(&source));
        source
    }

    /// Forgets a source that was never committed.
    pub(crate) fn discard_source(&self, id: TableId) {
        if !self.is_committed(id) {
            self.sources.write().remove(&id);
        }
    }

    /// Gets a source by id.
    pub fn get_source(&self, id: TableId) -> Option<Arc<TableSource>> {
        self.sources.read().get(&id).cloned()
    }

    /// Gets a committed source by name.
    pub fn get_committed(&self, name: &str) -> Option<Arc<TableSource>> {
        let id = *self.committed.read().get(name)?;
        self.get_source(id)
    }

    /// All committed sources, ordered by name.
    pub fn committed_sources(&self) -> Vec<Arc<TableSource>> {
        let committed = self.committed.read();
        let sources = self.sources.read();
        committed
            .values()
            .filter_map(|id| sources.get(id).cloned())
            .collect()
    }

    /// Returns all committed table names.
    pub fn table_names(&self) -> Vec<String> {
        self.committed.read().keys().cloned().collect()
    }

    /// Checks if a committed table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.committed.read().contains_key(name)
    }

    /// Returns the number of committed tables.
    pub fn table_count(&self) -> usize {
        self.committed.read().len()
    }

    pub fn is_committed(&self, id: TableId) -> bool {
        self.committed.read().values().any(|t| *t == id)
    }

    /// Names created or dropped by commits at or after `commit_id`.
    pub fn namespace_changes_since(&self, commit_id: CommitId) -> BTreeSet<String> {
        self.namespace
            .lock()
            .iter()
            .filter(|j| j.commit_id >= commit_id)
            .flat_map(|j| j.created.iter().chain(j.dropped.iter()).cloned())
            .collect()
    }

    /// Publishes the namespace changes of a commit.
    pub(crate) fn apply_namespace(
        &self,
        commit_id: CommitId,
        created: &[(String, TableId)],
        dropped: &[(String, TableId)],
    ) {
        if created.is_empty() && dropped.is_empty() {
            return;
        }
        {
            let mut committed = self.committed.write();
            for (name, id) in dropped {
                if committed.get(name) == Some(id) {
                    committed.remove(name);
                }
            }
            for (name, id) in created {
                // Created and dropped by the same transaction: never published.
                if !dropped.iter().any(|(_, d)| d == id) {
                    committed.insert(name.clone(), *id);
                }
            }
        }
        {
            let mut gone = self.dropped.lock();
            for (_, id) in dropped {
                gone.push((commit_id, *id));
            }
        }
        self.namespace.lock().push(NamespaceJournal {
            commit_id,
            created: created.iter().map(|(n, _)| n.clone()).collect(),
            dropped: dropped.iter().map(|(n, _)| n.clone()).collect(),
        });
        debug!(commit_id, created = created.len(), dropped = dropped.len(), "namespace changed");
    }

    /// Drops namespace history, dropped sources and removed rows that no
    /// transaction starting at or after `min_commit_id` can observe.
    /// Returns the number of physical rows reclaimed.
    pub fn collect_garbage(&self, min_commit_id: CommitId) -> usize {
        self.namespace
            .lock()
            .retain(|j| j.commit_id >= min_commit_id);

        let expired: Vec<TableId> = {
            let mut gone = self.dropped.lock();
            let expired = gone
                .iter()
                .filter(|(commit_id, _)| *commit_id < min_commit_id)
                .map(|(_, id)| *id)
                .collect();
            gone.retain(|(commit_id, _)| *commit_id >= min_commit_id);
            expired
        };
        if !expired.is_empty() {
            let mut sources = self.sources.write();
            for id in &expired {
                sources.remove(id);
            }
            debug!(tables = expired.len(), "dropped tables released");
        }

        self.committed_sources()
            .iter()
            .map(|s| s.collect_garbage(min_commit_id))
            .sum()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
