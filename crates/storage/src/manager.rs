//! Transaction manager.
//!
//! The manager owns everything shared between transactions: the catalog,
//! the commit id counter, the set of open transactions, the table locker and
//! the registered commit callbacks. Commits are serialized by a single
//! commit lock; beginning a transaction takes the same lock so that its
//! snapshot and start commit id are consistent with each other.

use crate::catalog::Catalog;
use crate::collection::TransactionCollection;
use crate::lock::Locker;
use crate::transaction::{Transaction, TransactionOptions, VisibleTable};
use crate::{CommitId, TransactionId};
use core::fmt;
use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessel_core::{Error, Result, RowNumber};
use tracing::{debug, trace};

/// Changes one commit made to one table, passed to commit callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableCommitInfo {
    pub table: String,
    pub commit_id: CommitId,
    /// Rows made visible by the commit.
    pub added: Vec<RowNumber>,
    /// Rows removed, including old versions of updated rows.
    pub removed: Vec<RowNumber>,
}

/// Called during commit, after validation and before the changes are
/// published. Returning an error aborts the commit.
pub type CommitCallback = Arc<dyn Fn(&TableCommitInfo) -> Result<()> + Send + Sync>;

/// Coordinates transactions over a set of tables.
pub struct TransactionManager {
    catalog: Catalog,
    open: TransactionCollection,
    locker: Locker,
    commit_lock: Mutex<()>,
    next_commit_id: AtomicU64,
    next_transaction_id: AtomicU64,
    callbacks: RwLock<HashMap<String, Vec<CommitCallback>>>,
    lock_timeout: Option<Duration>,
}

impl TransactionManager {
    /// Creates a manager with no tables. `lock_timeout` bounds every wait
    /// for an explicit table lock; `None` waits forever.
    pub fn new(lock_timeout: Option<Duration>) -> Self {
        Self {
            catalog: Catalog::new(),
            open: TransactionCollection::new(),
            locker: Locker::new(),
            commit_lock: Mutex::new(()),
            next_commit_id: AtomicU64::new(1),
            next_transaction_id: AtomicU64::new(1),
            callbacks: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Begins a transaction over the current committed state.
    pub fn begin(self: &Arc<Self>, options: TransactionOptions) -> Result<Transaction> {
        if !options.isolation.is_supported() {
            return Err(Error::UnsupportedIsolation {
                level: options.isolation.to_string(),
            });
        }
        let _guard = self.commit_lock.lock();
        let commit_id = self.next_commit_id.load(Ordering::Acquire);
        let id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed);
        let visible = self
            .catalog
            .committed_sources()
            .into_iter()
            .map(|source| (source.name(), VisibleTable::new(source)))
            .collect();
        self.open.add(id, commit_id);
        debug!(id, commit_id, isolation = %options.isolation, read_only = options.read_only, "transaction started");
        Ok(Transaction::new(Arc::clone(self), id, commit_id, options, visible))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn locker(&self) -> &Locker {
        &self.locker
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    pub fn open_transactions(&self) -> &TransactionCollection {
        &self.open
    }

    /// The commit id the next commit will be assigned.
    pub fn next_commit_id(&self) -> CommitId {
        self.next_commit_id.load(Ordering::Acquire)
    }

    /// Smallest start commit id among open transactions, or the next
    /// commit id when none is open.
    pub fn minimum_commit_id(&self) -> CommitId {
        let _guard = self.commit_lock.lock();
        self.open
            .minimum_commit_id()
            .unwrap_or_else(|| self.next_commit_id())
    }

    /// Registers a callback fired whenever a commit changes `table`.
    ///
    /// Callbacks run with the commit lock held. A callback must not begin,
    /// commit or collect garbage on this manager: those take the same lock
    /// and would deadlock.
    pub fn on_commit<F>(&self, table: impl Into<String>, callback: F)
    where
        F: Fn(&TableCommitInfo) -> Result<()> + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .entry(table.into())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Reclaims history and rows no open transaction can observe.
    /// Returns the number of physical rows reclaimed.
    pub fn collect_garbage(&self) -> usize {
        let min_commit_id = self.minimum_commit_id();
        let reclaimed = self.catalog.collect_garbage(min_commit_id);
        if reclaimed > 0 {
            trace!(min_commit_id, reclaimed, "garbage collected");
        }
        reclaimed
    }

    pub(crate) fn commit_guard(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock()
    }

    /// Takes the next commit id. Call with the commit lock held.
    pub(crate) fn advance_commit_id(&self) -> CommitId {
        self.next_commit_id.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn fire_callbacks(&self, info: &TableCommitInfo) -> Result<()> {
        let callbacks = match self.callbacks.read().get(&info.table) {
            Some(callbacks) => callbacks.clone(),
            None => return Ok(()),
        };
        for callback in callbacks {
            callback(info)?;
        }
        Ok(())
    }

    pub(crate) fn transaction_closed(&self, id: TransactionId) {
        self.open.remove(id);
        self.collect_garbage();
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("catalog", &self.catalog)
            .field("open", &self.open.len())
            .field("next_commit_id", &self.next_commit_id())
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}
