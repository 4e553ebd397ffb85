//! Set of open transactions, ordered by start commit id.

use crate::{CommitId, TransactionId};
use parking_lot::Mutex;

/// An open transaction as tracked by the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenTransaction {
    pub id: TransactionId,
    pub commit_id: CommitId,
}

/// Open transactions ordered by the commit id they started from.
///
/// The smallest start commit id is the garbage-collection watermark: no
/// history older than it can still be observed.
#[derive(Debug, Default)]
pub struct TransactionCollection {
    open: Mutex<Vec<OpenTransaction>>,
}

impl TransactionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: TransactionId, commit_id: CommitId) {
        let mut open = self.open.lock();
        let pos = open.partition_point(|t| t.commit_id <= commit_id);
        open.insert(pos, OpenTransaction { id, commit_id });
    }

    /// Removes a transaction. Returns false if it was not open.
    pub fn remove(&self, id: TransactionId) -> bool {
        let mut open = self.open.lock();
        match open.iter().position(|t| t.id == id) {
            Some(pos) => {
                open.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Smallest start commit id among open transactions.
    pub fn minimum_commit_id(&self) -> Option<CommitId> {
        self.open.lock().first().map(|t| t.commit_id)
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.open.lock().iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<OpenTransaction> {
        self.open.lock().clone()
    }
}
