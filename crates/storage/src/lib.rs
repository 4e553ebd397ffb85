//! Tessel Storage - the transaction engine of the Tessel in-memory database.
//!
//! This crate provides:
//!
//! - `TableSource`: physical rows, committed indexes and commit history of a table
//! - `TransactionTable`: a transaction's private, lazily indexed view of a table
//! - `TableEventRegistry`: the per-table journal of row events
//! - `ConstraintChecker`: statement-level and commit-time constraint validation
//! - `Locker`: FIFO shared/exclusive table locks with timeouts
//! - `TransactionManager` / `Transaction`: snapshot transactions with
//!   optimistic, serialized commits
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessel_core::schema::TableBuilder;
//! use tessel_core::{DataType, Row, Value};
//! use tessel_storage::{DirtySelectPolicy, TransactionManager, TransactionOptions};
//!
//! let manager = Arc::new(TransactionManager::new(None));
//! let options = TransactionOptions::new(DirtySelectPolicy::Error);
//!
//! let mut tx = manager.begin(options).unwrap();
//! let schema = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key(&["id"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! tx.create_table(schema).unwrap();
//! tx.insert("users", Row::new(vec![Value::Int64(1), Value::from("Alice")]))
//!     .unwrap();
//! tx.assert_constraints().unwrap();
//! tx.commit().unwrap();
//!
//! let mut reader = manager.begin(options).unwrap();
//! assert_eq!(reader.get_table("users").unwrap().row_count(), 1);
//! ```

pub mod catalog;
pub mod collection;
mod commit;
pub mod constraint;
pub mod journal;
pub mod lock;
pub mod manager;
pub mod source;
pub mod table;
pub mod transaction;

/// Identifies a commit. Assigned in increasing order.
pub type CommitId = u64;

/// Identifies a transaction for its lifetime.
pub type TransactionId = u64;

pub use catalog::{Catalog, NamespaceJournal};
pub use collection::{OpenTransaction, TransactionCollection};
pub use constraint::{CheckMode, ConstraintChecker, TableContext};
pub use journal::{TableEvent, TableEventRegistry, TransactionRegistry};
pub use lock::{Lock, LockHandle, LockType, Lockable, Locker, LockingQueue};
pub use manager::{CommitCallback, TableCommitInfo, TransactionManager};
pub use source::{CommittedJournal, TableSource};
pub use table::TransactionTable;
pub use transaction::{
    DirtySelectPolicy, IsolationLevel, Transaction, TransactionOptions, TransactionState,
};
