//! Tessel - an embedded, transactional in-memory database.
//!
//! This crate is the public entry point. It wraps the storage engine's
//! `TransactionManager` in a [`Database`] configured by a
//! [`DatabaseConfig`], and re-exports the types needed to define schemas,
//! run transactions and handle their errors.
//!
//! # Example
//!
//! ```rust
//! use tessel_database::schema::TableBuilder;
//! use tessel_database::{DataType, Database, DatabaseConfig, DirtySelectPolicy, Row, Value};
//!
//! let db = Database::open(DatabaseConfig::new(DirtySelectPolicy::Error)).unwrap();
//! db.create_table(
//!     TableBuilder::new("users")
//!         .unwrap()
//!         .add_column("id", DataType::Int64)
//!         .unwrap()
//!         .add_column("name", DataType::String)
//!         .unwrap()
//!         .add_primary_key(&["id"])
//!         .unwrap()
//!         .build()
//!         .unwrap(),
//! )
//! .unwrap();
//!
//! let mut tx = db.begin().unwrap();
//! tx.insert("users", Row::new(vec![Value::Int64(1), Value::from("Alice")]))
//!     .unwrap();
//! tx.commit().unwrap();
//!
//! let mut tx = db.begin_read_only().unwrap();
//! let users = tx.get_table("users").unwrap();
//! let rows = users.select_equal(0, &Value::Int64(1)).unwrap();
//! assert_eq!(users.get_value(rows[0], 1).unwrap(), Value::from("Alice"));
//! ```

mod config;
mod database;

pub use config::DatabaseConfig;
pub use database::Database;

pub use tessel_core::schema;
pub use tessel_core::{
    ConstraintKind, ConstraintViolation, DataType, Error, LockError, Result, Row, RowId,
    RowNumber, TableId, TransactionConflict, Value,
};
pub use tessel_index::KeyRange;
pub use tessel_storage::{
    DirtySelectPolicy, IsolationLevel, LockHandle, TableCommitInfo, Transaction,
    TransactionOptions, TransactionState, TransactionTable,
};
