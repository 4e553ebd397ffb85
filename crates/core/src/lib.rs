//! Tessel Core - values, rows, schema and errors for the Tessel transaction engine.
//!
//! This crate provides the foundational types shared by every layer:
//!
//! - `DataType` / `Value`: column types and cell values with a total order
//! - `Row`, `RowId`: row values and the composite (table, row number) identity
//! - `schema`: tables, columns, keys, foreign keys and check constraints
//! - `Error`: the error taxonomy (conflicts, constraint violations, lock errors)
//!
//! # Example
//!
//! ```rust
//! use tessel_core::schema::{ConstraintAction, ForeignKey, TableBuilder};
//! use tessel_core::DataType;
//!
//! let orders = TableBuilder::new("orders")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("customer_id", DataType::Int64)
//!     .unwrap()
//!     .add_primary_key(&["id"])
//!     .unwrap()
//!     .add_foreign_key(
//!         ForeignKey::new("fk_customer", &["customer_id"], "customers", &["id"])
//!             .on_delete(ConstraintAction::Cascade),
//!     )
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(orders.column_count(), 2);
//! ```

mod error;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{
    AccessType, ConstraintKind, ConstraintViolation, Error, LockError, Result,
    TransactionConflict,
};
pub use row::{Row, RowId, RowNumber, TableId};
pub use types::DataType;
pub use value::Value;
