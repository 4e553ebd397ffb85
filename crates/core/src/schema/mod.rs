//! Schema module for Tessel.
//!
//! Columns, tables and the declared constraints the transaction engine
//! enforces at statement end and at commit.

mod column;
mod constraint;
mod table;

pub use column::Column;
pub use constraint::{
    CheckConstraint, CheckExpression, ConstraintAction, Constraints, Deferrability, ForeignKey,
    KeyConstraint,
};
pub use table::{Table, TableBuilder};
