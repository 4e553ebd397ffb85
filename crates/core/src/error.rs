//! Error types for Tessel.
//!
//! Every failure surfaces as a distinct, matchable kind so callers can tell a
//! transaction worth retrying (a conflict or a lock timeout) from data that
//! has to be fixed (a constraint violation) and from a bug (malformed lock
//! access).

use core::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::row::RowNumber;

/// Result type alias for Tessel operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Tessel operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Commit-time conflict with a concurrently committed transaction.
    #[error(transparent)]
    Conflict(#[from] TransactionConflict),

    /// Constraint violation detected by a statement or at commit.
    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),

    /// Lock acquisition or access validation failure.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Mutation attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnlyTransaction,

    /// Mutation attempted against a read-only table source.
    #[error("table {table} is read-only")]
    ReadOnlyTable { table: String },

    /// The transaction was already committed or rolled back.
    #[error("transaction is closed")]
    TransactionClosed,

    /// The requested isolation level is declared but not supported.
    #[error("isolation level {level} is not supported")]
    UnsupportedIsolation { level: String },

    /// Table not found.
    #[error("table not found: {name}")]
    TableNotFound { name: String },

    /// Column not found.
    #[error("column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    /// Row is not visible in the table view.
    #[error("row {row} not found in table {table}")]
    RowNotFound { table: String, row: RowNumber },

    /// Invalid schema definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a row not found error.
    pub fn row_not_found(table: impl Into<String>, row: RowNumber) -> Self {
        Error::RowNotFound {
            table: table.into(),
            row,
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a read-only table error.
    pub fn read_only_table(table: impl Into<String>) -> Self {
        Error::ReadOnlyTable {
            table: table.into(),
        }
    }

    /// Returns true for commit-time conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Returns true for constraint violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::Constraint(_))
    }

    /// Returns true when running the whole transaction again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Conflict(_) | Error::Lock(LockError::Timeout { .. })
        )
    }

    /// Returns the conflict, if this is one.
    pub fn as_conflict(&self) -> Option<&TransactionConflict> {
        match self {
            Error::Conflict(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the constraint violation, if this is one.
    pub fn as_constraint_violation(&self) -> Option<&ConstraintViolation> {
        match self {
            Error::Constraint(v) => Some(v),
            _ => None,
        }
    }
}

/// Conflicts detected while committing a transaction.
///
/// Conflicts are never retried automatically: the transaction is rolled back
/// and the caller decides whether to run it again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionConflict {
    /// A table read by the transaction was changed by a concurrent commit.
    #[error("dirty select on table {table}: changed by a concurrent commit")]
    DirtySelect { table: String },

    /// An object created or dropped here was also created or dropped concurrently.
    #[error("object {name} was created or dropped by a concurrent commit")]
    DuplicateObject { name: String },

    /// The same row was removed by this and by a concurrent transaction.
    #[error("row {row} of table {table} was removed by a concurrent commit")]
    RowRemoveClash { table: String, row: RowNumber },

    /// A table modified here was dropped by a concurrent commit.
    #[error("table {table} was dropped by a concurrent commit")]
    DroppedModified { table: String },

    /// A table dropped here was modified by a concurrent commit.
    #[error("table {table} was modified by a concurrent commit")]
    TableRemoveClash { table: String },

    /// Constraints of a table altered here were also altered concurrently.
    #[error("constraints of table {table} were altered by a concurrent commit")]
    ConstraintsAltered { table: String },
}

impl TransactionConflict {
    /// Stable numeric code for this conflict kind.
    pub fn code(&self) -> u32 {
        match self {
            TransactionConflict::DirtySelect { .. } => 0x0301,
            TransactionConflict::DuplicateObject { .. } => 0x0302,
            TransactionConflict::RowRemoveClash { .. } => 0x0303,
            TransactionConflict::DroppedModified { .. } => 0x0304,
            TransactionConflict::TableRemoveClash { .. } => 0x0305,
            TransactionConflict::ConstraintsAltered { .. } => 0x0306,
        }
    }

    /// Name of the table or object involved.
    pub fn object_name(&self) -> &str {
        match self {
            TransactionConflict::DirtySelect { table }
            | TransactionConflict::RowRemoveClash { table, .. }
            | TransactionConflict::DroppedModified { table }
            | TransactionConflict::TableRemoveClash { table }
            | TransactionConflict::ConstraintsAltered { table } => table,
            TransactionConflict::DuplicateObject { name } => name,
        }
    }
}

/// Kind of constraint that was violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    NotNull,
    Unique,
    PrimaryKey,
    ForeignKey,
    Check,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::NotNull => "NOT NULL",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
            ConstraintKind::Check => "CHECK",
        };
        f.write_str(name)
    }
}

/// A constraint violation with the constraint name and the offending table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} violation ({constraint}) on table {table}: {message}")]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    pub constraint: String,
    pub table: String,
    pub message: String,
}

impl ConstraintViolation {
    pub fn new(
        kind: ConstraintKind,
        constraint: impl Into<String>,
        table: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            constraint: constraint.into(),
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Kind of access a lock is taken for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessType {
    Read,
    Write,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::Read => f.write_str("read"),
            AccessType::Write => f.write_str("write"),
        }
    }
}

/// Lock failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock was not granted within the timeout. Nothing stays enqueued.
    #[error("timed out after {timeout:?} waiting for {access} lock on {resource}")]
    Timeout {
        resource: String,
        access: AccessType,
        timeout: Duration,
    },

    /// Access requested does not match the lock held. Indicates a bug.
    #[error("{requested} access to {resource} under a {held} lock")]
    MalformedAccess {
        resource: String,
        requested: AccessType,
        held: AccessType,
    },

    /// The resource is not covered by the lock handle.
    #[error("resource {resource} is not locked by this handle")]
    NotLocked { resource: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::table_not_found("users");
        assert!(err.to_string().contains("users"));

        let err: Error = TransactionConflict::RowRemoveClash {
            table: "t".into(),
            row: 7,
        }
        .into();
        assert!(err.to_string().contains("row 7"));
    }

    #[test]
    fn test_error_classification() {
        let conflict: Error = TransactionConflict::DirtySelect { table: "t".into() }.into();
        assert!(conflict.is_conflict());
        assert!(conflict.is_retryable());

        let violation: Error =
            ConstraintViolation::new(ConstraintKind::Unique, "uq", "t", "duplicate").into();
        assert!(violation.is_constraint_violation());
        assert!(!violation.is_retryable());

        let timeout: Error = LockError::Timeout {
            resource: "t".into(),
            access: AccessType::Write,
            timeout: Duration::from_millis(10),
        }
        .into();
        assert!(timeout.is_retryable());

        let malformed: Error = LockError::MalformedAccess {
            resource: "t".into(),
            requested: AccessType::Write,
            held: AccessType::Read,
        }
        .into();
        assert!(!malformed.is_retryable());
    }

    #[test]
    fn test_conflict_codes_are_distinct() {
        let codes = [
            TransactionConflict::DirtySelect { table: "a".into() }.code(),
            TransactionConflict::DuplicateObject { name: "a".into() }.code(),
            TransactionConflict::RowRemoveClash { table: "a".into(), row: 1 }.code(),
            TransactionConflict::DroppedModified { table: "a".into() }.code(),
            TransactionConflict::TableRemoveClash { table: "a".into() }.code(),
            TransactionConflict::ConstraintsAltered { table: "a".into() }.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_conflict_object_name() {
        let c = TransactionConflict::DuplicateObject { name: "foo".into() };
        assert_eq!(c.object_name(), "foo");
    }
}
