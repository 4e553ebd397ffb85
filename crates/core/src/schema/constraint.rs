//! Constraint definitions.

use crate::row::Row;
use core::fmt;
use std::sync::Arc;

/// Referential action taken when a referenced key is deleted or updated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConstraintAction {
    /// Reject the change while references exist.
    #[default]
    NoAction,
    /// Propagate the delete/update to referencing rows.
    Cascade,
    /// Null out the referencing columns.
    SetNull,
    /// Reset the referencing columns to their defaults.
    SetDefault,
}

/// When a declared constraint is evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Deferrability {
    /// Checked at the end of every statement and again at commit.
    #[default]
    InitiallyImmediate,
    /// Checked only at commit.
    InitiallyDeferred,
}

/// A primary key or unique constraint over one or more columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyConstraint {
    pub name: String,
    pub columns: Vec<String>,
    pub deferrability: Deferrability,
}

impl KeyConstraint {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            deferrability: Deferrability::InitiallyImmediate,
        }
    }

    pub fn deferrability(mut self, deferrability: Deferrability) -> Self {
        self.deferrability = deferrability;
        self
    }
}

/// Foreign key specification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    /// Referencing (child) table. Filled in by the table builder.
    pub table: String,
    pub columns: Vec<String>,
    /// Referenced (parent) table.
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: ConstraintAction,
    pub on_update: ConstraintAction,
    pub deferrability: Deferrability,
}

impl ForeignKey {
    pub fn new(
        name: impl Into<String>,
        columns: &[&str],
        ref_table: impl Into<String>,
        ref_columns: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ref_table: ref_table.into(),
            ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
            on_delete: ConstraintAction::NoAction,
            on_update: ConstraintAction::NoAction,
            deferrability: Deferrability::InitiallyImmediate,
        }
    }

    pub fn on_delete(mut self, action: ConstraintAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ConstraintAction) -> Self {
        self.on_update = action;
        self
    }

    pub fn deferrability(mut self, deferrability: Deferrability) -> Self {
        self.deferrability = deferrability;
        self
    }
}

/// Evaluates a check expression against a row. `None` is SQL unknown.
pub type CheckExpression = Arc<dyn Fn(&Row) -> Option<bool> + Send + Sync>;

/// A check constraint. Expression evaluation is supplied by the caller.
#[derive(Clone)]
pub struct CheckConstraint {
    pub name: String,
    pub expression: CheckExpression,
    /// Human-readable form used in violation messages.
    pub description: String,
    pub deferrability: Deferrability,
}

impl CheckConstraint {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, expression: F) -> Self
    where
        F: Fn(&Row) -> Option<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            expression: Arc::new(expression),
            description: description.into(),
            deferrability: Deferrability::InitiallyImmediate,
        }
    }

    pub fn deferrability(mut self, deferrability: Deferrability) -> Self {
        self.deferrability = deferrability;
        self
    }

    pub fn evaluate(&self, row: &Row) -> Option<bool> {
        (self.expression)(row)
    }
}

impl fmt::Debug for CheckConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckConstraint")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("deferrability", &self.deferrability)
            .finish()
    }
}

/// Table constraints container.
#[derive(Clone, Debug, Default)]
pub struct Constraints {
    primary_key: Option<KeyConstraint>,
    unique: Vec<KeyConstraint>,
    foreign_keys: Vec<ForeignKey>,
    checks: Vec<CheckConstraint>,
    not_nullable: Vec<String>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary_key(mut self, pk: KeyConstraint) -> Self {
        self.primary_key = Some(pk);
        self
    }

    pub fn add_unique(mut self, key: KeyConstraint) -> Self {
        self.unique.push(key);
        self
    }

    pub fn add_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn add_check(mut self, check: CheckConstraint) -> Self {
        self.checks.push(check);
        self
    }

    pub fn not_nullable(mut self, columns: Vec<String>) -> Self {
        self.not_nullable = columns;
        self
    }

    pub fn get_primary_key(&self) -> Option<&KeyConstraint> {
        self.primary_key.as_ref()
    }

    pub fn get_unique(&self) -> &[KeyConstraint] {
        &self.unique
    }

    pub fn get_foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn get_checks(&self) -> &[CheckConstraint] {
        &self.checks
    }

    pub fn get_not_nullable(&self) -> &[String] {
        &self.not_nullable
    }
}
