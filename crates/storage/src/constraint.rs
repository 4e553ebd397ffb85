//! Constraint checking for Tessel.
//!
//! This module validates not-null, primary key, unique, foreign key and
//! check constraints over a set of rows. Checks read tables through a
//! `TableContext`, so the same code serves statement-level checks inside a
//! transaction and the commit-time checks over the merged database view.

use crate::table::TransactionTable;
use std::sync::Arc;
use tessel_core::schema::{Deferrability, Table};
use tessel_core::{ConstraintKind, ConstraintViolation, Error, Result, Row, RowNumber, Value};
use tracing::debug;

/// Access to tables by name for constraint checks.
pub trait TableContext {
    fn table_mut(&mut self, name: &str) -> Result<&mut TransactionTable>;

    /// Names of every table visible in this context.
    fn table_names(&self) -> Vec<String>;

    fn schema_of(&self, name: &str) -> Option<Arc<Table>>;
}

/// Which constraints a check covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckMode {
    /// Only initially-immediate constraints (end of statement).
    Immediate,
    /// Every constraint (commit).
    All,
}

impl CheckMode {
    #[inline]
    pub fn applies(self, deferrability: Deferrability) -> bool {
        self == CheckMode::All || deferrability == Deferrability::InitiallyImmediate
    }
}

/// Constraint checker for validating database constraints.
pub struct ConstraintChecker;

impl ConstraintChecker {
    /// Checks every constraint affected by adding `rows` to `table`.
    pub fn check_added_rows<C: TableContext + ?Sized>(
        ctx: &mut C,
        table: &str,
        rows: &[RowNumber],
        mode: CheckMode,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        {
            let view = ctx.table_mut(table)?;
            Self::check_not_null(view, rows)?;
            Self::check_keys(view, rows, mode)?;
            Self::check_expressions(view, rows, mode)?;
        }
        Self::check_foreign_keys(ctx, table, rows, mode)
    }

    /// Checks that removing `rows` from `table` orphans no referencing row.
    pub fn check_removed_rows<C: TableContext + ?Sized>(
        ctx: &mut C,
        table: &str,
        rows: &[RowNumber],
        mode: CheckMode,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        Self::check_imported_keys(ctx, table, rows, mode)
    }

    /// Checks every visible row of `table` against its constraints.
    pub fn check_table<C: TableContext + ?Sized>(
        ctx: &mut C,
        table: &str,
        mode: CheckMode,
    ) -> Result<()> {
        let rows = ctx.table_mut(table)?.rows();
        Self::check_added_rows(ctx, table, &rows, mode)
    }

    /// Checks the not-null constraint. Not deferrable.
    pub fn check_not_null(table: &TransactionTable, rows: &[RowNumber]) -> Result<()> {
        let schema = table.schema();
        let not_nullable = schema.constraints().get_not_nullable();
        let columns = schema.column_indices(not_nullable)?;
        for &row in rows {
            let values = table.get_row(row)?;
            for (name, &column) in not_nullable.iter().zip(&columns) {
                if values.get(column).map_or(true, Value::is_null) {
                    return Err(violation(
                        ConstraintKind::NotNull,
                        name,
                        schema.name(),
                        format!("column {} cannot be NULL", name),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Checks primary key and unique constraints.
    ///
    /// A NULL in a unique key never conflicts; a NULL in the primary key is
    /// a violation.
    pub fn check_keys(table: &mut TransactionTable, rows: &[RowNumber], mode: CheckMode) -> Result<()> {
        let schema = Arc::clone(table.schema());
        let constraints = schema.constraints();
        let keys = constraints
            .get_primary_key()
            .map(|k| (k, ConstraintKind::PrimaryKey))
            .into_iter()
            .chain(constraints.get_unique().iter().map(|k| (k, ConstraintKind::Unique)));

        for (key, kind) in keys {
            if !mode.applies(key.deferrability) {
                continue;
            }
            let columns = schema.column_indices(&key.columns)?;
            for &row in rows {
                let values = table.get_row(row)?.key(&columns);
                if values.iter().any(Value::is_null) {
                    if kind == ConstraintKind::PrimaryKey {
                        return Err(violation(
                            kind,
                            &key.name,
                            schema.name(),
                            "primary key contains NULL",
                        ));
                    }
                    continue;
                }
                if table.select_key(&columns, &values)?.len() > 1 {
                    return Err(violation(
                        kind,
                        &key.name,
                        schema.name(),
                        format!("duplicate key ({})", format_key(&values)),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Evaluates check expressions. An unknown result passes.
    pub fn check_expressions(table: &TransactionTable, rows: &[RowNumber], mode: CheckMode) -> Result<()> {
        let schema = table.schema();
        for check in schema.constraints().get_checks() {
            if !mode.applies(check.deferrability) {
                continue;
            }
            for &row in rows {
                match check.evaluate(&*table.get_row(row)?) {
                    Some(true) => {}
                    Some(false) => {
                        return Err(violation(
                            ConstraintKind::Check,
                            &check.name,
                            schema.name(),
                            format!("row {} fails {}", row, check.description),
                        ));
                    }
                    None => {
                        debug!(table = %schema.name(), check = %check.name, row, "check evaluated to unknown");
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks that every foreign key of the added rows resolves in the
    /// referenced table. Keys that are entirely NULL are not checked.
    pub fn check_foreign_keys<C: TableContext + ?Sized>(
        ctx: &mut C,
        table: &str,
        rows: &[RowNumber],
        mode: CheckMode,
    ) -> Result<()> {
        let schema = ctx.schema_of(table).ok_or_else(|| Error::table_not_found(table))?;
        for fk in schema.constraints().get_foreign_keys() {
            if !mode.applies(fk.deferrability) {
                continue;
            }
            let columns = schema.column_indices(&fk.columns)?;
            let keys = {
                let view = ctx.table_mut(table)?;
                rows.iter()
                    .map(|r| Ok(view.get_row(*r)?.key(&columns)))
                    .collect::<Result<Vec<_>>>()?
            };
            let keys: Vec<Vec<Value>> = keys
                .into_iter()
                .filter(|k| !k.iter().all(Value::is_null))
                .collect();
            if keys.is_empty() {
                continue;
            }

            let parent_schema = ctx.schema_of(&fk.ref_table).ok_or_else(|| {
                violation(
                    ConstraintKind::ForeignKey,
                    &fk.name,
                    table,
                    format!("referenced table {} does not exist", fk.ref_table),
                )
            })?;
            let ref_columns = parent_schema.column_indices(&fk.ref_columns)?;
            let parent = ctx.table_mut(&fk.ref_table)?;
            for key in keys {
                if parent.select_key(&ref_columns, &key)?.is_empty() {
                    return Err(violation(
                        ConstraintKind::ForeignKey,
                        &fk.name,
                        table,
                        format!("no row in {} has key ({})", fk.ref_table, format_key(&key)),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Checks that no visible row still references a key of the removed
    /// rows. A key that another visible row of `table` still carries is
    /// not considered removed.
    pub fn check_imported_keys<C: TableContext + ?Sized>(
        ctx: &mut C,
        table: &str,
        rows: &[RowNumber],
        mode: CheckMode,
    ) -> Result<()> {
        let parent_schema = ctx.schema_of(table).ok_or_else(|| Error::table_not_found(table))?;
        let removed: Vec<Arc<Row>> = {
            let view = ctx.table_mut(table)?;
            rows.iter().map(|r| view.get_row(*r)).collect::<Result<_>>()?
        };

        for child in ctx.table_names() {
            let Some(child_schema) = ctx.schema_of(&child) else {
                continue;
            };
            for fk in child_schema.constraints().get_foreign_keys() {
                if fk.ref_table != table || !mode.applies(fk.deferrability) {
                    continue;
                }
                let ref_columns = parent_schema.column_indices(&fk.ref_columns)?;
                let columns = child_schema.column_indices(&fk.columns)?;
                for row in &removed {
                    let key = row.key(&ref_columns);
                    if key.iter().any(Value::is_null) {
                        continue;
                    }
                    if !ctx.table_mut(table)?.select_key(&ref_columns, &key)?.is_empty() {
                        continue;
                    }
                    let referencing = ctx.table_mut(&child)?.select_key(&columns, &key)?;
                    if !referencing.is_empty() {
                        return Err(violation(
                            ConstraintKind::ForeignKey,
                            &fk.name,
                            table,
                            format!(
                                "key ({}) is still referenced by {} row(s) in {}",
                                format_key(&key),
                                referencing.len(),
                                child
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn violation(
    kind: ConstraintKind,
    constraint: &str,
    table: &str,
    message: impl Into<String>,
) -> Error {
    ConstraintViolation::new(kind, constraint, table, message).into()
}

fn format_key(key: &[Value]) -> String {
    key.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
