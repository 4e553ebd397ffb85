//! Integration tests for transactions, commit conflicts and constraints.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tessel_core::schema::{
    ConstraintAction, Constraints, Deferrability, ForeignKey, KeyConstraint, Table, TableBuilder,
};
use tessel_core::{ConstraintKind, DataType, Error, LockError, Row, RowNumber, TransactionConflict, Value};
use tessel_storage::{
    DirtySelectPolicy, IsolationLevel, TableCommitInfo, Transaction, TransactionManager,
    TransactionOptions, TransactionState,
};

fn manager() -> Arc<TransactionManager> {
    Arc::new(TransactionManager::new(Some(Duration::from_millis(50))))
}

fn options() -> TransactionOptions {
    TransactionOptions::new(DirtySelectPolicy::Error)
}

fn setup(manager: &Arc<TransactionManager>, schemas: Vec<Table>) {
    let mut tx = manager.begin(options()).unwrap();
    for schema in schemas {
        tx.create_table(schema).unwrap();
    }
    tx.commit().unwrap();
}

fn items() -> Table {
    TableBuilder::new("items")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("qty", DataType::Int32)
        .unwrap()
        .add_primary_key(&["id"])
        .unwrap()
        .build()
        .unwrap()
}

fn logs() -> Table {
    TableBuilder::new("logs")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .build()
        .unwrap()
}

fn customers() -> Table {
    TableBuilder::new("customers")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_primary_key(&["id"])
        .unwrap()
        .build()
        .unwrap()
}

fn orders(on_delete: ConstraintAction, deferrability: Deferrability) -> Table {
    TableBuilder::new("orders")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("customer_id", DataType::Int64)
        .unwrap()
        .add_nullable(&["customer_id"])
        .add_default("customer_id", Value::Int64(0))
        .unwrap()
        .add_primary_key(&["id"])
        .unwrap()
        .add_foreign_key(
            ForeignKey::new("fk_orders_customer", &["customer_id"], "customers", &["id"])
                .on_delete(on_delete)
                .on_update(ConstraintAction::Cascade)
                .deferrability(deferrability),
        )
        .unwrap()
        .build()
        .unwrap()
}

fn item(id: i64, qty: i32) -> Row {
    Row::new(vec![Value::Int64(id), Value::Int32(qty)])
}

fn pair(a: i64, b: i64) -> Row {
    Row::new(vec![Value::Int64(a), Value::Int64(b)])
}

fn ids(tx: &mut Transaction, table: &str) -> Vec<i64> {
    let view = tx.get_table(table).unwrap();
    let mut ids: Vec<i64> = view
        .rows()
        .into_iter()
        .map(|r| view.get_value(r, 0).unwrap().as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    ids
}

fn find(tx: &mut Transaction, table: &str, id: i64) -> RowNumber {
    tx.get_table(table)
        .unwrap()
        .select_equal(0, &Value::Int64(id))
        .unwrap()[0]
}

fn conflict(err: Error) -> TransactionConflict {
    err.as_conflict().cloned().unwrap_or_else(|| panic!("not a conflict: {err}"))
}

fn violation_kind(err: Error) -> ConstraintKind {
    err.as_constraint_violation()
        .unwrap_or_else(|| panic!("not a constraint violation: {err}"))
        .kind
}

#[test]
fn test_uncommitted_writes_are_invisible() {
    let manager = manager();
    setup(&manager, vec![items()]);

    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    t1.insert("items", item(1, 10)).unwrap();
    assert_eq!(ids(&mut t1, "items"), vec![1]);
    assert!(ids(&mut t2, "items").is_empty());

    t1.commit().unwrap();
    // t2 keeps its snapshot.
    assert!(ids(&mut t2, "items").is_empty());
    drop(t2);

    let mut t3 = manager.begin(options()).unwrap();
    assert_eq!(ids(&mut t3, "items"), vec![1]);
}

#[test]
fn test_concurrent_removal_of_same_row_conflicts() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut tx = manager.begin(options()).unwrap();
    tx.insert("items", item(1, 10)).unwrap();
    tx.commit().unwrap();

    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    let r1 = find(&mut t1, "items", 1);
    let r2 = find(&mut t2, "items", 1);
    t1.delete("items", r1).unwrap();
    t2.delete("items", r2).unwrap();
    t1.commit().unwrap();

    let err = t2.commit().unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(conflict(err), TransactionConflict::RowRemoveClash { row, .. } if row == r1));

    let source = manager.catalog().get_committed("items").unwrap();
    assert_eq!(source.physical_row_count(), 0);
    assert!(manager.open_transactions().is_empty());
}

#[test]
fn test_update_clashes_with_concurrent_delete() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut tx = manager.begin(options()).unwrap();
    tx.insert("items", item(1, 10)).unwrap();
    tx.commit().unwrap();

    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    let r = find(&mut t1, "items", 1);
    t1.update("items", r, item(1, 11)).unwrap();
    t2.delete("items", r).unwrap();
    t2.commit().unwrap();
    assert!(matches!(
        conflict(t1.commit().unwrap_err()),
        TransactionConflict::RowRemoveClash { .. }
    ));
}

#[test]
fn test_disjoint_inserts_both_commit() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    t1.insert("items", item(1, 1)).unwrap();
    t2.insert("items", item(2, 2)).unwrap();
    t1.commit().unwrap();
    t2.commit().unwrap();

    let mut t3 = manager.begin(options()).unwrap();
    assert_eq!(ids(&mut t3, "items"), vec![1, 2]);
}

#[test]
fn test_concurrent_duplicate_key_fails_at_commit() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    t1.insert("items", item(1, 1)).unwrap();
    t2.insert("items", item(1, 2)).unwrap();
    t1.assert_constraints().unwrap();
    t2.assert_constraints().unwrap();
    t1.commit().unwrap();
    assert_eq!(violation_kind(t2.commit().unwrap_err()), ConstraintKind::PrimaryKey);

    let mut t3 = manager.begin(options()).unwrap();
    let r = find(&mut t3, "items", 1);
    assert_eq!(
        t3.get_table("items").unwrap().get_value(r, 1).unwrap(),
        Value::Int32(1)
    );
}

#[test]
fn test_dirty_select_detected() {
    let manager = manager();
    setup(&manager, vec![items(), logs()]);

    let mut reader = manager.begin(options()).unwrap();
    assert!(ids(&mut reader, "items").is_empty());

    let mut writer = manager.begin(options()).unwrap();
    writer.insert("items", item(1, 1)).unwrap();
    writer.commit().unwrap();

    reader.insert("logs", Row::new(vec![Value::Int64(1)])).unwrap();
    assert!(matches!(
        conflict(reader.commit().unwrap_err()),
        TransactionConflict::DirtySelect { ref table } if table == "items"
    ));
}

#[test]
fn test_dirty_select_skipped_when_not_requested() {
    let manager = manager();
    setup(&manager, vec![items(), logs()]);
    let relaxed = [
        TransactionOptions::new(DirtySelectPolicy::Ignore),
        options().isolation(IsolationLevel::Snapshot),
    ];
    for (i, opts) in relaxed.into_iter().enumerate() {
        let mut reader = manager.begin(opts).unwrap();
        ids(&mut reader, "items");

        let mut writer = manager.begin(options()).unwrap();
        writer.insert("items", item(i as i64, 1)).unwrap();
        writer.commit().unwrap();

        reader.insert("logs", Row::new(vec![Value::Int64(i as i64)])).unwrap();
        reader.commit().unwrap();
    }
}

#[test]
fn test_assert_constraints_is_idempotent() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut tx = manager.begin(options()).unwrap();
    tx.insert("items", item(1, 1)).unwrap();
    tx.assert_constraints().unwrap();
    tx.assert_constraints().unwrap();

    tx.insert("items", item(1, 2)).unwrap();
    tx.insert("items", item(2, 2)).unwrap();
    assert_eq!(
        violation_kind(tx.assert_constraints().unwrap_err()),
        ConstraintKind::PrimaryKey
    );
    // The failing window was rolled back; nothing is left to check.
    tx.assert_constraints().unwrap();
    assert_eq!(ids(&mut tx, "items"), vec![1]);
    tx.commit().unwrap();
}

#[test]
fn test_cascade_delete_is_transitive() {
    let manager = manager();
    let lines = TableBuilder::new("lines")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("order_id", DataType::Int64)
        .unwrap()
        .add_foreign_key(
            ForeignKey::new("fk_lines_order", &["order_id"], "orders", &["id"])
                .on_delete(ConstraintAction::Cascade),
        )
        .unwrap()
        .build()
        .unwrap();
    setup(
        &manager,
        vec![customers(), orders(ConstraintAction::Cascade, Deferrability::InitiallyImmediate), lines],
    );

    let mut tx = manager.begin(options()).unwrap();
    tx.insert("customers", Row::new(vec![Value::Int64(1)])).unwrap();
    tx.insert("customers", Row::new(vec![Value::Int64(2)])).unwrap();
    tx.insert("orders", pair(10, 1)).unwrap();
    tx.insert("orders", pair(11, 1)).unwrap();
    tx.insert("orders", pair(12, 2)).unwrap();
    tx.insert("lines", pair(100, 10)).unwrap();
    tx.insert("lines", pair(101, 11)).unwrap();
    tx.insert("lines", pair(102, 12)).unwrap();
    tx.assert_constraints().unwrap();
    tx.commit().unwrap();

    let mut tx = manager.begin(options()).unwrap();
    let c1 = find(&mut tx, "customers", 1);
    tx.delete("customers", c1).unwrap();
    tx.assert_constraints().unwrap();
    tx.commit().unwrap();

    let mut tx = manager.begin(options()).unwrap();
    assert_eq!(ids(&mut tx, "customers"), vec![2]);
    assert_eq!(ids(&mut tx, "orders"), vec![12]);
    assert_eq!(ids(&mut tx, "lines"), vec![102]);
}

#[test]
fn test_no_action_delete_fails_and_keeps_rows() {
    let manager = manager();
    setup(
        &manager,
        vec![customers(), orders(ConstraintAction::NoAction, Deferrability::InitiallyImmediate)],
    );
    let mut tx = manager.begin(options()).unwrap();
    tx.insert("customers", Row::new(vec![Value::Int64(1)])).unwrap();
    tx.insert("orders", pair(10, 1)).unwrap();
    tx.commit().unwrap();

    let mut tx = manager.begin(options()).unwrap();
    let c1 = find(&mut tx, "customers", 1);
    tx.delete("customers", c1).unwrap();
    assert_eq!(
        violation_kind(tx.assert_constraints().unwrap_err()),
        ConstraintKind::ForeignKey
    );
    assert_eq!(ids(&mut tx, "customers"), vec![1]);
    assert_eq!(ids(&mut tx, "orders"), vec![10]);
}

#[test]
fn test_set_null_and_update_cascade() {
    let manager = manager();
    setup(
        &manager,
        vec![customers(), orders(ConstraintAction::SetNull, Deferrability::InitiallyImmediate)],
    );
    let mut tx = manager.begin(options()).unwrap();
    tx.insert("customers", Row::new(vec![Value::Int64(1)])).unwrap();
    tx.insert("customers", Row::new(vec![Value::Int64(2)])).unwrap();
    tx.insert("orders", pair(10, 1)).unwrap();
    tx.insert("orders", pair(20, 2)).unwrap();

    let c1 = find(&mut tx, "customers", 1);
    tx.update("customers", c1, Row::new(vec![Value::Int64(5)])).unwrap();
    let c2 = find(&mut tx, "customers", 2);
    tx.delete("customers", c2).unwrap();
    tx.assert_constraints().unwrap();

    let o10 = find(&mut tx, "orders", 10);
    let o20 = find(&mut tx, "orders", 20);
    let orders = tx.get_table("orders").unwrap();
    assert_eq!(orders.get_value(o10, 1).unwrap(), Value::Int64(5));
    assert_eq!(orders.get_value(o20, 1).unwrap(), Value::Null);
    tx.commit().unwrap();
}

#[test]
fn test_failed_statement_is_atomic() {
    let manager = manager();
    setup(
        &manager,
        vec![customers(), orders(ConstraintAction::Cascade, Deferrability::InitiallyImmediate)],
    );
    let mut tx = manager.begin(options()).unwrap();
    tx.insert("customers", Row::new(vec![Value::Int64(1)])).unwrap();
    tx.insert("orders", pair(10, 1)).unwrap();
    tx.commit().unwrap();

    manager
        .catalog()
        .get_committed("orders")
        .unwrap()
        .set_read_only(true);

    let mut tx = manager.begin(options()).unwrap();
    let c1 = find(&mut tx, "customers", 1);
    assert!(matches!(tx.delete("customers", c1), Err(Error::ReadOnlyTable { .. })));
    assert_eq!(ids(&mut tx, "customers"), vec![1]);
    tx.assert_constraints().unwrap();
}

#[test]
fn test_deferred_foreign_key_checked_at_commit() {
    let manager = manager();
    setup(
        &manager,
        vec![customers(), orders(ConstraintAction::NoAction, Deferrability::InitiallyDeferred)],
    );

    let mut tx = manager.begin(options()).unwrap();
    tx.insert("orders", pair(10, 1)).unwrap();
    tx.assert_constraints().unwrap();
    tx.insert("customers", Row::new(vec![Value::Int64(1)])).unwrap();
    tx.assert_constraints().unwrap();
    tx.commit().unwrap();

    let mut tx = manager.begin(options()).unwrap();
    tx.insert("orders", pair(11, 7)).unwrap();
    tx.assert_constraints().unwrap();
    assert_eq!(violation_kind(tx.commit().unwrap_err()), ConstraintKind::ForeignKey);
}

#[test]
fn test_modifying_dropped_table_conflicts() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    t1.insert("items", item(1, 1)).unwrap();
    t2.drop_table("items").unwrap();
    assert!(!t2.has_table("items"));
    t2.commit().unwrap();

    assert!(matches!(
        conflict(t1.commit().unwrap_err()),
        TransactionConflict::DroppedModified { ref table } if table == "items"
    ));
}

#[test]
fn test_dropping_modified_table_conflicts() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    t1.drop_table("items").unwrap();
    t2.insert("items", item(1, 1)).unwrap();
    t2.commit().unwrap();

    assert!(matches!(
        conflict(t1.commit().unwrap_err()),
        TransactionConflict::TableRemoveClash { .. }
    ));
    assert!(manager.catalog().has_table("items"));
}

#[test]
fn test_concurrent_create_of_same_name_conflicts() {
    let manager = manager();
    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    t1.create_table(items()).unwrap();
    t2.create_table(items()).unwrap();
    t1.commit().unwrap();
    assert!(matches!(
        conflict(t2.commit().unwrap_err()),
        TransactionConflict::DuplicateObject { ref name } if name == "items"
    ));
    assert_eq!(manager.catalog().table_count(), 1);
}

#[test]
fn test_created_table_private_until_commit() {
    let manager = manager();
    let mut t1 = manager.begin(options()).unwrap();
    t1.create_table(items()).unwrap();
    t1.insert("items", item(1, 1)).unwrap();
    assert!(t1.create_table(items()).is_err());

    let t2 = manager.begin(options()).unwrap();
    assert!(!t2.has_table("items"));
    t1.rollback();
    drop(t2);

    let t3 = manager.begin(options()).unwrap();
    assert!(!t3.has_table("items"));
    assert_eq!(manager.catalog().table_count(), 0);
}

#[test]
fn test_drop_referenced_table_rejected() {
    let manager = manager();
    setup(
        &manager,
        vec![customers(), orders(ConstraintAction::NoAction, Deferrability::InitiallyImmediate)],
    );
    let mut tx = manager.begin(options()).unwrap();
    assert!(matches!(tx.drop_table("customers"), Err(Error::InvalidOperation { .. })));
    tx.drop_table("orders").unwrap();
    tx.drop_table("customers").unwrap();
    tx.commit().unwrap();
    assert_eq!(manager.catalog().table_count(), 0);
}

#[test]
fn test_altered_constraints_recheck_existing_rows() {
    let manager = manager();
    setup(&manager, vec![logs()]);
    let mut tx = manager.begin(options()).unwrap();
    tx.insert("logs", Row::new(vec![Value::Int64(1)])).unwrap();
    tx.insert("logs", Row::new(vec![Value::Int64(1)])).unwrap();
    tx.commit().unwrap();

    let unique = Constraints::new().add_unique(KeyConstraint::new("uq_logs_id", &["id"]));
    let mut tx = manager.begin(options()).unwrap();
    tx.alter_constraints("logs", unique.clone()).unwrap();
    assert_eq!(violation_kind(tx.commit().unwrap_err()), ConstraintKind::Unique);

    let mut tx = manager.begin(options()).unwrap();
    let rows = tx.get_table("logs").unwrap().rows();
    tx.delete("logs", rows[1]).unwrap();
    tx.alter_constraints("logs", unique).unwrap();
    tx.commit().unwrap();

    let schema = manager.catalog().get_committed("logs").unwrap().schema();
    assert_eq!(schema.constraints().get_unique().len(), 1);
}

#[test]
fn test_constraints_committed_concurrently_apply_at_commit() {
    let manager = manager();
    setup(&manager, vec![logs()]);
    let unique = Constraints::new().add_unique(KeyConstraint::new("uq_logs_id", &["id"]));

    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    let mut t3 = manager.begin(options()).unwrap();
    t1.alter_constraints("logs", unique).unwrap();
    t1.commit().unwrap();

    // t2 still sees the old schema, so its own check passes.
    t2.insert("logs", Row::new(vec![Value::Int64(1)])).unwrap();
    t2.insert("logs", Row::new(vec![Value::Int64(1)])).unwrap();
    t2.assert_constraints().unwrap();
    assert_eq!(violation_kind(t2.commit().unwrap_err()), ConstraintKind::Unique);

    t3.insert("logs", Row::new(vec![Value::Int64(2)])).unwrap();
    t3.commit().unwrap();

    let mut tx = manager.begin(options()).unwrap();
    assert_eq!(ids(&mut tx, "logs"), vec![2]);
    let schema = manager.catalog().get_committed("logs").unwrap().schema();
    assert_eq!(schema.constraints().get_unique().len(), 1);
}

#[test]
fn test_concurrent_constraint_changes_conflict() {
    let manager = manager();
    setup(&manager, vec![logs()]);
    let unique = Constraints::new().add_unique(KeyConstraint::new("uq_logs_id", &["id"]));

    let mut t1 = manager.begin(options()).unwrap();
    let mut t2 = manager.begin(options()).unwrap();
    t1.alter_constraints("logs", unique).unwrap();
    t2.alter_constraints("logs", Constraints::new()).unwrap();
    t1.commit().unwrap();

    let err = t2.commit().unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        conflict(err),
        TransactionConflict::ConstraintsAltered { table } if table == "logs"
    ));
    let schema = manager.catalog().get_committed("logs").unwrap().schema();
    assert_eq!(schema.constraints().get_unique().len(), 1);

    // A transaction started after the change may alter again.
    let mut t3 = manager.begin(options()).unwrap();
    t3.alter_constraints("logs", Constraints::new()).unwrap();
    t3.commit().unwrap();
    let schema = manager.catalog().get_committed("logs").unwrap().schema();
    assert!(schema.constraints().get_unique().is_empty());
}

#[test]
fn test_commit_callbacks() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let seen: Arc<Mutex<Vec<TableCommitInfo>>> = Arc::default();
    {
        let seen = Arc::clone(&seen);
        manager.on_commit("items", move |info| {
            seen.lock().unwrap().push(info.clone());
            if info.added.len() > 1 {
                return Err(Error::invalid_operation("too many rows"));
            }
            Ok(())
        });
    }

    let mut tx = manager.begin(options()).unwrap();
    let id = tx.insert("items", item(1, 1)).unwrap();
    tx.commit().unwrap();
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].table, "items");
        assert_eq!(seen[0].added, vec![id.number()]);
        assert!(seen[0].removed.is_empty());
    }

    let mut tx = manager.begin(options()).unwrap();
    tx.insert("items", item(2, 1)).unwrap();
    tx.insert("items", item(3, 1)).unwrap();
    assert!(tx.commit().is_err());
    let mut tx = manager.begin(options()).unwrap();
    assert_eq!(ids(&mut tx, "items"), vec![1]);
}

#[test]
fn test_commit_callback_omits_rows_never_visible() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let first = {
        let mut tx = manager.begin(options()).unwrap();
        let id = tx.insert("items", item(1, 1)).unwrap();
        tx.commit().unwrap();
        id.number()
    };
    let seen: Arc<Mutex<Vec<TableCommitInfo>>> = Arc::default();
    {
        let seen = Arc::clone(&seen);
        manager.on_commit("items", move |info| {
            seen.lock().unwrap().push(info.clone());
            Ok(())
        });
    }

    let mut tx = manager.begin(options()).unwrap();
    // Rolled back by the failed check, leaving compensating events.
    tx.insert("items", item(1, 2)).unwrap();
    assert!(tx.assert_constraints().is_err());
    // Added and deleted within the transaction.
    let temp = tx.insert("items", item(2, 1)).unwrap();
    tx.delete("items", temp.number()).unwrap();
    tx.delete("items", first).unwrap();
    tx.commit().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].added.is_empty());
    assert_eq!(seen[0].removed, vec![first]);
}

#[test]
fn test_removed_rows_reclaimed_after_old_snapshots_close() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut tx = manager.begin(options()).unwrap();
    tx.insert("items", item(1, 1)).unwrap();
    tx.commit().unwrap();
    let source = manager.catalog().get_committed("items").unwrap();

    let mut old = manager.begin(options()).unwrap();
    let mut tx = manager.begin(options()).unwrap();
    let r = find(&mut tx, "items", 1);
    tx.delete("items", r).unwrap();
    tx.commit().unwrap();

    assert_eq!(source.physical_row_count(), 1);
    assert_eq!(ids(&mut old, "items"), vec![1]);
    drop(old);
    assert_eq!(source.physical_row_count(), 0);
    assert_eq!(source.history_len(), 0);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let source = manager.catalog().get_committed("items").unwrap();
    {
        let mut tx = manager.begin(options()).unwrap();
        tx.insert("items", item(1, 1)).unwrap();
        assert_eq!(source.physical_row_count(), 1);
    }
    assert_eq!(source.physical_row_count(), 0);
    assert!(manager.open_transactions().is_empty());
}

#[test]
fn test_read_only_transaction() {
    let manager = manager();
    setup(&manager, vec![items()]);
    let mut tx = manager.begin(options().read_only(true)).unwrap();
    assert!(tx.is_read_only());
    assert!(matches!(tx.insert("items", item(1, 1)), Err(Error::ReadOnlyTransaction)));
    assert!(matches!(tx.create_table(logs()), Err(Error::ReadOnlyTransaction)));
    assert!(matches!(tx.lock_tables(&["items"], &[]), Err(Error::ReadOnlyTransaction)));
    tx.commit().unwrap();
}

#[test]
fn test_unsupported_isolation_rejected() {
    let manager = manager();
    for level in [IsolationLevel::ReadCommitted, IsolationLevel::ReadUncommitted] {
        let err = manager.begin(options().isolation(level)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedIsolation { .. }));
    }
    assert!(manager.open_transactions().is_empty());
}

#[test]
fn test_table_locks() {
    let manager = manager();
    setup(&manager, vec![items(), logs()]);
    let t1 = manager.begin(options()).unwrap();
    let t2 = manager.begin(options()).unwrap();

    let held = t1.lock_tables(&["items"], &["logs"]).unwrap();
    assert!(t2.lock_tables(&[], &["logs"]).is_ok());
    let err = t2.lock_tables(&[], &["items"]).unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, Error::Lock(LockError::Timeout { .. })));

    drop(held);
    assert!(t2.lock_tables(&["items"], &[]).is_ok());
    assert!(matches!(t2.lock_tables(&["missing"], &[]), Err(Error::TableNotFound { .. })));
}

#[test]
fn test_transaction_state() {
    let manager = manager();
    let tx = manager.begin(options()).unwrap();
    assert_eq!(tx.state(), TransactionState::Active);
    assert_eq!(manager.open_transactions().len(), 1);
    tx.rollback();
    assert!(manager.open_transactions().is_empty());
}
