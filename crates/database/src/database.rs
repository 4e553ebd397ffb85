//! Database - main entry point.
//!
//! A `Database` owns one `TransactionManager` and applies its
//! `DatabaseConfig` to every transaction it starts. Schema changes can run
//! inside a transaction or auto-committed through the helpers here.

use crate::config::DatabaseConfig;
use std::sync::Arc;
use tessel_core::schema::{Constraints, Table};
use tessel_core::{Result, TableId};
use tessel_storage::{TableCommitInfo, Transaction, TransactionManager, TransactionOptions};
use tracing::{debug, info};

/// An embedded in-memory database.
#[derive(Debug)]
pub struct Database {
    manager: Arc<TransactionManager>,
    config: DatabaseConfig,
}

impl Database {
    /// Opens an empty database.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        info!(
            isolation = %config.isolation(),
            dirty_select = ?config.dirty_select(),
            read_only = config.is_read_only(),
            "database opened"
        );
        Ok(Self {
            manager: Arc::new(TransactionManager::new(config.timeout())),
            config,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Begins a transaction with the configured defaults.
    pub fn begin(&self) -> Result<Transaction> {
        self.manager.begin(self.config.transaction_options())
    }

    /// Begins a transaction with explicit options. A read-only database
    /// keeps the transaction read-only whatever the options say.
    pub fn begin_with(&self, options: TransactionOptions) -> Result<Transaction> {
        let read_only = options.read_only || self.config.is_read_only();
        self.manager.begin(options.read_only(read_only))
    }

    pub fn begin_read_only(&self) -> Result<Transaction> {
        self.manager
            .begin(self.config.transaction_options().read_only(true))
    }

    /// Runs `f` in a new transaction and commits it. If `f` fails the
    /// transaction is rolled back and the error returned.
    pub fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut tx = self.begin()?;
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Like `execute`, but runs `f` again in a fresh transaction when the
    /// attempt fails with a retryable error (a conflict or lock timeout),
    /// up to `max_attempts` attempts in total.
    pub fn execute_with_retry<T, F>(&self, max_attempts: usize, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match self.execute(&mut f) {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    debug!(attempt, error = %e, "retrying transaction");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Creates a table in its own transaction.
    pub fn create_table(&self, schema: Table) -> Result<TableId> {
        self.execute(|tx| tx.create_table(schema))
    }

    /// Drops a table in its own transaction.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.execute(|tx| tx.drop_table(name))
    }

    /// Replaces a table's constraints in its own transaction. The commit
    /// fails if existing rows violate the new constraints.
    pub fn alter_constraints(&self, name: &str, constraints: Constraints) -> Result<()> {
        self.execute(|tx| tx.alter_constraints(name, constraints))
    }

    /// Names of the committed tables.
    pub fn table_names(&self) -> Vec<String> {
        self.manager.catalog().table_names()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.manager.catalog().has_table(name)
    }

    /// Registers a callback fired by every commit that changes `table`.
    /// An error returned by the callback aborts that commit.
    ///
    /// The callback runs inside the commit's critical section and must not
    /// call back into this database (`begin`, `execute`, `collect_garbage`).
    pub fn on_commit<F>(&self, table: impl Into<String>, callback: F)
    where
        F: Fn(&TableCommitInfo) -> Result<()> + Send + Sync + 'static,
    {
        self.manager.on_commit(table, callback);
    }

    /// Reclaims rows and history no open transaction can observe.
    pub fn collect_garbage(&self) -> usize {
        self.manager.collect_garbage()
    }

    pub fn open_transaction_count(&self) -> usize {
        self.manager.open_transactions().len()
    }
}
