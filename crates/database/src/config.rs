//! Database configuration.

use std::time::Duration;
use tessel_core::{Error, Result};
use tessel_storage::{DirtySelectPolicy, IsolationLevel, TransactionOptions};

/// Settings shared by every transaction of a [`Database`](crate::Database).
///
/// The dirty-select policy has no default and must be chosen up front:
///
/// ```rust
/// use std::time::Duration;
/// use tessel_database::{DatabaseConfig, DirtySelectPolicy, IsolationLevel};
///
/// let config = DatabaseConfig::new(DirtySelectPolicy::Error)
///     .default_isolation(IsolationLevel::Snapshot)
///     .lock_timeout(Duration::from_secs(1));
/// assert_eq!(config.transaction_options().isolation, IsolationLevel::Snapshot);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    dirty_select: DirtySelectPolicy,
    default_isolation: IsolationLevel,
    lock_timeout: Option<Duration>,
    read_only: bool,
}

impl DatabaseConfig {
    pub fn new(dirty_select: DirtySelectPolicy) -> Self {
        Self {
            dirty_select,
            default_isolation: IsolationLevel::Serializable,
            lock_timeout: None,
            read_only: false,
        }
    }

    /// Isolation level of transactions started with `Database::begin`.
    pub fn default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.default_isolation = isolation;
        self
    }

    /// Bounds every wait for an explicit table lock. Unset waits forever.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Makes every transaction read-only, including the ones used for
    /// auto-committed DDL.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn dirty_select(&self) -> DirtySelectPolicy {
        self.dirty_select
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.default_isolation
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Options for a transaction started with the defaults.
    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::new(self.dirty_select)
            .isolation(self.default_isolation)
            .read_only(self.read_only)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.default_isolation.is_supported() {
            return Err(Error::UnsupportedIsolation {
                level: self.default_isolation.to_string(),
            });
        }
        if self.lock_timeout == Some(Duration::ZERO) {
            return Err(Error::invalid_operation("lock timeout must be positive"));
        }
        Ok(())
    }
}
