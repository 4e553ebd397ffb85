//! Lock management for Tessel.
//!
//! Tables can be locked explicitly on top of the optimistic commit protocol.
//! Every lockable resource owns a FIFO `LockingQueue`: a shared lock proceeds
//! once no exclusive lock is queued ahead of it, an exclusive lock proceeds
//! once it reaches the head of the queue. All locks of one `Locker::lock`
//! call are enqueued atomically and acquired in a fixed order, writes before
//! reads, each group sorted by resource id.

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessel_core::{AccessType, LockError};
use tracing::{debug, trace};

/// A resource that can be locked.
pub trait Lockable {
    /// Stable identifier of the resource.
    fn ref_id(&self) -> u64;

    /// Name used in error messages.
    fn lock_name(&self) -> String;
}

/// Lock type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockType {
    /// Shared lock (read).
    Shared,
    /// Exclusive lock (write).
    Exclusive,
}

impl LockType {
    fn access(self) -> AccessType {
        match self {
            LockType::Shared => AccessType::Read,
            LockType::Exclusive => AccessType::Write,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    ticket: u64,
    lock_type: LockType,
}

/// FIFO queue of lock requests for one resource.
#[derive(Debug)]
pub struct LockingQueue {
    name: String,
    entries: Mutex<VecDeque<QueueEntry>>,
    released: Condvar,
}

impl LockingQueue {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: Mutex::new(VecDeque::new()),
            released: Condvar::new(),
        }
    }

    /// Number of queued requests, granted or waiting.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enqueue(&self, ticket: u64, lock_type: LockType) {
        self.entries.lock().push_back(QueueEntry { ticket, lock_type });
    }

    fn can_proceed(entries: &VecDeque<QueueEntry>, ticket: u64, lock_type: LockType) -> bool {
        match lock_type {
            LockType::Exclusive => entries.front().is_some_and(|e| e.ticket == ticket),
            LockType::Shared => entries
                .iter()
                .take_while(|e| e.ticket != ticket)
                .all(|e| e.lock_type == LockType::Shared),
        }
    }

    fn acquire(
        &self,
        ticket: u64,
        lock_type: LockType,
        timeout: Option<Duration>,
    ) -> Result<(), LockError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut entries = self.entries.lock();
        while !Self::can_proceed(&entries, ticket, lock_type) {
            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut entries, deadline).timed_out()
                        && !Self::can_proceed(&entries, ticket, lock_type)
                    {
                        Self::dequeue(&mut entries, ticket);
                        drop(entries);
                        self.released.notify_all();
                        debug!(resource = %self.name, ?lock_type, "lock wait timed out");
                        return Err(LockError::Timeout {
                            resource: self.name.clone(),
                            access: lock_type.access(),
                            timeout: timeout.unwrap_or_default(),
                        });
                    }
                }
                None => self.released.wait(&mut entries),
            }
        }
        trace!(resource = %self.name, ?lock_type, ticket, "lock acquired");
        Ok(())
    }

    fn release(&self, ticket: u64) {
        let mut entries = self.entries.lock();
        Self::dequeue(&mut entries, ticket);
        drop(entries);
        self.released.notify_all();
    }

    fn dequeue(entries: &mut VecDeque<QueueEntry>, ticket: u64) {
        if let Some(pos) = entries.iter().position(|e| e.ticket == ticket) {
            entries.remove(pos);
        }
    }
}

/// A lock held (or being acquired) on one resource.
#[derive(Debug)]
pub struct Lock {
    resource: u64,
    queue: Arc<LockingQueue>,
    ticket: u64,
    lock_type: LockType,
    checked: AtomicBool,
}

impl Lock {
    #[inline]
    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    #[inline]
    pub fn resource(&self) -> u64 {
        self.resource
    }

    /// Validates that `access` is allowed under this lock.
    ///
    /// Only the first successful call is validated; later calls return `Ok`.
    pub fn check_access(&self, access: AccessType) -> Result<(), LockError> {
        if self.checked.load(Ordering::Acquire) {
            return Ok(());
        }
        if access == AccessType::Write && self.lock_type == LockType::Shared {
            return Err(LockError::MalformedAccess {
                resource: self.queue.name.clone(),
                requested: access,
                held: self.lock_type.access(),
            });
        }
        self.checked.store(true, Ordering::Release);
        Ok(())
    }
}

/// Every lock taken by one `Locker::lock` call. Released on drop.
#[derive(Debug)]
pub struct LockHandle {
    locks: Vec<Lock>,
    released: bool,
}

impl LockHandle {
    pub fn locks(&self) -> &[Lock] {
        &self.locks
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the lock held on `resource`, if any.
    pub fn get(&self, resource: &dyn Lockable) -> Option<&Lock> {
        let id = resource.ref_id();
        self.locks.iter().find(|l| l.resource == id)
    }

    /// Validates `access` against the lock held on `resource`.
    pub fn check_access(&self, resource: &dyn Lockable, access: AccessType) -> Result<(), LockError> {
        match self.get(resource) {
            Some(lock) if !self.released => lock.check_access(access),
            _ => Err(LockError::NotLocked {
                resource: resource.lock_name(),
            }),
        }
    }

    /// Releases every lock in reverse acquisition order. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for lock in self.locks.iter().rev() {
            lock.queue.release(lock.ticket);
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Registry of locking queues, one per resource.
#[derive(Debug, Default)]
pub struct Locker {
    queues: Mutex<HashMap<u64, Arc<LockingQueue>>>,
    tickets: AtomicU64,
}

impl Locker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `writes` exclusively and `reads` shared.
    ///
    /// A resource listed in both is locked exclusively once. Waits up to
    /// `timeout` per resource (forever if `None`); on failure every lock of
    /// this call is released again.
    pub fn lock(
        &self,
        writes: &[&dyn Lockable],
        reads: &[&dyn Lockable],
        timeout: Option<Duration>,
    ) -> Result<LockHandle, LockError> {
        let mut writes: Vec<&dyn Lockable> = writes.to_vec();
        writes.sort_by_key(|r| r.ref_id());
        writes.dedup_by_key(|r| r.ref_id());
        let mut reads: Vec<&dyn Lockable> = reads
            .iter()
            .copied()
            .filter(|r| !writes.iter().any(|w| w.ref_id() == r.ref_id()))
            .collect();
        reads.sort_by_key(|r| r.ref_id());
        reads.dedup_by_key(|r| r.ref_id());

        let requests = writes
            .iter()
            .map(|r| (*r, LockType::Exclusive))
            .chain(reads.iter().map(|r| (*r, LockType::Shared)));

        let mut locks = Vec::new();
        {
            let mut queues = self.queues.lock();
            for (resource, lock_type) in requests {
                let id = resource.ref_id();
                let queue = queues
                    .entry(id)
                    .or_insert_with(|| Arc::new(LockingQueue::new(resource.lock_name())))
                    .clone();
                let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
                queue.enqueue(ticket, lock_type);
                locks.push(Lock {
                    resource: id,
                    queue,
                    ticket,
                    lock_type,
                    checked: AtomicBool::new(false),
                });
            }
        }

        let mut handle = LockHandle {
            locks,
            released: false,
        };
        for lock in &handle.locks {
            if let Err(e) = lock.queue.acquire(lock.ticket, lock.lock_type, timeout) {
                handle.release();
                return Err(e);
            }
        }
        debug!(locks = handle.locks.len(), "locks acquired");
        Ok(handle)
    }

    /// Number of queued requests on `resource`.
    pub fn queue_len(&self, resource: u64) -> usize {
        self.queues.lock().get(&resource).map_or(0, |q| q.len())
    }
}
