//! Per-key mutual exclusion.
//!
//! Entries are created on first use and removed once nothing holds or awaits
//! them, so the table only ever contains the keys that are currently active.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct LockEntry {
    mutex: Arc<Mutex<()>>,
    /// Holders plus waiters.
    refs: usize,
}

type LockTable = DashMap<String, LockEntry>;

/// A set of independent async mutexes addressed by string key.
///
/// Cloning is cheap and clones share the same table.
#[derive(Clone, Default)]
pub struct KeyedLock {
    entries: Arc<LockTable>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the lock for `key` is free and take it.
    pub async fn acquire(&self, key: &str) -> KeyedLockGuard {
        let (mutex, lease) = self.lease(key);
        let guard = mutex.lock_owned().await;
        KeyedLockGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Take the lock for `key` only if nobody holds it right now.
    pub fn try_acquire(&self, key: &str) -> Option<KeyedLockGuard> {
        let (mutex, lease) = self.lease(key);
        mutex.try_lock_owned().ok().map(|guard| KeyedLockGuard {
            _guard: guard,
            _lease: lease,
        })
    }

    /// Wait at most `timeout` for the lock. `None` means it was still held.
    pub async fn acquire_timeout(&self, key: &str, timeout: Duration) -> Option<KeyedLockGuard> {
        tokio::time::timeout(timeout, self.acquire(key)).await.ok()
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.entries.len()
    }

    /// Register interest in `key`. The returned lease must outlive any guard
    /// obtained from the mutex.
    fn lease(&self, key: &str) -> (Arc<Mutex<()>>, Lease) {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| LockEntry {
                mutex: Arc::new(Mutex::new(())),
                refs: 0,
            });
        entry.refs += 1;
        let mutex = entry.mutex.clone();
        drop(entry);

        (
            mutex,
            Lease {
                entries: self.entries.clone(),
                key: key.to_string(),
            },
        )
    }
}

struct Lease {
    entries: Arc<LockTable>,
    key: String,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.entries.entry(std::mem::take(&mut self.key)) {
            entry.get_mut().refs -= 1;
            if entry.get().refs == 0 {
                entry.remove();
            }
        }
    }
}

/// Held lock for one key. Dropping it releases the lock.
pub struct KeyedLockGuard {
    // Field order matters: the mutex guard is released before the lease
    // decrements the reference count.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease,
}
