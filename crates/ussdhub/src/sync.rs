//! Synchronization primitives for session reconciliation.
//!
//! Concurrent gateway events for the same external id must serialize around
//! one session row while the reconciler decides create-vs-resume. The lock
//! table here provides that per-key exclusion with a bounded wait; keys that
//! time out surface as [`LockContention`] so callers can retry at the
//! transport layer instead of queueing indefinitely.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// Default interval between cleanup runs (1 hour).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Default max idle age before a lock entry is considered stale (2 hours).
pub const DEFAULT_MAX_IDLE_AGE: Duration = Duration::from_secs(7200);

/// Internal storage type for keyed locks: maps key to (lock, last_access_time).
type LockStorage = DashMap<String, (Arc<Mutex<()>>, Instant)>;

/// Bounded-wait acquisition failed; the key is held by another task.
#[derive(Debug, Error)]
#[error("lock on {key:?} still held after {waited_ms}ms")]
pub struct LockContention {
    pub key: String,
    pub waited_ms: u64,
}

/// Exclusive guard over one key. Held for the duration of a row's
/// match-and-patch sequence; dropping it releases the key.
#[derive(Debug)]
pub struct RowGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Per-key async mutex with bounded-wait acquisition and stale entry cleanup.
///
/// Different keys lock concurrently; acquisitions for the same key serialize.
/// Entries accumulate one per key touched (external ids churn constantly on
/// a busy gateway), so last-access times are tracked and stale entries can be
/// swept periodically.
///
/// # Example
///
/// ```ignore
/// let locks = KeyedLocks::new();
///
/// // Serialize work on one external id, waiting at most 5s for the row.
/// let guard = locks.acquire("4879", Duration::from_secs(5)).await?;
/// // ... match-and-patch under the guard ...
/// drop(guard);
/// ```
#[derive(Clone)]
pub struct KeyedLocks {
    locks: Arc<LockStorage>,
}

impl KeyedLocks {
    /// Create a new empty lock table.
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Create a lock table with automatic stale-entry cleanup.
    ///
    /// Spawns a background task with the default intervals (1 hour sweep,
    /// 2 hour max idle age). Requires a running tokio runtime.
    pub fn with_cleanup(name: &'static str) -> Self {
        let locks = Self::new();
        locks.clone().spawn_cleanup_task(name);
        locks
    }

    /// Acquire the lock for `key`, waiting at most `wait`.
    ///
    /// Returns [`LockContention`] when the key is still held after the wait
    /// elapses. The wait bounds queueing, not hold time; a guard, once
    /// returned, is held until dropped.
    pub async fn acquire(&self, key: &str, wait: Duration) -> Result<RowGuard, LockContention> {
        let lock = self.get(key);
        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => Ok(RowGuard { _guard: guard }),
            Err(_) => Err(LockContention {
                key: key.to_string(),
                waited_ms: wait.as_millis() as u64,
            }),
        }
    }

    /// Get or create the raw lock for the given key.
    ///
    /// Updates the last-access timestamp on each call for cleanup tracking.
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let now = Instant::now();
        self.locks
            .entry(key.to_string())
            .and_modify(|(_, last_access)| *last_access = now)
            .or_insert_with(|| (Arc::new(Mutex::new(())), now))
            .0
            .clone()
    }

    /// Remove stale lock entries that haven't been accessed recently.
    ///
    /// Only removes entries where the lock hasn't been accessed within
    /// `max_age` and no one else holds a reference to it. Returns the number
    /// of entries removed.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let stale_keys: Vec<_> = self
            .locks
            .iter()
            .filter(|entry| {
                let (lock, last_access) = entry.value();
                // strong_count == 1 means only the table holds the lock
                Arc::strong_count(lock) == 1 && now.duration_since(*last_access) > max_age
            })
            .map(|entry| entry.key().clone())
            .collect();

        let count = stale_keys.len();
        for key in stale_keys {
            self.locks.remove(&key);
        }
        count
    }

    /// Spawn a background task that periodically cleans up stale entries.
    ///
    /// Uses the default intervals. The task runs until the runtime shuts down.
    pub fn spawn_cleanup_task(self, name: &'static str) {
        self.spawn_cleanup_task_with(DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_IDLE_AGE, name);
    }

    /// Spawn a cleanup task with custom intervals.
    pub fn spawn_cleanup_task_with(
        self,
        interval: Duration,
        max_age: Duration,
        name: &'static str,
    ) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_stale(max_age);
                if removed > 0 {
                    debug!(
                        removed = removed,
                        remaining = self.len(),
                        locks = name,
                        "Cleaned up stale locks"
                    );
                }
            }
        });
    }

    /// Return the number of lock entries currently held.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Return true if there are no lock entries.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}
