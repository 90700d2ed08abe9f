//! Per-key mutual exclusion.
//!
//! Concurrent lookups for the same key queue up on a single async mutex, so
//! only one of them computes at a time. The table of mutexes only holds keys
//! that someone is currently holding or waiting on: every handle is a
//! [`Lease`], and the entry is removed when the last lease drops.

use std::{future::Future, hash::Hash, sync::Arc, time::Duration};

use ahash::HashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DedupError {
    #[error("timed out after {0:?} waiting for another lookup of the same location")]
    WaitTimeout(Duration),
}

pub struct KeyedLocks<K: Hash + Eq> {
    table: LockTable<K>,
    wait_timeout: Option<Duration>,
}

impl<K: Hash + Eq + Clone> KeyedLocks<K> {
    /// `wait_timeout` bounds how long a caller queues behind the current holder
    pub fn new(wait_timeout: Option<Duration>) -> Self {
        Self {
            table: Default::default(),
            wait_timeout,
        }
    }

    /// Runs `compute` while holding the lock for `key`
    ///
    /// The lock is released when this returns, whether `compute` succeeded or
    /// not, and also if the returned future is dropped
    pub async fn with_exclusive_access<F, Fut, T, E>(&self, key: K, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DedupError>,
    {
        let _guard = self.acquire(key).await?;
        compute().await
    }

    pub async fn acquire(&self, key: K) -> Result<KeyGuard<K>, DedupError> {
        let lease = self.lease(key);
        let lock = Arc::clone(&lease.lock);

        let guard = match self.wait_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock.lock_owned())
                .await
                .map_err(|_| DedupError::WaitTimeout(timeout))?,
            None => lock.lock_owned().await,
        };

        Ok(KeyGuard {
            _guard: guard,
            _lease: lease,
        })
    }

    /// number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lease(&self, key: K) -> Lease<K> {
        // lookup and insert happen under the same table lock, so everyone
        // asking for a key at the same time gets the same mutex
        let lock = {
            let mut table = self.table.lock();
            Arc::clone(table.entry(key.clone()).or_default())
        };

        Lease {
            key,
            lock,
            table: Arc::clone(&self.table),
        }
    }
}

/// A reference to the mutex for one key
///
/// Dropping the last lease for a key removes it from the table
struct Lease<K: Hash + Eq> {
    key: K,
    lock: Arc<AsyncMutex<()>>,
    table: LockTable<K>,
}

impl<K: Hash + Eq> Drop for Lease<K> {
    fn drop(&mut self) {
        // new leases are only handed out under the table lock, so the count
        // can't grow between the check and the removal
        let mut table = self.table.lock();

        // one reference in the table, one in this lease
        let unused = table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 2);
        if unused {
            table.remove(&self.key);
        }
    }
}

/// Held while computing for a key. Releases the key on drop
pub struct KeyGuard<K: Hash + Eq> {
    // field order matters: the mutex guard has to go before the lease
    _guard: OwnedMutexGuard<()>,
    _lease: Lease<K>,
}
