use std::time::Duration;

use ahash::RandomState;
use moka::future::Cache;
use tokio::time::Instant;

use crate::{index::Nearest, lookup::LookupKey};

#[derive(Clone)]
struct CacheEntry {
    nearest: Nearest,
    created_at: Instant,
}

/// Results of previous lookups, keyed by query coordinates
///
/// Entries older than the ttl read as a miss. moka evicts them in the
/// background and also caps the number of entries.
pub struct LookupCache {
    entries: Cache<LookupKey, CacheEntry, RandomState>,
    ttl: Duration,
}

impl LookupCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            // we use ahash because it's faster for big keys
            .build_with_hasher(RandomState::default());

        Self { entries, ttl }
    }

    pub async fn get(&self, key: &LookupKey) -> Option<Nearest> {
        let entry = self.entries.get(key).await?;

        if entry.created_at.elapsed() < self.ttl {
            Some(entry.nearest)
        } else {
            None
        }
    }

    /// stores the result, replacing whatever was there
    pub async fn put(&self, key: LookupKey, nearest: Nearest) {
        let entry = CacheEntry {
            nearest,
            created_at: Instant::now(),
        };
        self.entries.insert(key, entry).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }
}
