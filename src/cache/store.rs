//! Cache Store Module
//!
//! Store contract plus the in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::{CacheEntry, CacheKey};
use crate::error::Result;

// == Put Outcome ==
/// Result of a store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The entry replaced (or created) the stored record
    Stored,
    /// A record with a newer `fetched_at` was already stored; nothing changed
    Rejected,
}

// == Cache Store Trait ==
/// Key/value store of the last known payload per location.
///
/// Implementations must keep `fetched_at` monotonically non-decreasing per
/// key: a put carrying an older timestamp than the stored record is a no-op.
/// Operations on different keys must not serialize behind one lock.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the stored entry, if any. Freshness is not checked here.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Stores a full replacement record unless a newer one exists.
    async fn put(&self, entry: CacheEntry) -> Result<PutOutcome>;

    /// Removes the entry. Returns whether one existed.
    async fn invalidate(&self, key: &CacheKey) -> Result<bool>;

    /// Removes every entry fetched before `cutoff`. Returns the count removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;
}

/// Whether `incoming` may replace `current`. Equal timestamps overwrite.
pub(crate) fn accepts(current: &CacheEntry, incoming: &CacheEntry) -> bool {
    incoming.fetched_at >= current.fetched_at
}

// == Memory Store ==
/// Sharded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, entry: CacheEntry) -> Result<PutOutcome> {
        // The shard stays locked between the comparison and the write.
        match self.entries.entry(entry.key.clone()) {
            Entry::Occupied(mut occupied) => {
                if accepts(occupied.get(), &entry) {
                    occupied.insert(entry);
                    Ok(PutOutcome::Stored)
                } else {
                    Ok(PutOutcome::Rejected)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(PutOutcome::Stored)
            }
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.fetched_at >= cutoff);
        Ok(before.saturating_sub(self.entries.len()))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}
