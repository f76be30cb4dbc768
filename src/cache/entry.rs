//! Cache Entry Module
//!
//! Defines the stored weather record and its derived freshness state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheKey;

const MAX_TTL_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

// == Cache Entry ==
/// Last known weather payload for one location.
///
/// This is also the persisted record layout of the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized location key
    pub key: CacheKey,
    /// Provider payload, opaque to the cache
    pub payload: Value,
    /// When the upstream produced this payload
    pub fetched_at: DateTime<Utc>,
    /// Freshness lifetime in seconds
    pub ttl_seconds: u64,
}

// == Freshness State ==
/// Derived freshness of a key at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessState {
    Fresh,
    Stale,
    Absent,
}

impl FreshnessState {
    /// Computes the state of an optional entry at `now`.
    pub fn of(entry: Option<&CacheEntry>, now: DateTime<Utc>) -> Self {
        match entry {
            Some(entry) if entry.is_fresh(now) => FreshnessState::Fresh,
            Some(_) => FreshnessState::Stale,
            None => FreshnessState::Absent,
        }
    }
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(key: CacheKey, payload: Value, fetched_at: DateTime<Utc>, ttl_seconds: u64) -> Self {
        Self {
            key,
            payload,
            fetched_at,
            ttl_seconds,
        }
    }

    // == Is Fresh ==
    /// Checks whether the entry is still within its TTL at `now`.
    ///
    /// Boundary condition: the entry turns stale once the full TTL has
    /// elapsed. An entry stamped in the future (clock skew) has a negative
    /// age and counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.ttl()
    }

    /// Time elapsed since the upstream produced the payload.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// TTL as a duration, capped at roughly a century.
    pub fn ttl(&self) -> Duration {
        let secs = i64::try_from(self.ttl_seconds).unwrap_or(MAX_TTL_SECONDS);
        Duration::seconds(secs.min(MAX_TTL_SECONDS))
    }

    /// Seconds of freshness left, zero once stale.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> u64 {
        let remaining = self.ttl() - self.age(now);
        u64::try_from(remaining.num_seconds()).unwrap_or(0)
    }
}
