//! Read decision table.

use chrono::{DateTime, Utc};

use crate::cache::CacheEntry;

// == Request Mode ==
/// How a read treats the cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Best available data, fetching if stale or absent
    Unconditional,
    /// Not-modified answer when the fresh entry is no newer than `watermark`
    Conditional { watermark: Option<DateTime<Utc>> },
    /// Always fetch, still rate limited and coalesced
    Forced,
}

impl RequestMode {
    pub fn conditional(watermark: DateTime<Utc>) -> Self {
        RequestMode::Conditional {
            watermark: Some(watermark),
        }
    }

    /// Folds a conditional request without watermark into an unconditional one.
    pub fn normalized(self) -> Self {
        match self {
            RequestMode::Conditional { watermark: None } => RequestMode::Unconditional,
            other => other,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match self {
            RequestMode::Conditional { watermark } => *watermark,
            _ => None,
        }
    }
}

// == Decision ==
/// Action chosen for a read before any upstream work happens.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Entry is fresh; serve its payload
    ServeCached(CacheEntry),
    /// Entry is fresh and not newer than the caller's watermark
    NotModified(CacheEntry),
    /// Fetch and store; carries the prior entry for stale fallback
    Fetch(Option<CacheEntry>),
}

/// Applies the decision table to the entry currently stored for a key.
///
/// Stale entries never produce `NotModified`. The watermark comparison is a
/// plain `fetched_at <= watermark`, so a watermark ahead of the server clock
/// still yields `NotModified` for any fresh entry.
pub fn decide(mode: RequestMode, cached: Option<CacheEntry>, now: DateTime<Utc>) -> Decision {
    let cached = match cached {
        Some(entry) if entry.is_fresh(now) => entry,
        stale_or_absent => return Decision::Fetch(stale_or_absent),
    };

    match mode.normalized() {
        RequestMode::Forced => Decision::Fetch(Some(cached)),
        RequestMode::Unconditional => Decision::ServeCached(cached),
        RequestMode::Conditional {
            watermark: Some(watermark),
        } if cached.fetched_at <= watermark => Decision::NotModified(cached),
        RequestMode::Conditional { .. } => Decision::ServeCached(cached),
    }
}
