//! Read outcome returned to collaborators.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheEntry;
use crate::error::ErrorKind;

/// Transport-neutral status of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadStatus {
    FreshData,
    NotModified,
    StaleFallback,
    Error,
}

/// Answer to a single read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadOutcome {
    pub status: ReadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ReadOutcome {
    pub fn fresh(entry: CacheEntry) -> Self {
        Self {
            status: ReadStatus::FreshData,
            payload: Some(entry.payload),
            fetched_at: Some(entry.fetched_at),
            error_kind: None,
        }
    }

    /// No payload; `fetched_at` tells the caller which version it already has.
    pub fn not_modified(fetched_at: DateTime<Utc>) -> Self {
        Self {
            status: ReadStatus::NotModified,
            payload: None,
            fetched_at: Some(fetched_at),
            error_kind: None,
        }
    }

    pub fn stale(entry: CacheEntry) -> Self {
        Self {
            status: ReadStatus::StaleFallback,
            payload: Some(entry.payload),
            fetched_at: Some(entry.fetched_at),
            error_kind: None,
        }
    }

    pub fn error(kind: ErrorKind) -> Self {
        Self {
            status: ReadStatus::Error,
            payload: None,
            fetched_at: None,
            error_kind: Some(kind),
        }
    }

    /// Whether the payload is served past its freshness window.
    pub fn is_stale(&self) -> bool {
        self.status == ReadStatus::StaleFallback
    }
}
