//! Upstream Module
//!
//! Contract for retrieving weather data from an external provider.

mod open_meteo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cache::CacheKey;
use crate::error::FetchError;

pub use open_meteo::{OpenMeteoFetcher, DEFAULT_GEOCODING_URL, DEFAULT_WEATHER_URL};

/// A payload freshly produced by the upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
}

/// External weather source.
///
/// Implementations must be idempotent: the coordinator retries on
/// `FetchError::Timeout`. `FetchError::Upstream` is final.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<Fetched, FetchError>;
}
