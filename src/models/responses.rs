//! Response DTOs for the weather API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheKey, Units};
use crate::coordinator::{ReadOutcome, ReadStatus, StatsSnapshot};
use crate::error::ErrorKind;

/// Response body for a successful weather read (`GET /weather/:location`)
#[derive(Debug, Clone, Serialize)]
pub struct WeatherResponse {
    /// Normalized location
    pub location: String,
    /// Unit system of the payload
    pub units: Units,
    /// `FRESH_DATA` or `STALE_FALLBACK`
    pub status: ReadStatus,
    /// True when served past its freshness window
    pub stale: bool,
    /// When the upstream produced the payload
    pub fetched_at: Option<DateTime<Utc>>,
    /// Provider payload
    pub payload: Value,
}

impl WeatherResponse {
    /// Builds the body from a read that carried data.
    ///
    /// Returns `None` for outcomes without payload.
    pub fn from_outcome(key: &CacheKey, outcome: ReadOutcome) -> Option<Self> {
        let stale = outcome.is_stale();
        let payload = outcome.payload?;
        Some(Self {
            location: key.location().to_string(),
            units: key.units(),
            status: outcome.status,
            stale,
            fetched_at: outcome.fetched_at,
            payload,
        })
    }
}

/// Response body for `DELETE /weather/:location`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Success message
    pub message: String,
    /// The normalized key
    pub location: String,
    /// Whether an entry was actually removed
    pub removed: bool,
}

impl InvalidateResponse {
    pub fn new(location: impl Into<String>, removed: bool) -> Self {
        let location = location.into();
        Self {
            message: if removed {
                format!("Location '{}' invalidated", location)
            } else {
                format!("Location '{}' was not cached", location)
            },
            location,
            removed,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    /// Current number of stored entries, absent if the store is unreadable
    pub total_entries: Option<usize>,
    /// Upstream fetches currently running
    pub in_flight: usize,
}

impl StatsResponse {
    pub fn new(counters: StatsSnapshot, total_entries: Option<usize>, in_flight: usize) -> Self {
        Self {
            counters,
            total_entries,
            in_flight,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for reads that ended without data
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
    /// Failure taxonomy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        let error = match kind {
            ErrorKind::Timeout => "Weather provider timed out",
            ErrorKind::UpstreamError => "Weather provider could not serve this location",
            ErrorKind::RateLimited => "Too many refreshes for this location, try again later",
            ErrorKind::CacheUnavailable => "Weather cache is unavailable",
        };
        Self {
            error: error.to_string(),
            kind: Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paris() -> CacheKey {
        CacheKey::normalize("paris").unwrap()
    }

    #[test]
    fn test_weather_response_from_fresh_outcome() {
        let outcome = ReadOutcome {
            status: ReadStatus::FreshData,
            payload: Some(json!({"t": 20})),
            fetched_at: Some(Utc::now()),
            error_kind: None,
        };
        let resp = WeatherResponse::from_outcome(&paris(), outcome).unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["location"], "paris");
        assert_eq!(json["units"], "metric");
        assert_eq!(json["status"], "FRESH_DATA");
        assert_eq!(json["stale"], false);
        assert_eq!(json["payload"]["t"], 20);
    }

    #[test]
    fn test_weather_response_marks_stale() {
        let outcome = ReadOutcome {
            status: ReadStatus::StaleFallback,
            payload: Some(json!({"t": 20})),
            fetched_at: Some(Utc::now()),
            error_kind: None,
        };
        let resp = WeatherResponse::from_outcome(&paris(), outcome).unwrap();
        assert!(resp.stale);
    }

    #[test]
    fn test_weather_response_reports_units() {
        let key = CacheKey::with_units("Paris", Units::Imperial).unwrap();
        let entry = crate::cache::CacheEntry::new(key.clone(), json!({"t": 68}), Utc::now(), 300);
        let outcome = ReadOutcome::fresh(entry);
        let resp = WeatherResponse::from_outcome(&key, outcome).unwrap();
        assert_eq!(resp.location, "paris");
        assert_eq!(resp.units, Units::Imperial);
    }

    #[test]
    fn test_weather_response_requires_payload() {
        let outcome = ReadOutcome::not_modified(Utc::now());
        assert!(WeatherResponse::from_outcome(&paris(), outcome).is_none());
    }

    #[test]
    fn test_invalidate_response_messages() {
        assert!(InvalidateResponse::new("paris", true).message.contains("invalidated"));
        assert!(InvalidateResponse::new("paris", false).message.contains("not cached"));
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let resp = StatsResponse::new(StatsSnapshot::default(), Some(3), 1);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["hits"], 0);
        assert_eq!(json["total_entries"], 3);
        assert_eq!(json["in_flight"], 1);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_from_kind() {
        let json = serde_json::to_value(ErrorResponse::from_kind(ErrorKind::RateLimited)).unwrap();
        assert_eq!(json["kind"], "rate_limited");
        assert!(json["error"].as_str().unwrap().contains("Too many"));
    }
}
