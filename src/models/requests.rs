//! Request DTOs for the weather API
//!
//! Defines the query parameters accepted by the weather endpoint and how
//! they map onto a coordinator request mode.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

use crate::cache::{CacheKey, Units};
use crate::coordinator::RequestMode;
use crate::error::Result as CacheResult;

/// Query parameters for `GET /weather/:location`
///
/// # Fields
/// - `mode`: `unconditional`, `conditional` or `forced`
/// - `watermark`: RFC 3339 timestamp or Unix seconds of the caller's copy
/// - `units`: `metric` (default) or `imperial`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherQuery {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub watermark: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
}

impl WeatherQuery {
    /// Builds the cache key for `location` in the requested unit system.
    pub fn cache_key(&self, location: &str) -> CacheResult<CacheKey> {
        let units = match self.units.as_deref() {
            Some(raw) => Units::parse(raw)?,
            None => Units::default(),
        };
        CacheKey::with_units(location, units)
    }

    /// Resolves the request mode.
    ///
    /// The query watermark wins over `if_modified_since`. A watermark without
    /// an explicit mode implies a conditional read. Returns an error message
    /// if validation fails.
    pub fn request_mode(
        &self,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<RequestMode, String> {
        let watermark = match self.watermark.as_deref() {
            Some(raw) => Some(parse_watermark(raw)?),
            None => if_modified_since,
        };

        match self.mode.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None if watermark.is_some() => Ok(RequestMode::Conditional { watermark }),
            None | Some("unconditional") => Ok(RequestMode::Unconditional),
            Some("conditional") => Ok(RequestMode::Conditional { watermark }),
            Some("forced") | Some("force") => Ok(RequestMode::Forced),
            Some(other) => Err(format!(
                "Unknown mode '{}', expected unconditional, conditional or forced",
                other
            )),
        }
    }
}

/// Parses an RFC 3339 timestamp or a Unix timestamp in seconds.
pub fn parse_watermark(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| format!("Invalid watermark '{}'", raw))
}

/// Parses an `If-Modified-Since` HTTP date.
///
/// HTTP dates have one-second resolution, so the watermark is moved to the
/// last instant of the named second: any version fetched within that second
/// counts as already seen.
pub fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc) + Duration::nanoseconds(999_999_999))
}
