//! Cache Key Module
//!
//! Normalizes location strings so equivalent requests share one cache entry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

/// Separates the location from a non-default unit system inside a key.
const UNITS_SEPARATOR: char = '|';

// == Units ==
/// Unit system the upstream payload is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    /// Parses `metric` or `imperial`, case-insensitively.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown units '{}', expected metric or imperial",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

// == Cache Key ==
/// Normalized location identifier.
///
/// Place names are trimmed, lower-cased and have runs of whitespace collapsed.
/// `"lat,lon"` pairs are re-rendered with four decimal places so that
/// `"48.8566, 2.3522"` and `"48.85660,2.35220"` hit the same entry.
///
/// Metric keys are the bare location; other unit systems append
/// `|<units>`, e.g. `paris|imperial`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    // == Normalize ==
    /// Builds a metric key from raw caller input.
    pub fn normalize(raw: &str) -> Result<Self> {
        Self::with_units(raw, Units::Metric)
    }

    /// Builds a key for `raw` expressed in `units`.
    pub fn with_units(raw: &str, units: Units) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CacheError::InvalidRequest(
                "Location cannot be empty".to_string(),
            ));
        }
        if trimmed.contains(UNITS_SEPARATOR) {
            return Err(CacheError::InvalidRequest(format!(
                "Location cannot contain '{}'",
                UNITS_SEPARATOR
            )));
        }

        let location = match parse_coordinates(trimmed) {
            Some((lat, lon)) => format!("{:.4},{:.4}", round_coordinate(lat), round_coordinate(lon)),
            None => trimmed
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        };

        if location.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Location exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        Ok(match units {
            Units::Metric => Self(location),
            other => Self(format!("{}{}{}", location, UNITS_SEPARATOR, other.as_str())),
        })
    }

    /// The normalized location without the unit suffix.
    pub fn location(&self) -> &str {
        self.0
            .split_once(UNITS_SEPARATOR)
            .map_or(self.0.as_str(), |(location, _)| location)
    }

    pub fn units(&self) -> Units {
        match self.0.split_once(UNITS_SEPARATOR) {
            Some((_, "imperial")) => Units::Imperial,
            _ => Units::Metric,
        }
    }

    /// Returns the coordinates if this key is a `"lat,lon"` pair.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        parse_coordinates(self.location())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_coordinates(raw: &str) -> Option<(f64, f64)> {
    let (lat, lon) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;

    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
        Some((lat, lon))
    } else {
        None
    }
}

/// Rounds to the rendered precision; adding zero turns `-0.0` into `0.0`.
fn round_coordinate(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0 + 0.0
}
