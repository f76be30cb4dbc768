//! Open-Meteo fetcher.
//!
//! Resolves place names through the geocoding API, then reads current
//! conditions from the forecast API. Coordinate keys skip geocoding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{Fetched, UpstreamFetcher};
use crate::cache::{CacheKey, Units};
use crate::clock::Clock;
use crate::error::FetchError;

pub const DEFAULT_WEATHER_URL: &str = "https://api.open-meteo.com/v1";
pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,\
precipitation,weather_code,cloud_cover,pressure_msl,wind_speed_10m,wind_direction_10m,is_day";

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Clone, Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
}

/// Open-Meteo API client.
pub struct OpenMeteoFetcher {
    client: reqwest::Client,
    weather_url: String,
    geocoding_url: String,
    clock: Arc<dyn Clock>,
}

impl OpenMeteoFetcher {
    /// Builds a fetcher with its own HTTP client timeout.
    ///
    /// The coordinator applies a separate per-attempt bound on top of this.
    pub fn new(
        weather_url: impl Into<String>,
        geocoding_url: impl Into<String>,
        client_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("weather_cache/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(4)
            .timeout(client_timeout)
            .build()
            .map_err(|e| FetchError::Upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            weather_url: weather_url.into().trim_end_matches('/').to_string(),
            geocoding_url: geocoding_url.into().trim_end_matches('/').to_string(),
            clock,
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Upstream(format!("{url} returned {status}")));
        }

        resp.json::<Value>().await.map_err(map_reqwest_error)
    }

    async fn resolve(&self, key: &CacheKey) -> Result<Place, FetchError> {
        if let Some((latitude, longitude)) = key.coordinates() {
            return Ok(Place {
                name: key.location().to_string(),
                latitude,
                longitude,
                country: None,
                timezone: None,
            });
        }

        let url = format!("{}/search", self.geocoding_url);
        let body = self
            .get_json(
                &url,
                &[
                    ("name", key.location().to_string()),
                    ("count", "1".to_string()),
                    ("language", "en".to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        let parsed: GeocodingResponse = serde_json::from_value(body)
            .map_err(|e| FetchError::Upstream(format!("malformed geocoding response: {e}")))?;

        parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| {
                FetchError::Upstream(format!("location '{}' not found", key.location()))
            })
    }
}

#[async_trait]
impl UpstreamFetcher for OpenMeteoFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<Fetched, FetchError> {
        let place = self.resolve(key).await?;
        debug!(
            "Fetching current weather for {} lat={} lon={}",
            key, place.latitude, place.longitude
        );

        let units = key.units();
        let (temperature_unit, wind_speed_unit, precipitation_unit) = unit_params(units);

        let url = format!("{}/forecast", self.weather_url);
        let body = self
            .get_json(
                &url,
                &[
                    ("latitude", place.latitude.to_string()),
                    ("longitude", place.longitude.to_string()),
                    ("current", CURRENT_FIELDS.to_string()),
                    ("timezone", "auto".to_string()),
                    ("temperature_unit", temperature_unit.to_string()),
                    ("wind_speed_unit", wind_speed_unit.to_string()),
                    ("precipitation_unit", precipitation_unit.to_string()),
                ],
            )
            .await?;

        let current = body
            .get("current")
            .cloned()
            .ok_or_else(|| FetchError::Upstream("forecast response missing 'current'".to_string()))?;

        let payload = json!({
            "location": {
                "name": place.name,
                "country": place.country,
                "latitude": place.latitude,
                "longitude": place.longitude,
                "timezone": place.timezone.or_else(|| {
                    body.get("timezone").and_then(Value::as_str).map(str::to_string)
                }),
            },
            "current": current,
            "unit_system": units.as_str(),
            "units": body.get("current_units").cloned().unwrap_or(Value::Null),
        });

        Ok(Fetched {
            payload,
            fetched_at: self.clock.now(),
        })
    }
}

/// Open-Meteo `(temperature_unit, wind_speed_unit, precipitation_unit)`.
fn unit_params(units: Units) -> (&'static str, &'static str, &'static str) {
    match units {
        Units::Metric => ("celsius", "kmh", "mm"),
        Units::Imperial => ("fahrenheit", "mph", "inch"),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Upstream(err.to_string())
    }
}
