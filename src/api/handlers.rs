//! API Handlers
//!
//! HTTP request handlers for each weather cache endpoint.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::coordinator::{ReadStatus, RefreshCoordinator};
use crate::error::{CacheError, ErrorKind, Result};
use crate::models::{
    parse_http_date, ErrorResponse, HealthResponse, InvalidateResponse, StatsResponse,
    WeatherQuery, WeatherResponse,
};

/// Header naming the caller for per-caller rate limiting.
pub const CALLER_HEADER: &str = "x-caller-id";

const ANONYMOUS_CALLER: &str = "anonymous";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: RefreshCoordinator,
}

impl AppState {
    /// Creates a new AppState around the given coordinator.
    pub fn new(coordinator: RefreshCoordinator) -> Self {
        Self { coordinator }
    }
}

/// Handler for GET /weather/:location
///
/// Reads weather through the refresh coordinator. `304 Not Modified` when the
/// caller's watermark is current, `200` with payload otherwise, or an error
/// status derived from the failure kind when no data is available.
pub async fn weather_handler(
    State(state): State<AppState>,
    Path(location): Path<String>,
    Query(query): Query<WeatherQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let key = query.cache_key(&location)?;

    let if_modified_since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    let mode = query
        .request_mode(if_modified_since)
        .map_err(CacheError::InvalidRequest)?;

    let caller = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_CALLER);

    let outcome = state.coordinator.read(&key, mode, caller).await;
    debug!("Read {} as {:?}: {:?}", key, mode, outcome.status);

    let last_modified = outcome.fetched_at.and_then(http_date);
    let status = outcome.status;

    let mut response = match status {
        ReadStatus::NotModified => StatusCode::NOT_MODIFIED.into_response(),
        ReadStatus::Error => {
            let kind = outcome.error_kind.unwrap_or(ErrorKind::UpstreamError);
            (kind.status_code(), Json(ErrorResponse::from_kind(kind))).into_response()
        }
        ReadStatus::FreshData | ReadStatus::StaleFallback => {
            let body = WeatherResponse::from_outcome(&key, outcome).ok_or_else(|| {
                CacheError::Internal("read returned data status without payload".to_string())
            })?;
            Json(body).into_response()
        }
    };

    if let Some(value) = last_modified {
        response.headers_mut().insert(header::LAST_MODIFIED, value);
    }
    Ok(response)
}

/// Handler for DELETE /weather/:location
///
/// Drops the cached entry so the next read fetches. `units` selects which
/// unit system's entry is dropped.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(location): Path<String>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<InvalidateResponse>> {
    let key = query.cache_key(&location)?;
    let removed = state.coordinator.invalidate(&key).await?;

    Ok(Json(InvalidateResponse::new(key.as_str(), removed)))
}

/// Handler for GET /stats
///
/// Returns coordinator counters and store size.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let coordinator = &state.coordinator;

    Json(StatsResponse::new(
        coordinator.stats(),
        coordinator.entry_count().await,
        coordinator.in_flight(),
    ))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Formats a timestamp as an HTTP date for `Last-Modified`.
fn http_date(at: DateTime<Utc>) -> Option<HeaderValue> {
    HeaderValue::from_str(&at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()).ok()
}
