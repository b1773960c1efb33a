//! REST API endpoints for thermolog-service.
//!
//! Every handler follows the same shape: validate the request, take the store
//! lock for one query, then format the rows. Handlers never write.
//!
//! # Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Malformed
//! timestamps and inverted ranges are client errors (HTTP 400). Storage
//! failures are logged and reported as HTTP 500 without the underlying
//! message. An empty store is not an error: `/api/current` answers
//! `{"error": "no data"}` with HTTP 200 and list endpoints answer `[]`.
//!
//! # Example
//!
//! ```ignore
//! use thermolog_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::error;

use thermolog_core::ListenerStatsSnapshot;
use thermolog_types::{format_timestamp, parse_timestamp};

use crate::state::{AppState, ReadingEvent};

/// Readings returned by `/api/readings` when no range is given.
pub const RECENT_READINGS_LIMIT: usize = 20;

/// How far back `/api/hourly` looks.
pub const HOURLY_LOOKBACK: Duration = Duration::days(30);

/// Message returned for a timestamp that is not `YYYY-MM-DD HH:MM:SS`.
pub const INVALID_DATE_MESSAGE: &str = "Invalid date format. Use YYYY-MM-DD HH:MM:SS";

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/current", get(current))
        .route("/api/readings", get(readings))
        .route("/api/hourly", get(hourly))
        .route("/api/daily", get(daily))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when the database answers, `degraded` otherwise.
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub database: DatabaseHealth,
    pub ingest: ListenerStatsSnapshot,
}

/// Database health information.
#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    /// Whether the database is accessible.
    pub ok: bool,
    /// Number of stored readings, if the count succeeded.
    pub reading_count: Option<u64>,
}

/// Health check endpoint.
///
/// Always answers 200 so load balancers can read the body; a failing
/// database shows up as `status: "degraded"`.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let reading_count = {
        let store = state.store.lock().await;
        match store.count_readings() {
            Ok(count) => Some(count),
            Err(e) => {
                error!("Health check could not count readings: {}", e);
                None
            }
        }
    };
    let ok = reading_count.is_some();

    Json(HealthResponse {
        status: if ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        database: DatabaseHealth { ok, reading_count },
        ingest: state.ingest.snapshot(),
    })
}

/// The most recent reading.
#[derive(Debug, Serialize, PartialEq)]
pub struct CurrentReading {
    /// Value rounded to two decimals.
    pub temperature: f64,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub timestamp: String,
}

/// Body of `/api/current`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum CurrentResponse {
    Reading(CurrentReading),
    NoData { error: &'static str },
}

/// Latest reading, or `{"error": "no data"}` on an empty store.
async fn current(State(state): State<Arc<AppState>>) -> Result<Json<CurrentResponse>, AppError> {
    let latest = state.store.lock().await.latest()?;

    Ok(Json(match latest {
        Some(reading) => CurrentResponse::Reading(CurrentReading {
            temperature: round2(reading.value),
            timestamp: format_timestamp(reading.timestamp),
        }),
        None => CurrentResponse::NoData { error: "no data" },
    }))
}

/// Query parameters for `/api/readings`.
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    /// Inclusive lower bound, `YYYY-MM-DD HH:MM:SS`.
    pub start: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD HH:MM:SS`.
    pub end: Option<String>,
}

/// A validated readings request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingsRequest {
    Range {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    Recent(usize),
}

impl ReadingsQuery {
    /// Check every supplied bound and pick the matching query.
    ///
    /// A range needs both bounds; with either one missing the request falls
    /// back to the most recent readings. An empty value (`?start=`, as a
    /// blank form field sends) counts as missing.
    pub fn validate(&self) -> Result<ReadingsRequest, AppError> {
        let parse = |s: &Option<String>| {
            s.as_deref()
                .filter(|s| !s.is_empty())
                .map(parse_timestamp)
                .transpose()
                .map_err(|_| AppError::Validation(INVALID_DATE_MESSAGE.to_string()))
        };
        let start = parse(&self.start)?;
        let end = parse(&self.end)?;

        match (start, end) {
            (Some(start), Some(end)) => Ok(ReadingsRequest::Range { start, end }),
            _ => Ok(ReadingsRequest::Recent(RECENT_READINGS_LIMIT)),
        }
    }
}

/// Readings in a time range, or the most recent ones, oldest first.
///
/// # Errors
///
/// - [`AppError::Validation`] if a bound is malformed
/// - [`AppError::Store`] with an invalid range if `start > end`
async fn readings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<Vec<ReadingEvent>>, AppError> {
    let request = params.validate()?;

    let rows = {
        let store = state.store.lock().await;
        match request {
            ReadingsRequest::Range { start, end } => store.query_range(start, end)?,
            ReadingsRequest::Recent(n) => store.query_recent(n)?,
        }
    };

    Ok(Json(rows.iter().map(ReadingEvent::from).collect()))
}

/// One row of `/api/hourly`.
#[derive(Debug, Serialize, PartialEq)]
pub struct HourlyRow {
    /// Bucket start, `YYYY-MM-DD HH:00:00`.
    pub hour: String,
    /// Mean rounded to two decimals.
    pub avg: f64,
}

/// Hourly means for the last 30 days, newest first.
async fn hourly(State(state): State<Arc<AppState>>) -> Result<Json<Vec<HourlyRow>>, AppError> {
    let rows = state.store.lock().await.query_hourly(HOURLY_LOOKBACK)?;

    Ok(Json(
        rows.into_iter()
            .map(|row| HourlyRow {
                hour: format_timestamp(row.hour_start),
                avg: round2(row.avg_value),
            })
            .collect(),
    ))
}

/// One row of `/api/daily`.
#[derive(Debug, Serialize, PartialEq)]
pub struct DailyRow {
    /// Bucket start, `YYYY-MM-DD 00:00:00`.
    pub date: String,
    /// Mean rounded to two decimals.
    pub avg: f64,
}

/// Every daily mean, newest first.
async fn daily(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DailyRow>>, AppError> {
    let rows = state.store.lock().await.query_daily()?;

    Ok(Json(
        rows.into_iter()
            .map(|row| DailyRow {
                date: format_timestamp(row.day_start),
                avg: round2(row.avg_value),
            })
            .collect(),
    ))
}

/// API error type.
#[derive(Debug)]
pub enum AppError {
    /// Malformed client input.
    Validation(String),
    /// A store query failed.
    Store(thermolog_store::Error),
}

impl From<thermolog_store::Error> for AppError {
    fn from(e: thermolog_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e @ thermolog_store::Error::InvalidRange { .. }) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Store(e) => {
                error!("Query failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage unavailable".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
