//! REST handlers for compute triggers, snapshot reads, and reports.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use margin_core::types::DailySnapshotSet;
use margin_core::MarginError;
use margin_engine::{MarginPipeline, RangeOutcome};
use margin_reports::{DailyBrief, DailyBriefBuilder, WeeklyReport, WeeklyReportBuilder};
use margin_store::snapshots::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Longest accepted recompute range, in days.
const MAX_RANGE_DAYS: i64 = 92;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MarginPipeline>,
    pub daily_briefs: Arc<DailyBriefBuilder>,
    pub weekly_reports: Arc<WeeklyReportBuilder>,
    pub node_id: String,
    pub start_time: Instant,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: &str) -> ApiError {
    metrics::counter!("api.validation_errors").increment(1);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: message.to_string(),
        }),
    )
}

fn internal(e: &MarginError) -> ApiError {
    error!(error = %e, "Request failed");
    metrics::counter!("api.errors").increment(1);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal_error".to_string(),
            message: "Internal processing error".to_string(),
        }),
    )
}

fn not_found(message: String) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not_found".to_string(),
            message,
        }),
    )
}

/// Validate a path date at the API boundary.
fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    raw.parse::<NaiveDate>().map_err(|_| {
        warn!(date = raw, "Date parse failed");
        bad_request("date must be formatted YYYY-MM-DD")
    })
}

/// POST /v1/compute/{date} — compute and store one business day.
pub async fn compute_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DailySnapshotSet>, ApiError> {
    let date = parse_date(&date)?;
    match state.pipeline.compute_for_date(date).await {
        Ok(set) => Ok(Json(set)),
        Err(e) => Err(internal(&e)),
    }
}

#[derive(Deserialize)]
pub struct ComputeRangeRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Serialize)]
pub struct ComputeRangeResponse {
    pub computed: Vec<NaiveDate>,
    pub failed: Vec<FailedDate>,
}

#[derive(Serialize)]
pub struct FailedDate {
    pub date: NaiveDate,
    pub error: String,
}

impl From<RangeOutcome> for ComputeRangeResponse {
    fn from(outcome: RangeOutcome) -> Self {
        Self {
            computed: outcome.computed,
            failed: outcome
                .failed
                .into_iter()
                .map(|(date, error)| FailedDate { date, error })
                .collect(),
        }
    }
}

/// POST /v1/compute — recompute a bounded date range.
pub async fn compute_range(
    State(state): State<AppState>,
    Json(request): Json<ComputeRangeRequest>,
) -> Result<Json<ComputeRangeResponse>, ApiError> {
    if request.start > request.end {
        return Err(bad_request("'start' must not be after 'end'"));
    }
    if (request.end - request.start).num_days() >= MAX_RANGE_DAYS {
        return Err(bad_request("range exceeds the maximum of 92 days"));
    }

    match state.pipeline.compute_for_range(request.start, request.end).await {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => Err(internal(&e)),
    }
}

/// GET /v1/snapshots/{date} — the stored snapshot set for one day.
pub async fn read_snapshot(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DailySnapshotSet>, ApiError> {
    let date = parse_date(&date)?;
    match state.pipeline.store().read_day(date).await {
        Ok(Some(set)) => Ok(Json(set)),
        Ok(None) => Err(not_found(format!("no snapshot stored for {date}"))),
        Err(e) => Err(internal(&e)),
    }
}

/// GET /v1/reports/daily/{date} — the daily brief.
pub async fn daily_report(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DailyBrief>, ApiError> {
    let date = parse_date(&date)?;
    match state.daily_briefs.build(date).await {
        Ok(brief) => Ok(Json(brief)),
        Err(MarginError::Report(msg)) => Err(not_found(msg)),
        Err(e) => Err(internal(&e)),
    }
}

/// GET /v1/reports/weekly/{date} — the weekly report for the week holding
/// the given date.
pub async fn weekly_report(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<WeeklyReport>, ApiError> {
    let date = parse_date(&date)?;
    match state.weekly_reports.build(date).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => Err(internal(&e)),
    }
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe for Kubernetes.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("2025-06-01").is_ok());
        assert!(parse_date("06/01/2025").is_err());
        assert!(parse_date("2025-13-01").is_err());
        assert!(parse_date("").is_err());
    }
}
