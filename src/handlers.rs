// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the failed access counter service.
//!
//! Login endpoints and other guarded services report each attempt here and
//! read back whether the caller is still allowed in.

use crate::config::Config;
use crate::counter::FailedAccessCounter;
use crate::error::Error;
use crate::metrics::Metrics;
use crate::model::{AccessResult, FailedAccess, Page, PageRequest, RecordId, SortOrder};
use crate::reaper::{StatsSnapshot, SweepReport};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state.
pub struct AppState {
    pub counter: Arc<FailedAccessCounter>,
    /// `None` when metrics are disabled
    pub metrics: Option<Metrics>,
    pub config: Config,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Handler error carrying its status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_REQUEST",
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(msg) => Self::bad_request(msg),
            Error::Storage(err) => {
                error!(error = %err, "Store failure while serving request");
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: "STORAGE_UNAVAILABLE",
                    message: err.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// A reported access attempt.
#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub remote_host: String,
    /// Attempt time in unix milliseconds; absent or non-positive means now
    #[serde(default)]
    pub time_millis: Option<i64>,
}

/// Key of a record in query parameters.
#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub remote_host: String,
}

/// Paging query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct EntriesQuery {
    /// Search terms
    #[serde(default)]
    pub q: String,
    /// Zero-based page number
    #[serde(default)]
    pub p: usize,
    /// Page size; 0 or absent for all
    #[serde(default)]
    pub s: usize,
    /// Sort, e.g. `resourceId,asc|remoteHost,desc`
    #[serde(default)]
    pub c: String,
}

impl EntriesQuery {
    fn page_request(self) -> Result<PageRequest, ApiError> {
        let sort = SortOrder::parse_list(&self.c).map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(PageRequest {
            page_number: self.p,
            page_size: self.s,
            query: self.q,
            sort,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub store: String,
    pub running: bool,
    pub counter_threshold: u32,
    pub record_ttl_ms: u64,
    pub reap_interval_ms: u64,
    pub records: u64,
    #[serde(flatten)]
    pub sweeps: StatsSnapshot,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/access", get(check_access))
        .route("/access/failed", post(access_failed))
        .route("/access/succeeded", post(access_succeeded))
        .route("/entries", get(find_entries).delete(remove_entry))
        .route("/entries/obsolete", post(remove_obsolete))
        .route("/entries/:id", get(get_entry))
        .route("/stats", get(stats));

    if state.metrics.is_some() {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "failed-access-counter",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn record_decision(state: &AppState, operation: &str, result: &AccessResult) {
    if let Some(metrics) = &state.metrics {
        metrics.record_decision(operation, result);
    }
}

/// Report a failed attempt.
pub async fn access_failed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccessRequest>,
) -> ApiResult<AccessResult> {
    let time = req.time_millis.and_then(DateTime::from_timestamp_millis);
    let result = state
        .counter
        .record_failure(&req.resource_id, &req.remote_host, time)
        .await?;
    record_decision(&state, "failed", &result);
    Ok(Json(result))
}

/// Report a successful attempt.
pub async fn access_succeeded(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccessRequest>,
) -> ApiResult<AccessResult> {
    let time = req.time_millis.and_then(DateTime::from_timestamp_millis);
    let result = state
        .counter
        .record_success(&req.resource_id, &req.remote_host, time)
        .await?;
    record_decision(&state, "succeeded", &result);
    Ok(Json(result))
}

/// Ask whether a caller is currently allowed.
pub async fn check_access(
    State(state): State<Arc<AppState>>,
    Query(key): Query<KeyQuery>,
) -> ApiResult<AccessResult> {
    let result = state
        .counter
        .check_access(&key.resource_id, &key.remote_host)
        .await?;
    record_decision(&state, "check", &result);
    Ok(Json(result))
}

pub async fn remove_entry(
    State(state): State<Arc<AppState>>,
    Query(key): Query<KeyQuery>,
) -> ApiResult<RemoveResponse> {
    let removed = state
        .counter
        .remove_record(&key.resource_id, &key.remote_host)
        .await?;
    Ok(Json(RemoveResponse { removed }))
}

pub async fn find_entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Page<FailedAccess>> {
    let request = query.page_request()?;
    Ok(Json(state.counter.find_entries(&request).await?))
}

pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<FailedAccess> {
    let id = RecordId::new(id);
    state
        .counter
        .get_entry_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No record with id {id}")))
}

/// Run a sweep now instead of waiting for the reaper.
pub async fn remove_obsolete(State(state): State<Arc<AppState>>) -> Response {
    match state.counter.remove_obsolete().await {
        Ok(Some(report)) => {
            info!(removed = report.removed, failed = report.failed, "Manual sweep finished");
            Json::<SweepReport>(report).into_response()
        }
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "A sweep is already in progress".to_string(),
                code: "SWEEP_IN_PROGRESS",
            }),
        )
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<StatsResponse> {
    let counter = &state.counter;
    Ok(Json(StatsResponse {
        store: counter.store_name().to_string(),
        running: counter.is_running().await,
        counter_threshold: counter.counter_threshold(),
        record_ttl_ms: counter.config().record_ttl_ms,
        reap_interval_ms: counter.config().reap_interval_ms,
        records: counter.count_entries("").await?,
        sweeps: counter.stats(),
    }))
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.counter.count_entries("").await {
        Ok(records) => metrics.observe_counter(&state.counter, records),
        Err(e) => error!(error = %e, "Failed to count records for metrics"),
    }
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
