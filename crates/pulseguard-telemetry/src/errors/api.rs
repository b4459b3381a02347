//! HTTP API for error tracking.
//!
//! Provides REST endpoints for listing, viewing, and managing aggregated
//! error groups.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregation::{ErrorAggregator, ErrorList};
use super::types::{ErrorDetail, ErrorFilter, ErrorGroup, ErrorStats, ErrorStatus, TrendBucket};

/// Error tracking API state.
#[derive(Clone)]
pub struct ErrorApiState {
    /// Aggregator backing the endpoints.
    pub aggregator: Arc<ErrorAggregator>,
}

impl ErrorApiState {
    /// Create a new error API state.
    pub const fn new(aggregator: Arc<ErrorAggregator>) -> Self {
        Self { aggregator }
    }
}

/// Create the error tracking API router.
///
/// # Endpoints
///
/// - `GET /` - List error groups
/// - `GET /stats` - Get error statistics
/// - `GET /trends` - Get daily error trends
/// - `GET /:id` - Get error group details with recent occurrences
/// - `GET /:id/affected-users` - Get distinct affected user ids
/// - `PATCH /:id/status` - Set a group's status
/// - `POST /bulk-status` - Set the status of several groups
pub fn error_router(state: ErrorApiState) -> Router {
    Router::new()
        .route("/", get(list_errors))
        .route("/stats", get(get_stats))
        .route("/trends", get(get_trends))
        .route("/bulk-status", post(bulk_update_status))
        .route("/:id", get(get_error_detail))
        .route("/:id/affected-users", get(get_affected_users))
        .route("/:id/status", patch(update_status))
        .with_state(state)
}

/// Query parameters for listing errors.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListErrorsQuery {
    /// Filter by project id.
    pub project_id: Option<Uuid>,
    /// Filter by deployment environment.
    pub environment: Option<String>,
    /// Filter by status.
    pub status: Option<ErrorStatus>,
    /// Case-insensitive substring search across message, source, and URL.
    pub search: Option<String>,
    /// Filter by the first reporter's user id.
    pub user_id: Option<String>,
    /// Filter by the first reporter's session id.
    pub session_id: Option<String>,
    /// Inclusive lower bound on first occurrence (RFC 3339).
    pub start_date: Option<String>,
    /// Inclusive upper bound on first occurrence (RFC 3339).
    pub end_date: Option<String>,
    /// Page number (1-based).
    pub page: Option<usize>,
    /// Page size (default 20).
    pub limit: Option<usize>,
}

/// Handle GET / - List error groups.
#[tracing::instrument(skip(state, params))]
async fn list_errors(
    State(state): State<ErrorApiState>,
    Query(params): Query<ListErrorsQuery>,
) -> Result<Json<ErrorList>, ErrorApiError> {
    let filter = build_filter(params)?;
    Ok(Json(state.aggregator.get_errors(&filter).await))
}

/// Handle GET /:id - Get error group details.
#[tracing::instrument(skip(state))]
async fn get_error_detail(
    State(state): State<ErrorApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ErrorDetail>, ErrorApiError> {
    state
        .aggregator
        .get_error_by_id(id)
        .await
        .map(Json)
        .ok_or(ErrorApiError::NotFound)
}

/// Response for affected-user queries.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedUsersResponse {
    /// Distinct non-null user ids across the group's occurrences.
    pub users: Vec<String>,
    /// Number of distinct users.
    pub total: usize,
}

/// Handle GET /:id/affected-users.
#[tracing::instrument(skip(state))]
async fn get_affected_users(
    State(state): State<ErrorApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AffectedUsersResponse>, ErrorApiError> {
    let users = state
        .aggregator
        .get_affected_users(id)
        .await
        .ok_or(ErrorApiError::NotFound)?;
    let total = users.len();
    Ok(Json(AffectedUsersResponse { users, total }))
}

/// Request body for a single status transition.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    /// Target status.
    pub status: ErrorStatus,
}

/// Handle PATCH /:id/status.
#[tracing::instrument(skip(state, body))]
async fn update_status(
    State(state): State<ErrorApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<ErrorGroup>, ErrorApiError> {
    state
        .aggregator
        .update_status(id, body.status)
        .await
        .map(Json)
        .ok_or(ErrorApiError::NotFound)
}

/// Request body for a bulk status transition.
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkStatusRequest {
    /// Group ids to update.
    pub ids: Vec<Uuid>,
    /// Target status.
    pub status: ErrorStatus,
}

/// Response for a bulk status transition.
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkStatusResponse {
    /// How many groups existed and were updated.
    pub updated: u64,
}

/// Handle POST /bulk-status.
#[tracing::instrument(skip(state, body), fields(requested = body.ids.len()))]
async fn bulk_update_status(
    State(state): State<ErrorApiState>,
    Json(body): Json<BulkStatusRequest>,
) -> Json<BulkStatusResponse> {
    let updated = state
        .aggregator
        .bulk_update_status(&body.ids, body.status)
        .await;
    Json(BulkStatusResponse { updated })
}

/// Query parameters for statistics.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    /// Scope to a project.
    pub project_id: Option<Uuid>,
    /// Inclusive lower bound on first occurrence (RFC 3339).
    pub start_date: Option<String>,
    /// Inclusive upper bound on first occurrence (RFC 3339).
    pub end_date: Option<String>,
}

/// Handle GET /stats.
#[tracing::instrument(skip(state, params))]
async fn get_stats(
    State(state): State<ErrorApiState>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<ErrorStats>, ErrorApiError> {
    let start = params.start_date.as_deref().map(parse_datetime).transpose()?;
    let end = params.end_date.as_deref().map(parse_datetime).transpose()?;
    Ok(Json(
        state
            .aggregator
            .get_error_stats(params.project_id, start, end)
            .await,
    ))
}

/// Query parameters for trends.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendsQuery {
    /// Scope to a project.
    pub project_id: Option<Uuid>,
    /// Trailing window in days (default 7).
    pub days: Option<i64>,
}

/// Handle GET /trends.
#[tracing::instrument(skip(state, params))]
async fn get_trends(
    State(state): State<ErrorApiState>,
    Query(params): Query<TrendsQuery>,
) -> Json<Vec<TrendBucket>> {
    Json(
        state
            .aggregator
            .get_error_trends(params.project_id, params.days)
            .await,
    )
}

fn build_filter(params: ListErrorsQuery) -> Result<ErrorFilter, ErrorApiError> {
    let mut filter = ErrorFilter {
        project_id: params.project_id,
        environment: params.environment,
        status: params.status,
        search: params.search,
        user_id: params.user_id,
        session_id: params.session_id,
        page: params.page,
        limit: params.limit,
        ..ErrorFilter::default()
    };

    if let Some(ref s) = params.start_date {
        filter.start_date = Some(parse_datetime(s)?);
    }
    if let Some(ref e) = params.end_date {
        filter.end_date = Some(parse_datetime(e)?);
    }

    Ok(filter)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ErrorApiError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ErrorApiError::InvalidRequest(format!("invalid datetime: {e}")))
}

/// Error type for the error tracking API.
#[derive(Debug)]
pub enum ErrorApiError {
    /// Invalid request parameters.
    InvalidRequest(String),
    /// Requested resource not found.
    NotFound,
}

impl IntoResponse for ErrorApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound => (StatusCode::NOT_FOUND, "error group not found".to_owned()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
