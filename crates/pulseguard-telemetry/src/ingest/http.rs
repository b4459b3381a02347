//! axum HTTP telemetry receivers.
//!
//! Implements the client-facing ingestion endpoints: error reports, custom
//! events, session-replay batches, and page views. Project id and
//! environment arrive as headers (out-of-band context, preferred over the
//! payload body); each accepted error report is enriched with a header
//! snapshot and the server receipt time before aggregation.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::errors::{ErrorAggregator, ErrorReport};
use crate::TelemetryError;

/// Header carrying the reporting project's id.
pub const PROJECT_ID_HEADER: &str = "x-project-id";

/// Header carrying the reporting deployment's environment.
pub const ENVIRONMENT_HEADER: &str = "x-environment";

/// Shared state for ingestion handlers.
#[derive(Clone)]
pub struct IngestState {
    /// Aggregator receiving accepted error reports.
    pub aggregator: Arc<ErrorAggregator>,
    /// Environment assigned to reports without an environment header.
    pub default_environment: String,
}

/// Create the ingestion router with the default body size limit.
pub fn ingest_router(state: IngestState) -> Router {
    ingest_router_with_limit(state, DEFAULT_MAX_BODY_BYTES)
}

/// Create the ingestion router with a custom body size limit.
pub fn ingest_router_with_limit(state: IngestState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/telemetry/error", post(handle_error_report))
        .route("/api/telemetry/event", post(handle_custom_event))
        .route("/api/telemetry/session-replay", post(handle_session_replay))
        .route("/api/telemetry/pageview", post(handle_page_view))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Handle GET /health - ingestion health check
#[tracing::instrument]
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// An incoming error report, as posted by the client SDK.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEventPayload {
    /// Error message.
    pub message: String,
    /// Source location.
    #[serde(default)]
    pub source: Option<String>,
    /// Line number.
    #[serde(default)]
    pub line: Option<u32>,
    /// Column number.
    #[serde(default)]
    pub column: Option<u32>,
    /// Stack trace.
    #[serde(default)]
    pub stack: Option<String>,
    /// Error type name.
    #[serde(default)]
    pub error_type: Option<String>,
    /// Component context.
    #[serde(default)]
    pub component_stack: Option<String>,
    /// Client timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// Session id.
    pub session_id: String,
    /// User id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Project id. The `x-project-id` header takes precedence.
    #[serde(default)]
    pub project_id: Option<Uuid>,
    /// Page URL.
    #[serde(default)]
    pub url: Option<String>,
    /// User agent of the reporting runtime.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Distributed-trace correlation ids.
    #[serde(default)]
    pub trace_context: Option<Value>,
}

/// Acknowledgment for an accepted error report.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAck {
    /// Always true for an accepted report.
    pub success: bool,
    /// Id of the created or incremented error group.
    pub error_id: Uuid,
}

/// Acknowledgment for fire-and-forget event endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventAck {
    /// Always true for an accepted event.
    pub success: bool,
}

/// Handle POST /api/telemetry/error
#[tracing::instrument(skip(state, headers, payload), fields(session_id = %payload.session_id))]
async fn handle_error_report(
    State(state): State<IngestState>,
    headers: HeaderMap,
    Json(payload): Json<ErrorEventPayload>,
) -> Result<Json<ErrorAck>, IngestError> {
    let project_id = resolve_project_id(&headers, payload.project_id)?;
    let environment = resolve_environment(&headers, &state.default_environment);

    if payload.message.trim().is_empty() {
        return Err(TelemetryError::InvalidReport("empty message".to_owned()).into());
    }

    let received_at = Utc::now();
    let metadata = serde_json::json!({
        "headers": header_snapshot(&headers),
        "receivedAt": received_at.to_rfc3339(),
        "clientTimestamp": payload.timestamp,
        "traceContext": payload.trace_context,
    });

    let error_type = payload
        .error_type
        .clone()
        .unwrap_or_else(|| "unknown".to_owned());
    let source = payload.source.clone().unwrap_or_else(|| "unknown".to_owned());
    let user_id = payload
        .user_id
        .clone()
        .unwrap_or_else(|| "anonymous".to_owned());

    let report = ErrorReport {
        message: payload.message,
        source: payload.source,
        line: payload.line,
        column: payload.column,
        stack: payload.stack,
        error_type: payload.error_type,
        component_stack: payload.component_stack,
        url: payload.url,
        user_agent: payload.user_agent,
        session_id: payload.session_id,
        user_id: payload.user_id,
        project_id,
        environment,
        metadata,
    };

    let outcome = state.aggregator.track_error_at(report, received_at).await;

    // Counts error events, not distinct groups: incremented whether the
    // report created a group or incremented an existing one.
    counter!(
        "app.errors.total",
        "errorType" => error_type,
        "source" => source,
        "userId" => user_id
    )
    .increment(1);

    Ok(Json(ErrorAck {
        success: true,
        error_id: outcome.group.id,
    }))
}

/// A custom (non-error) telemetry event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEventPayload {
    /// Event name.
    pub event_name: String,
    /// Arbitrary event payload.
    #[serde(default)]
    pub event_data: Value,
    /// Client timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// Session id.
    pub session_id: String,
    /// User id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Project id.
    #[serde(default)]
    pub project_id: Option<Uuid>,
    /// Page URL.
    #[serde(default)]
    pub url: Option<String>,
    /// User agent.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Handle POST /api/telemetry/event
#[tracing::instrument(skip(state, headers, payload), fields(event_name = %payload.event_name))]
async fn handle_custom_event(
    State(state): State<IngestState>,
    headers: HeaderMap,
    Json(payload): Json<CustomEventPayload>,
) -> Json<EventAck> {
    let environment = resolve_environment(&headers, &state.default_environment);
    tracing::info!(
        event_name = %payload.event_name,
        session_id = %payload.session_id,
        environment = %environment,
        "Custom event received"
    );
    counter!("app.custom_events.total", "eventName" => payload.event_name).increment(1);
    Json(EventAck { success: true })
}

/// A batch of session-replay events.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayBatchPayload {
    /// Opaque replay events in chronological order.
    pub events: Vec<Value>,
    /// Session metadata for the batch.
    pub metadata: ReplayMetadataPayload,
}

/// Session metadata attached to a replay batch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayMetadataPayload {
    /// User agent of the monitored runtime.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Page URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Batch assembly timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// Session id.
    pub session_id: String,
}

/// Handle POST /api/telemetry/session-replay
#[tracing::instrument(
    skip(payload),
    fields(session_id = %payload.metadata.session_id, events = payload.events.len())
)]
async fn handle_session_replay(Json(payload): Json<ReplayBatchPayload>) -> Json<EventAck> {
    tracing::debug!(
        session_id = %payload.metadata.session_id,
        events = payload.events.len(),
        "Replay batch received"
    );
    counter!("app.replay_events.total").increment(payload.events.len() as u64);
    Json(EventAck { success: true })
}

/// A page-view beacon.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViewPayload {
    /// Page path or identifier.
    pub page: String,
    /// Client timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// User id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Referrer, when known.
    #[serde(default)]
    pub referrer: Option<String>,
    /// User agent.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Handle POST /api/telemetry/pageview
#[tracing::instrument(skip(headers, payload), fields(page = %payload.page))]
async fn handle_page_view(
    headers: HeaderMap,
    Json(payload): Json<PageViewPayload>,
) -> Json<EventAck> {
    let project_id = header_value(&headers, PROJECT_ID_HEADER);
    tracing::info!(
        page = %payload.page,
        project_id = project_id.as_deref().unwrap_or("unknown"),
        user_id = payload.user_id.as_deref().unwrap_or("anonymous"),
        "Page view received"
    );
    counter!("app.pageviews.total", "page" => payload.page).increment(1);
    Json(EventAck { success: true })
}

/// Resolve the project id: header first, payload body as fallback.
fn resolve_project_id(
    headers: &HeaderMap,
    body_project_id: Option<Uuid>,
) -> Result<Uuid, TelemetryError> {
    if let Some(raw) = header_value(headers, PROJECT_ID_HEADER) {
        return raw
            .parse()
            .map_err(|_| TelemetryError::InvalidProjectId(raw));
    }
    body_project_id.ok_or_else(|| TelemetryError::InvalidProjectId("missing".to_owned()))
}

/// Resolve the environment: header first, configured default otherwise.
fn resolve_environment(headers: &HeaderMap, default_environment: &str) -> String {
    header_value(headers, ENVIRONMENT_HEADER)
        .unwrap_or_else(|| default_environment.to_owned())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Snapshot of request headers kept on the occurrence metadata.
fn header_snapshot(headers: &HeaderMap) -> Value {
    let map: serde_json::Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), Value::from(value)))
        })
        .collect();
    Value::Object(map)
}

/// Error type for the ingestion boundary.
///
/// Aggregation internals are never leaked to the client: every failure is
/// logged server-side with full context and answered with a generic body.
#[derive(Debug)]
pub struct IngestError(TelemetryError);

impl From<TelemetryError> for IngestError {
    fn from(err: TelemetryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Error report ingestion failed");
        let body = serde_json::json!({
            "success": false,
            "message": "Failed to process error report"
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
