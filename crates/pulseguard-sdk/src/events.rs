//! Wire types for telemetry events.
//!
//! These types are serialised as camelCase JSON and posted to the PulseGuard
//! ingestion endpoints. They are ephemeral on the client: an event lives only
//! for the duration of the delivery attempt (or, for replay events, until the
//! batch containing it is flushed successfully).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Distributed-trace correlation ids attached to an error event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    /// Trace id as a lowercase hex string.
    pub trace_id: String,
    /// Span id as a lowercase hex string.
    pub span_id: String,
    /// W3C trace flags byte.
    pub trace_flags: u8,
}

/// A captured runtime error, normalised for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Error message.
    pub message: String,

    /// Source location (file or module) where the error originated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Line number, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// Column number, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// Captured stack trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Error type name (e.g. "TypeError", "panic").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Component context supplied by manual instrumentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,

    /// Client timestamp in epoch milliseconds.
    pub timestamp: i64,

    /// Session id of the monitored application instance.
    pub session_id: String,

    /// User id, when the host application identified one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Project this event belongs to.
    pub project_id: Uuid,

    /// Page or application URL active when the error occurred.
    pub url: String,

    /// User agent of the monitored runtime.
    pub user_agent: String,

    /// Active distributed-trace context, when one existed at capture time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_context: Option<TraceContext>,
}

/// Kind of a session-replay event, used by the noise-reduction policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayEventKind {
    /// DOM or state mutation.
    Mutation,
    /// Pointer movement (rate limited before enqueue).
    PointerMove,
    /// Scroll movement (rate limited before enqueue).
    Scroll,
    /// Input change (collapsed to last value per source within a batch).
    Input,
    /// Discrete user interaction (click, key press).
    Interaction,
    /// Custom tagged event (e.g. an error marker).
    Custom,
}

/// An opaque session-replay event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEvent {
    /// Event kind.
    pub kind: ReplayEventKind,
    /// Opaque event payload.
    pub data: Value,
    /// Client timestamp in epoch milliseconds.
    pub timestamp: i64,
}

impl ReplayEvent {
    /// Create a replay event stamped with the current time.
    #[must_use]
    pub fn new(kind: ReplayEventKind, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Metadata attached to every replay batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayMetadata {
    /// User agent of the monitored runtime.
    pub user_agent: String,
    /// Page or application URL.
    pub url: String,
    /// Batch assembly timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// Session id.
    pub session_id: String,
}

/// A batch of replay events plus session metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayBatch {
    /// Events in chronological order.
    pub events: Vec<ReplayEvent>,
    /// Session metadata.
    pub metadata: ReplayMetadata,
}

/// A non-error custom telemetry event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEvent {
    /// Event name (e.g. "user_interaction").
    pub event_name: String,
    /// Arbitrary event payload.
    pub event_data: Value,
    /// Client timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// Session id.
    pub session_id: String,
    /// User id, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Project this event belongs to.
    pub project_id: Uuid,
    /// Page or application URL.
    pub url: String,
    /// User agent of the monitored runtime.
    pub user_agent: String,
}

/// A page-view beacon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    /// Page path or identifier.
    pub page: String,
    /// Client timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// User id, defaulting to "anonymous".
    pub user_id: String,
    /// Referrer, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// User agent of the monitored runtime.
    pub user_agent: String,
}

/// An error as captured from the host application, before it is turned into
/// an [`ErrorEvent`].
#[derive(Debug, Clone)]
pub struct CapturedError {
    /// Error message.
    pub message: String,
    /// Error type name, when one is known.
    pub type_name: Option<String>,
    /// Stack trace, when one was captured.
    pub stack: Option<String>,
}

impl CapturedError {
    /// Create a captured error from a bare message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            type_name: None,
            stack: None,
        }
    }

    /// Attach a type name.
    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Attach a stack trace.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<&str> for CapturedError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CapturedError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl<E: std::error::Error> From<&E> for CapturedError {
    fn from(error: &E) -> Self {
        let type_name = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("Error")
            .to_owned();
        Self {
            message: error.to_string(),
            type_name: Some(type_name),
            stack: None,
        }
    }
}

/// The reason an asynchronous operation was abandoned.
///
/// Mirrors the two shapes an unhandled rejection can take: a real error, or
/// an arbitrary value that has to be stringified before it can be reported.
#[derive(Debug, Clone)]
pub enum Rejection {
    /// The rejection reason was already an error.
    Error(CapturedError),
    /// The rejection reason was not an error; its textual form is kept.
    Other(String),
}

impl Rejection {
    /// Wrap an arbitrary displayable reason.
    pub fn other(reason: impl std::fmt::Display) -> Self {
        Self::Other(reason.to_string())
    }

    /// Normalise into a [`CapturedError`], wrapping non-error reasons.
    #[must_use]
    pub fn into_captured(self) -> CapturedError {
        match self {
            Self::Error(err) => err,
            Self::Other(reason) => {
                CapturedError::new(reason).with_type("UnhandledRejection")
            }
        }
    }
}

impl From<CapturedError> for Rejection {
    fn from(err: CapturedError) -> Self {
        Self::Error(err)
    }
}

impl From<String> for Rejection {
    fn from(reason: String) -> Self {
        Self::Other(reason)
    }
}

impl From<&str> for Rejection {
    fn from(reason: &str) -> Self {
        Self::Other(reason.to_owned())
    }
}
