//! Delivery of telemetry payloads to the ingestion service.

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::SdkConfig;
use crate::events::{CustomEvent, ErrorEvent, PageView, ReplayBatch};

/// Errors surfaced by a transport.
///
/// These never reach the host application: every capture path catches and
/// logs them. They exist so the batcher can distinguish a failed flush (and
/// requeue) from a successful one.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Transport-level failure (connection, timeout, serialisation).
    #[error("delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The ingestion service answered with a non-success status.
    #[error("ingestion service returned status {status}")]
    Status {
        /// HTTP status code returned.
        status: u16,
    },
}

/// Abstraction over the delivery channel.
///
/// The production implementation is [`HttpTransport`]; tests substitute a
/// recording implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a single error event.
    async fn send_error(&self, event: &ErrorEvent) -> Result<(), TransportError>;

    /// Deliver a custom telemetry event.
    async fn send_custom_event(&self, event: &CustomEvent) -> Result<(), TransportError>;

    /// Deliver a batch of session-replay events.
    async fn send_replay_batch(&self, batch: &ReplayBatch) -> Result<(), TransportError>;

    /// Deliver a page-view beacon.
    async fn send_page_view(&self, view: &PageView) -> Result<(), TransportError>;
}

/// HTTP transport posting JSON to the PulseGuard ingestion endpoints.
///
/// Project id and environment travel as headers so the server can resolve
/// them out-of-band rather than trusting the payload body alone.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    project_id: Uuid,
    environment: String,
}

impl HttpTransport {
    /// Build a transport from the SDK configuration.
    ///
    /// The caller is expected to have validated the project id already.
    pub fn new(config: &SdkConfig, project_id: Uuid) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            project_id,
            environment: config.environment.clone(),
        })
    }

    async fn post<T: serde::Serialize + Sync>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<(), TransportError> {
        let url = format!("{}{path}", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-project-id", self.project_id.to_string())
            .header("x-environment", &self.environment)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_error(&self, event: &ErrorEvent) -> Result<(), TransportError> {
        self.post("/api/telemetry/error", event).await
    }

    async fn send_custom_event(&self, event: &CustomEvent) -> Result<(), TransportError> {
        self.post("/api/telemetry/event", event).await
    }

    async fn send_replay_batch(&self, batch: &ReplayBatch) -> Result<(), TransportError> {
        self.post("/api/telemetry/session-replay", batch).await
    }

    async fn send_page_view(&self, view: &PageView) -> Result<(), TransportError> {
        self.post("/api/telemetry/pageview", view).await
    }
}
