//! SDK configuration.

use std::time::Duration;

use uuid::Uuid;

/// Default time-to-live for the duplicate-error suppression window.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(10);

/// Default number of replay events that triggers a batch flush.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default flush interval, measured from the first event of a batch.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5_000);

/// Default sampling interval for high-frequency replay events.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Default timeout applied to every delivery request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default initial delay between failed-flush retries.
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default cap on the failed-flush retry delay.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Configuration for the PulseGuard client SDK.
///
/// Only `endpoint` and `project_id` are required; everything else has a
/// sensible default. The project id must be a well-formed UUID: when it is
/// not, [`Telemetry::init`](crate::Telemetry::init) refuses to start and
/// hands back an inert handle instead of failing the host application.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Base URL of the ingestion service (e.g. `https://ingest.example.com`).
    pub endpoint: String,
    /// Project identifier, validated as a UUID at initialisation.
    pub project_id: String,
    /// Deployment environment reported with every event.
    pub environment: String,
    /// User id attached to captured events, when the host knows one.
    pub user_id: Option<String>,
    /// Application URL reported on events.
    pub app_url: String,
    /// User agent string reported on events.
    pub user_agent: String,
    /// Duplicate-error suppression window.
    pub dedup_ttl: Duration,
    /// Replay batch size threshold.
    pub batch_size: usize,
    /// Replay flush interval.
    pub flush_interval: Duration,
    /// Sampling interval for pointer-move and scroll events.
    pub sample_interval: Duration,
    /// Timeout for delivery requests.
    pub request_timeout: Duration,
    /// Initial delay between failed-flush retries.
    pub retry_initial_delay: Duration,
    /// Cap on the failed-flush retry delay.
    pub retry_max_delay: Duration,
}

impl SdkConfig {
    /// Create a configuration with defaults for everything but the endpoint
    /// and project id.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            environment: "production".to_owned(),
            user_id: None,
            app_url: String::new(),
            user_agent: concat!("pulseguard-sdk/", env!("CARGO_PKG_VERSION")).to_owned(),
            dedup_ttl: DEFAULT_DEDUP_TTL,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }

    /// Set the deployment environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the user id attached to captured events.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the application URL reported on events.
    #[must_use]
    pub fn with_app_url(mut self, app_url: impl Into<String>) -> Self {
        self.app_url = app_url.into();
        self
    }

    /// Set the user agent reported on events.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the replay batch size threshold.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the replay flush interval.
    #[must_use]
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Parse the configured project id, returning `None` when it is not a
    /// well-formed UUID.
    #[must_use]
    pub fn parsed_project_id(&self) -> Option<Uuid> {
        Uuid::parse_str(self.project_id.trim()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let config = SdkConfig::new("http://localhost:4000", Uuid::nil().to_string());
        assert_eq!(config.environment, "production");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert_eq!(config.dedup_ttl, DEFAULT_DEDUP_TTL);
    }

    #[test]
    fn valid_project_id_parses() {
        let config = SdkConfig::new("http://localhost:4000", "550e8400-e29b-41d4-a716-446655440000");
        assert!(config.parsed_project_id().is_some());
    }

    #[test]
    fn invalid_project_id_rejected() {
        let config = SdkConfig::new("http://localhost:4000", "not-a-uuid");
        assert!(config.parsed_project_id().is_none());
    }

    #[test]
    fn builder_overrides() {
        let config = SdkConfig::new("http://localhost:4000", "x")
            .with_environment("staging")
            .with_user_id("user-7")
            .with_batch_size(10);
        assert_eq!(config.environment, "staging");
        assert_eq!(config.user_id.as_deref(), Some("user-7"));
        assert_eq!(config.batch_size, 10);
    }
}
