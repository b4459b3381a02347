//! Configuration types for the telemetry service.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::TelemetryError;

// ============================================================================
// Default configuration constants
// ============================================================================

/// Default ingestion/API port.
pub const DEFAULT_HTTP_PORT: u16 = 8480;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9480;

/// Default environment assigned to reports that carry none.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Default maximum request body size (1 MiB).
///
/// Error reports and replay batches are small; anything larger is a
/// misbehaving client and receives a 413.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default number of leading stack frames mixed into the fingerprint.
///
/// Zero groups purely on message/source/type.
pub const DEFAULT_FINGERPRINT_STACK_FRAMES: usize = 0;

/// Default retention sweep interval in seconds (6 hours).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Default occurrence retention in days.
pub const DEFAULT_OCCURRENCE_RETENTION_DAYS: i64 = 30;

/// Telemetry service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Ingestion configuration.
    pub ingest: IngestConfig,
    /// Aggregation configuration.
    pub aggregation: AggregationConfig,
    /// Retention configuration.
    pub retention: RetentionConfig,
}

impl TelemetryConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order (later sources override earlier):
    /// 1. Default values
    /// 2. `pulseguard.toml` in current directory
    /// 3. Environment variables prefixed with `PULSEGUARD_`
    pub fn load() -> Result<Self, TelemetryError> {
        Figment::new()
            .merge(Toml::file("pulseguard.toml"))
            .merge(Env::prefixed("PULSEGUARD_").split("_"))
            .extract()
            .map_err(|e| TelemetryError::Config(e.to_string()))
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &str) -> Result<Self, TelemetryError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PULSEGUARD_").split("_"))
            .extract()
            .map_err(|e| TelemetryError::Config(e.to_string()))
    }
}

/// Server address configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Ingestion and management API address (default: 0.0.0.0:8480).
    pub http_addr: SocketAddr,
    /// Prometheus metrics address (default: 0.0.0.0:9480).
    pub metrics_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_METRICS_PORT)),
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Environment assigned to reports without an `x-environment` header.
    pub default_environment: String,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_environment: DEFAULT_ENVIRONMENT.to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Aggregation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Number of leading stack frames mixed into the fingerprint.
    ///
    /// Zero groups purely on message/source/type, maximising recall. Raising
    /// it trades recall for precision when distinct faults share a generic
    /// message.
    pub fingerprint_stack_frames: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            fingerprint_stack_frames: DEFAULT_FINGERPRINT_STACK_FRAMES,
        }
    }
}

/// Occurrence retention configuration.
///
/// The sweep prunes occurrence rows only; group aggregates (`count`,
/// `last_seen`) survive pruning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Interval between retention sweeps in seconds.
    pub sweep_interval_secs: u64,
    /// Days of occurrence history to keep.
    pub days_to_keep: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            days_to_keep: DEFAULT_OCCURRENCE_RETENTION_DAYS,
        }
    }
}
