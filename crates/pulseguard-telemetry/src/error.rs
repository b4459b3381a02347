//! Error types for the telemetry service.

use std::io;

/// Errors that can occur in the ingestion and aggregation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A report was rejected before aggregation.
    #[error("invalid error report: {0}")]
    InvalidReport(String),

    /// A supplied project id was not a well-formed UUID.
    #[error("invalid project id: {0}")]
    InvalidProjectId(String),

    /// Metrics recorder installation failed.
    #[error("metrics recorder error: {0}")]
    Metrics(String),
}
