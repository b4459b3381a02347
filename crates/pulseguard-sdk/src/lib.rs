//! PulseGuard client SDK - error and session telemetry capture.
//!
//! This crate instruments a running application and ships what it observes
//! to a PulseGuard ingestion service:
//!
//! - **Capture**: panic-hook and rejection capture plus manual reporting,
//!   normalised into a canonical error-event shape
//! - **Deduplication**: a time-windowed suppressor that bounds outbound
//!   volume during error storms without losing the first instance
//! - **Correlation**: the active distributed-trace context is attached to
//!   every error report so the server can join errors to traces
//! - **Batching**: session-replay events are buffered and delivered in bulk,
//!   with failed batches requeued ahead of newer events
//!
//! ## Architecture
//!
//! ```text
//! panic hook / rejections ─┐
//! manual reports ──────────┼─> dedup ─> trace context ─> HTTP delivery
//! replay events ─> batcher ┘              (fire-and-forget, never blocks)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pulseguard_sdk::{SdkConfig, Telemetry};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = SdkConfig::new(
//!     "https://ingest.example.com",
//!     "550e8400-e29b-41d4-a716-446655440000",
//! )
//! .with_environment("production")
//! .with_app_url("https://app.example.com");
//!
//! let telemetry = Telemetry::init(config);
//! telemetry.install_panic_hook();
//!
//! // Manual instrumentation
//! telemetry.report_error("checkout failed", Some("CheckoutForm"));
//! telemetry.report_custom_event("signup", serde_json::json!({ "plan": "pro" }));
//! # }
//! ```
//!
//! Initialisation is fail-safe: a malformed project id yields an inert
//! handle whose operations are silent no-ops, so the SDK can never be the
//! reason the host application fails to start.

pub mod batcher;
pub mod capture;
pub mod config;
pub mod context;
pub mod dedup;
pub mod events;
pub mod session;
pub mod transport;

pub use batcher::{BatcherConfig, EventBatcher};
pub use capture::Telemetry;
pub use config::SdkConfig;
pub use context::active_trace_context;
pub use dedup::DeduplicationCache;
pub use events::{
    CapturedError, CustomEvent, ErrorEvent, PageView, Rejection, ReplayBatch, ReplayEvent,
    ReplayEventKind, ReplayMetadata, TraceContext,
};
pub use session::generate_session_id;
pub use transport::{HttpTransport, Transport, TransportError};
