//! PulseGuard Telemetry - error ingestion and aggregation service.
//!
//! This crate receives error reports and session telemetry from the
//! PulseGuard client SDK and turns them into queryable state:
//!
//! - Accepts error reports, custom events, replay batches, and page views
//!   over HTTP, with project/environment context carried in headers
//! - Fingerprints each error on `message|source|type` and aggregates repeat
//!   occurrences into a single group with an occurrence count
//! - Serves a management API for listing, detail, statistics, trends, and
//!   status transitions
//! - Prunes old occurrence rows on a background retention sweep
//!
//! ## Architecture
//!
//! ```text
//! SDK HTTP reports → Ingestion → ErrorAggregator → ErrorStore
//!                                                      ↓
//!                                   Management REST API (/errors)
//! ```

pub mod config;
pub mod error;
pub mod errors;
pub mod ingest;
pub mod metrics;
pub mod retention;

pub use config::TelemetryConfig;
pub use error::TelemetryError;
