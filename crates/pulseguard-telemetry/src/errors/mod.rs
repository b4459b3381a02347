//! Error tracking module for pulseguard-telemetry.
//!
//! Turns a stream of raw client error reports into deduplicated, queryable
//! error groups:
//!
//! - **Fingerprinting**: group repeat occurrences by `message|source|type`,
//!   deliberately ignoring line/column drift from redeploys
//! - **Aggregation**: one group per dedup key with an occurrence count,
//!   first/last seen, lifecycle status, and derived tags
//! - **Storage**: an in-process store whose keyed upsert runs under a single
//!   write lock, so concurrent first-occurrences cannot create duplicates
//! - **API**: REST endpoints for listing, detail, statistics, trends, and
//!   status management
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌────────────┐
//! │ ErrorFingerprint │────>│ ErrorAggregator │────>│ ErrorStore │
//! │  (fingerprint.rs)│     │ (aggregation.rs)│     │ (store.rs) │
//! └──────────────────┘     └─────────────────┘     └────────────┘
//!          │                        │                     │
//!          v                        v                     v
//!    Stable grouping         Upsert + queries       Locked maps +
//!    key per fault           + tag derivation       dedup-key index
//! ```

mod aggregation;
pub mod api;
mod fingerprint;
mod store;
mod tags;
mod types;

// Re-export public API
pub use aggregation::{ErrorAggregator, ErrorList, DEFAULT_TREND_DAYS};
pub use api::{error_router, ErrorApiState};
pub use fingerprint::{
    compute_fingerprint, ErrorFingerprinter, FingerprintConfig, FINGERPRINT_DELIMITER,
};
pub use store::{ErrorStore, UpsertOutcome, DETAIL_OCCURRENCE_LIMIT, TOP_TYPE_LIMIT};
pub use tags::derive_tags;
pub use types::{
    EnvironmentCount, ErrorDetail, ErrorFilter, ErrorGroup, ErrorOccurrence, ErrorReport,
    ErrorStats, ErrorStatus, StatusCount, Tag, TrendBucket, TypeCount, DEFAULT_PAGE_LIMIT,
};
