//! Error aggregation over the group store.
//!
//! The aggregator is the write and query surface of error tracking: it
//! fingerprints incoming reports, derives their tags, upserts them into the
//! store, and answers the list/detail/statistics queries the management API
//! exposes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fingerprint::ErrorFingerprinter;
use super::store::{ErrorStore, UpsertOutcome};
use super::tags::derive_tags;
use super::types::{
    ErrorDetail, ErrorFilter, ErrorGroup, ErrorReport, ErrorStats, ErrorStatus, TrendBucket,
};

/// Default trailing window for trend queries, in days.
pub const DEFAULT_TREND_DAYS: i64 = 7;

/// A page of error groups plus the full matched-set size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorList {
    /// The requested page, most recently active first.
    pub errors: Vec<ErrorGroup>,
    /// Matched groups before pagination.
    pub total: usize,
}

/// Fingerprints, deduplicates, and aggregates error reports.
pub struct ErrorAggregator {
    store: Arc<ErrorStore>,
    fingerprinter: ErrorFingerprinter,
}

impl ErrorAggregator {
    /// Create an aggregator with the default fingerprint policy.
    #[must_use]
    pub fn new(store: Arc<ErrorStore>) -> Self {
        Self {
            store,
            fingerprinter: ErrorFingerprinter::new(),
        }
    }

    /// Create an aggregator with a custom fingerprint policy.
    #[must_use]
    pub const fn with_fingerprinter(
        store: Arc<ErrorStore>,
        fingerprinter: ErrorFingerprinter,
    ) -> Self {
        Self {
            store,
            fingerprinter,
        }
    }

    /// Record one error report.
    ///
    /// Computes the fingerprint, then either increments the matching group
    /// (refreshing `last_seen` and escalating Resolved back to Active) or
    /// creates a new group with its derived tags. One occurrence row is
    /// recorded either way.
    #[tracing::instrument(
        skip(self, report),
        fields(project_id = %report.project_id, environment = %report.environment)
    )]
    pub async fn track_error(&self, report: ErrorReport) -> UpsertOutcome {
        self.track_error_at(report, Utc::now()).await
    }

    /// [`track_error`](Self::track_error) with an explicit receipt time.
    pub async fn track_error_at(
        &self,
        report: ErrorReport,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        let fingerprint = self.fingerprinter.compute(
            Some(&report.message),
            report.source.as_deref(),
            report.error_type.as_deref(),
            report.stack.as_deref(),
        );
        let tags = derive_tags(&report);

        let outcome = self.store.upsert(report, fingerprint, tags, now).await;
        if outcome.created {
            tracing::info!(
                group_id = %outcome.group.id,
                fingerprint = %outcome.group.fingerprint,
                "New error group created"
            );
        } else {
            tracing::debug!(
                group_id = %outcome.group.id,
                count = outcome.group.count,
                "Existing error group incremented"
            );
        }
        outcome
    }

    /// Groups matching a filter, `last_seen` descending, paginated.
    #[tracing::instrument(skip(self, filter))]
    pub async fn get_errors(&self, filter: &ErrorFilter) -> ErrorList {
        let (errors, total) = self.store.query_groups(filter).await;
        ErrorList { errors, total }
    }

    /// A group with its ten most recent occurrences and its tags.
    ///
    /// Returns `None` for an unknown id rather than an error.
    #[tracing::instrument(skip(self))]
    pub async fn get_error_by_id(&self, id: Uuid) -> Option<ErrorDetail> {
        self.store.group_detail(id).await
    }

    /// Explicit status transition on one group.
    ///
    /// Any status-to-status transition is permitted here; only the implicit
    /// transition on new occurrences is constrained (Resolved escalates,
    /// Ignored is preserved).
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: ErrorStatus) -> Option<ErrorGroup> {
        self.store.set_status(id, status).await
    }

    /// Explicit status transition on several groups. Returns how many
    /// existed and were updated.
    #[tracing::instrument(skip(self, ids), fields(requested = ids.len()))]
    pub async fn bulk_update_status(&self, ids: &[Uuid], status: ErrorStatus) -> u64 {
        self.store.set_status_bulk(ids, status).await
    }

    /// Aggregate statistics, optionally scoped by project and `first_seen`
    /// range.
    #[tracing::instrument(skip(self))]
    pub async fn get_error_stats(
        &self,
        project_id: Option<Uuid>,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> ErrorStats {
        self.store.stats(project_id, start_date, end_date).await
    }

    /// Daily activity buckets over the trailing `days` (default 7).
    #[tracing::instrument(skip(self))]
    pub async fn get_error_trends(
        &self,
        project_id: Option<Uuid>,
        days: Option<i64>,
    ) -> Vec<TrendBucket> {
        let days = days.unwrap_or(DEFAULT_TREND_DAYS).max(1);
        self.store.trends(project_id, days, Utc::now()).await
    }

    /// Distinct non-null user ids across a group's occurrences.
    #[tracing::instrument(skip(self))]
    pub async fn get_affected_users(&self, group_id: Uuid) -> Option<Vec<String>> {
        self.store.affected_users(group_id).await
    }

    /// Prune occurrences older than `days_to_keep` days. Group aggregates
    /// are untouched; occurrence and group retention are independent
    /// policies.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_old_occurrences(&self, days_to_keep: i64) -> u64 {
        let cutoff = Utc::now() - Duration::days(days_to_keep);
        let removed = self.store.prune_occurrences_before(cutoff).await;
        if removed > 0 {
            tracing::info!(removed, days_to_keep, "Pruned old error occurrences");
        }
        removed
    }
}
