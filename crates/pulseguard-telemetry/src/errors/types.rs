//! Core types for error tracking.
//!
//! These types represent aggregated error groups, individual occurrences,
//! derived tags, and the filter/statistics shapes used by the query
//! operations.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default page size for error list queries.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Lifecycle status of an error group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStatus {
    /// Occurring and unhandled.
    Active,
    /// Marked fixed by a user.
    Resolved,
    /// Deliberately muted by a user.
    Ignored,
    /// Under active investigation.
    Investigating,
}

impl ErrorStatus {
    /// Status after an implicit new occurrence.
    ///
    /// Resolved groups escalate back to Active; Ignored and Investigating
    /// are user decisions that a new occurrence must not override.
    #[must_use]
    pub const fn escalate_on_new_occurrence(self) -> Self {
        match self {
            Self::Resolved => Self::Active,
            other => other,
        }
    }
}

/// A derived label attached to an error group, unique on `(key, value)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key (e.g. "browser", "errorType", "environment", "path").
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Create a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The canonical deduplicated error.
///
/// At most one group exists per
/// `(project_id, environment, message, source, error_type, fingerprint)`
/// tuple; repeat occurrences increment `count` instead of creating rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGroup {
    /// Group id.
    pub id: Uuid,
    /// Error message from the first occurrence.
    pub message: String,
    /// Stack trace from the first occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Source location where the error originated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Line number from the first occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Column number from the first occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Error type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Page URL from the first occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Component context from the first occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    /// Raw user agent from the first occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_info: Option<String>,
    /// User id of the first reporter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session id of the first reporter.
    pub session_id: String,
    /// Project this group belongs to.
    pub project_id: Uuid,
    /// Deployment environment.
    pub environment: String,
    /// Lifecycle status.
    pub status: ErrorStatus,
    /// Total number of occurrences.
    pub count: u64,
    /// Timestamp of the first occurrence.
    pub first_seen: DateTime<Utc>,
    /// Timestamp of the most recent occurrence.
    pub last_seen: DateTime<Utc>,
    /// Dedup fingerprint.
    pub fingerprint: String,
    /// Derived tags.
    pub tags: Vec<Tag>,
}

/// A single error occurrence, child of an [`ErrorGroup`].
///
/// Never mutated after creation; pruned by the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOccurrence {
    /// Occurrence id.
    pub id: Uuid,
    /// Owning group.
    pub group_id: Uuid,
    /// Session that produced the occurrence.
    pub session_id: String,
    /// User affected, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Request-derived metadata captured at ingestion.
    pub metadata: Value,
    /// Server receipt timestamp.
    pub timestamp: DateTime<Utc>,
}

/// An incoming error report after ingestion enrichment, ready for
/// aggregation.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Error message.
    pub message: String,
    /// Source location.
    pub source: Option<String>,
    /// Line number.
    pub line: Option<u32>,
    /// Column number.
    pub column: Option<u32>,
    /// Stack trace.
    pub stack: Option<String>,
    /// Error type name.
    pub error_type: Option<String>,
    /// Component context.
    pub component_stack: Option<String>,
    /// Page URL.
    pub url: Option<String>,
    /// User agent of the reporting runtime.
    pub user_agent: Option<String>,
    /// Session id.
    pub session_id: String,
    /// User id.
    pub user_id: Option<String>,
    /// Project resolved from request context.
    pub project_id: Uuid,
    /// Environment resolved from request context.
    pub environment: String,
    /// Request-derived metadata (header snapshot, receipt time, extras).
    pub metadata: Value,
}

/// Filter criteria for error list queries.
#[derive(Debug, Clone, Default)]
pub struct ErrorFilter {
    /// Filter by project.
    pub project_id: Option<Uuid>,
    /// Filter by environment.
    pub environment: Option<String>,
    /// Filter by status.
    pub status: Option<ErrorStatus>,
    /// Case-insensitive substring search across message, source, and URL.
    pub search: Option<String>,
    /// Filter by the first reporter's user id.
    pub user_id: Option<String>,
    /// Filter by the first reporter's session id.
    pub session_id: Option<String>,
    /// Inclusive lower bound on `first_seen`.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `first_seen`.
    pub end_date: Option<DateTime<Utc>>,
    /// Page number (1-based).
    pub page: Option<usize>,
    /// Page size (default 20).
    pub limit: Option<usize>,
}

impl ErrorFilter {
    /// Filter by project id.
    #[must_use]
    pub const fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Filter by environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Filter by status.
    #[must_use]
    pub const fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Search across message, source, and URL.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Filter by user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the page number (1-based).
    #[must_use]
    pub const fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    /// Set the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a group satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, group: &ErrorGroup) -> bool {
        if let Some(project_id) = self.project_id {
            if group.project_id != project_id {
                return false;
            }
        }
        if let Some(ref environment) = self.environment {
            if &group.environment != environment {
                return false;
            }
        }
        if let Some(status) = self.status {
            if group.status != status {
                return false;
            }
        }
        if let Some(ref user_id) = self.user_id {
            if group.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(ref session_id) = self.session_id {
            if &group.session_id != session_id {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if group.first_seen < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if group.first_seen > end {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let haystacks = [
                Some(group.message.as_str()),
                group.source.as_deref(),
                group.url.as_deref(),
            ];
            let found = haystacks
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle));
            if !found {
                return false;
            }
        }
        true
    }

    /// Resolved `(page, limit)` with defaults applied.
    #[must_use]
    pub fn pagination(&self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
        (page, limit)
    }
}

/// A status bucket in the statistics response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    /// The status.
    pub status: ErrorStatus,
    /// Number of groups with that status.
    pub count: u64,
}

/// An environment bucket in the statistics response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentCount {
    /// The environment.
    pub environment: String,
    /// Number of groups in that environment.
    pub count: u64,
}

/// An error-type bucket in the statistics response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    /// The error type.
    pub error_type: String,
    /// Number of groups with that type.
    pub count: u64,
}

/// Aggregate error statistics for a project and time range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    /// Total number of error groups matched.
    pub total_errors: u64,
    /// Groups bucketed by status.
    pub by_status: Vec<StatusCount>,
    /// Groups bucketed by environment.
    pub by_environment: Vec<EnvironmentCount>,
    /// Top five error types, count descending then type ascending.
    pub top_types: Vec<TypeCount>,
}

/// One day of error activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    /// The day (UTC).
    pub date: NaiveDate,
    /// Distinct groups that received an occurrence that day.
    pub unique_groups: u64,
    /// Total occurrences recorded that day.
    pub total_occurrences: u64,
}

/// An error group together with its most recent occurrences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// The group, including its tags.
    #[serde(flatten)]
    pub group: ErrorGroup,
    /// Most recent occurrences, newest first (at most ten).
    pub recent_occurrences: Vec<ErrorOccurrence>,
}
