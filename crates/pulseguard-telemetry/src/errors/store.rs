//! In-process error group store.
//!
//! Holds aggregated groups, their occurrences, and the tag registry behind a
//! single `RwLock`. The dedup-key index makes the upsert a keyed lookup, and
//! running the whole lookup-then-mutate under one write guard is what keeps
//! concurrent first-occurrences from creating duplicate groups.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{
    EnvironmentCount, ErrorDetail, ErrorFilter, ErrorGroup, ErrorOccurrence, ErrorReport,
    ErrorStats, ErrorStatus, StatusCount, Tag, TrendBucket, TypeCount,
};

/// Number of recent occurrences returned with a group detail.
pub const DETAIL_OCCURRENCE_LIMIT: usize = 10;

/// Number of error types returned by the statistics query.
pub const TOP_TYPE_LIMIT: usize = 5;

/// The tuple that admits at most one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    project_id: Uuid,
    environment: String,
    message: String,
    source: Option<String>,
    error_type: Option<String>,
    fingerprint: String,
}

impl DedupKey {
    fn from_report(report: &ErrorReport, fingerprint: &str) -> Self {
        Self {
            project_id: report.project_id,
            environment: report.environment.clone(),
            message: report.message.clone(),
            source: report.source.clone(),
            error_type: report.error_type.clone(),
            fingerprint: fingerprint.to_owned(),
        }
    }
}

/// Outcome of an upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// The group after the upsert (created or updated).
    pub group: ErrorGroup,
    /// Whether the upsert created a new group.
    pub created: bool,
}

#[derive(Default)]
struct StoreState {
    groups: HashMap<Uuid, ErrorGroup>,
    /// Dedup key -> group id. The in-process uniqueness constraint.
    group_index: HashMap<DedupKey, Uuid>,
    /// Group id -> occurrences in arrival order.
    occurrences: HashMap<Uuid, Vec<ErrorOccurrence>>,
    /// Registry of all tags ever derived, unique on `(key, value)`.
    tag_registry: HashSet<Tag>,
}

/// The aggregated error store.
#[derive(Default)]
pub struct ErrorStore {
    state: RwLock<StoreState>,
}

impl ErrorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence, creating or updating its group.
    ///
    /// The whole lookup-and-mutate runs under one write guard, so concurrent
    /// first-occurrences of the same key converge on a single group and
    /// concurrent increments never lose an update.
    pub async fn upsert(
        &self,
        report: ErrorReport,
        fingerprint: String,
        tags: Vec<Tag>,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        let key = DedupKey::from_report(&report, &fingerprint);
        let mut state = self.state.write().await;

        if let Some(&group_id) = state.group_index.get(&key) {
            let occurrence = build_occurrence(group_id, &report, now);
            state
                .occurrences
                .entry(group_id)
                .or_default()
                .push(occurrence);

            let group = state
                .groups
                .get_mut(&group_id)
                .expect("indexed group exists");
            group.count += 1;
            group.last_seen = now;
            group.status = group.status.escalate_on_new_occurrence();

            return UpsertOutcome {
                group: group.clone(),
                created: false,
            };
        }

        let group_id = Uuid::new_v4();
        for tag in &tags {
            state.tag_registry.insert(tag.clone());
        }
        let group = ErrorGroup {
            id: group_id,
            message: report.message.clone(),
            stack: report.stack.clone(),
            source: report.source.clone(),
            line: report.line,
            column: report.column,
            error_type: report.error_type.clone(),
            url: report.url.clone(),
            component_stack: report.component_stack.clone(),
            browser_info: report.user_agent.clone(),
            user_id: report.user_id.clone(),
            session_id: report.session_id.clone(),
            project_id: report.project_id,
            environment: report.environment.clone(),
            status: ErrorStatus::Active,
            count: 1,
            first_seen: now,
            last_seen: now,
            fingerprint,
            tags,
        };

        let occurrence = build_occurrence(group_id, &report, now);
        state.occurrences.insert(group_id, vec![occurrence]);
        state.group_index.insert(key, group_id);
        state.groups.insert(group_id, group.clone());

        UpsertOutcome {
            group,
            created: true,
        }
    }

    /// Groups matching a filter, ordered most recently active first.
    ///
    /// Returns the page plus the full matched-set size (for pagination).
    pub async fn query_groups(&self, filter: &ErrorFilter) -> (Vec<ErrorGroup>, usize) {
        let state = self.state.read().await;

        let mut matched: Vec<&ErrorGroup> = state
            .groups
            .values()
            .filter(|group| filter.matches(group))
            .collect();
        matched.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

        let total = matched.len();
        let (page, limit) = filter.pagination();
        let errors = matched
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .cloned()
            .collect();

        (errors, total)
    }

    /// A group with its most recent occurrences, or `None` if absent.
    pub async fn group_detail(&self, id: Uuid) -> Option<ErrorDetail> {
        let state = self.state.read().await;
        let group = state.groups.get(&id)?.clone();

        let mut recent: Vec<ErrorOccurrence> =
            state.occurrences.get(&id).cloned().unwrap_or_default();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(DETAIL_OCCURRENCE_LIMIT);

        Some(ErrorDetail {
            group,
            recent_occurrences: recent,
        })
    }

    /// Set a group's status. Returns the updated group, or `None` if absent.
    pub async fn set_status(&self, id: Uuid, status: ErrorStatus) -> Option<ErrorGroup> {
        let mut state = self.state.write().await;
        let group = state.groups.get_mut(&id)?;
        group.status = status;
        Some(group.clone())
    }

    /// Set the status of several groups. Returns how many were updated.
    pub async fn set_status_bulk(&self, ids: &[Uuid], status: ErrorStatus) -> u64 {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(group) = state.groups.get_mut(id) {
                group.status = status;
                updated += 1;
            }
        }
        updated
    }

    /// Aggregate statistics over groups, optionally scoped to a project and
    /// a `first_seen` date range.
    pub async fn stats(
        &self,
        project_id: Option<Uuid>,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> ErrorStats {
        let state = self.state.read().await;

        let matched: Vec<&ErrorGroup> = state
            .groups
            .values()
            .filter(|group| {
                project_id.map_or(true, |id| group.project_id == id)
                    && start_date.map_or(true, |start| group.first_seen >= start)
                    && end_date.map_or(true, |end| group.first_seen <= end)
            })
            .collect();

        let mut by_status: HashMap<ErrorStatus, u64> = HashMap::new();
        let mut by_environment: HashMap<String, u64> = HashMap::new();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        for group in &matched {
            *by_status.entry(group.status).or_default() += 1;
            *by_environment.entry(group.environment.clone()).or_default() += 1;
            if let Some(error_type) = &group.error_type {
                *by_type.entry(error_type.clone()).or_default() += 1;
            }
        }

        let mut by_status: Vec<StatusCount> = by_status
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        by_status.sort_by(|a, b| b.count.cmp(&a.count));

        let mut by_environment: Vec<EnvironmentCount> = by_environment
            .into_iter()
            .map(|(environment, count)| EnvironmentCount { environment, count })
            .collect();
        by_environment.sort_by(|a, b| b.count.cmp(&a.count).then(a.environment.cmp(&b.environment)));

        let mut top_types: Vec<TypeCount> = by_type
            .into_iter()
            .map(|(error_type, count)| TypeCount { error_type, count })
            .collect();
        // Deterministic order: count descending, then type name ascending.
        top_types.sort_by(|a, b| b.count.cmp(&a.count).then(a.error_type.cmp(&b.error_type)));
        top_types.truncate(TOP_TYPE_LIMIT);

        ErrorStats {
            total_errors: matched.len() as u64,
            by_status,
            by_environment,
            top_types,
        }
    }

    /// Daily occurrence activity over the trailing `days`, oldest day first.
    ///
    /// Each bucket counts the distinct groups touched and the total
    /// occurrences recorded that day. Days without activity produce a zero
    /// bucket.
    pub async fn trends(
        &self,
        project_id: Option<Uuid>,
        days: i64,
        now: DateTime<Utc>,
    ) -> Vec<TrendBucket> {
        let state = self.state.read().await;
        let window_start = (now - Duration::days(days - 1)).date_naive();

        let mut daily_groups: HashMap<chrono::NaiveDate, HashSet<Uuid>> = HashMap::new();
        let mut daily_totals: HashMap<chrono::NaiveDate, u64> = HashMap::new();

        for (group_id, occurrences) in &state.occurrences {
            if let Some(project_id) = project_id {
                let in_project = state
                    .groups
                    .get(group_id)
                    .is_some_and(|group| group.project_id == project_id);
                if !in_project {
                    continue;
                }
            }
            for occurrence in occurrences {
                let date = occurrence.timestamp.date_naive();
                if date < window_start || date > now.date_naive() {
                    continue;
                }
                daily_groups.entry(date).or_default().insert(*group_id);
                *daily_totals.entry(date).or_default() += 1;
            }
        }

        (0..days)
            .map(|offset| {
                let date = window_start + Duration::days(offset);
                TrendBucket {
                    date,
                    unique_groups: daily_groups.get(&date).map_or(0, HashSet::len) as u64,
                    total_occurrences: daily_totals.get(&date).copied().unwrap_or(0),
                }
            })
            .collect()
    }

    /// Distinct non-null user ids across a group's occurrences.
    ///
    /// Returns `None` when the group does not exist.
    pub async fn affected_users(&self, group_id: Uuid) -> Option<Vec<String>> {
        let state = self.state.read().await;
        if !state.groups.contains_key(&group_id) {
            return None;
        }

        let mut users: Vec<String> = state
            .occurrences
            .get(&group_id)
            .map(|occurrences| {
                occurrences
                    .iter()
                    .filter_map(|occurrence| occurrence.user_id.clone())
                    .collect::<HashSet<_>>()
            })
            .unwrap_or_default()
            .into_iter()
            .collect();
        users.sort();
        Some(users)
    }

    /// Delete occurrences older than the cutoff. Returns how many were
    /// removed. Group rows are untouched: aggregate `count` and `last_seen`
    /// survive occurrence pruning.
    pub async fn prune_occurrences_before(&self, cutoff: DateTime<Utc>) -> u64 {
        let mut state = self.state.write().await;
        let mut removed = 0;
        for occurrences in state.occurrences.values_mut() {
            let before = occurrences.len();
            occurrences.retain(|occurrence| occurrence.timestamp >= cutoff);
            removed += (before - occurrences.len()) as u64;
        }
        removed
    }

    /// Number of groups currently stored.
    pub async fn group_count(&self) -> usize {
        self.state.read().await.groups.len()
    }

    /// Number of distinct tags ever derived.
    pub async fn tag_count(&self) -> usize {
        self.state.read().await.tag_registry.len()
    }
}

fn build_occurrence(group_id: Uuid, report: &ErrorReport, now: DateTime<Utc>) -> ErrorOccurrence {
    ErrorOccurrence {
        id: Uuid::new_v4(),
        group_id,
        session_id: report.session_id.clone(),
        user_id: report.user_id.clone(),
        metadata: report.metadata.clone(),
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(message: &str, project_id: Uuid) -> ErrorReport {
        ErrorReport {
            message: message.to_owned(),
            source: Some("app.js".to_owned()),
            line: Some(10),
            column: None,
            stack: None,
            error_type: Some("TypeError".to_owned()),
            component_stack: None,
            url: Some("https://app.example.com/checkout".to_owned()),
            user_agent: None,
            session_id: "session_0_test".to_owned(),
            user_id: None,
            project_id,
            environment: "production".to_owned(),
            metadata: serde_json::json!({}),
        }
    }

    fn fingerprint_of(report: &ErrorReport) -> String {
        super::super::fingerprint::compute_fingerprint(
            Some(&report.message),
            report.source.as_deref(),
            report.error_type.as_deref(),
        )
    }

    async fn track(store: &ErrorStore, report: ErrorReport) -> UpsertOutcome {
        let fingerprint = fingerprint_of(&report);
        store.upsert(report, fingerprint, Vec::new(), Utc::now()).await
    }

    #[tokio::test]
    async fn first_occurrence_creates_group() {
        let store = ErrorStore::new();
        let outcome = track(&store, report("boom", Uuid::nil())).await;

        assert!(outcome.created);
        assert_eq!(outcome.group.count, 1);
        assert_eq!(outcome.group.status, ErrorStatus::Active);
        assert_eq!(outcome.group.first_seen, outcome.group.last_seen);
        assert_eq!(store.group_count().await, 1);
    }

    #[tokio::test]
    async fn repeat_occurrence_increments_existing_group() {
        let store = ErrorStore::new();
        let first = track(&store, report("boom", Uuid::nil())).await;

        // Same message/source/type at a different line joins the same group.
        let mut second_report = report("boom", Uuid::nil());
        second_report.line = Some(42);
        let second = track(&store, second_report).await;

        assert!(!second.created);
        assert_eq!(second.group.id, first.group.id);
        assert_eq!(second.group.count, 2);
        assert_eq!(store.group_count().await, 1);
    }

    #[tokio::test]
    async fn different_environment_is_a_different_group() {
        let store = ErrorStore::new();
        track(&store, report("boom", Uuid::nil())).await;

        let mut staging = report("boom", Uuid::nil());
        staging.environment = "staging".to_owned();
        let outcome = track(&store, staging).await;

        assert!(outcome.created);
        assert_eq!(store.group_count().await, 2);
    }

    #[tokio::test]
    async fn concurrent_occurrences_converge_on_one_group() {
        let store = std::sync::Arc::new(ErrorStore::new());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { track(&store, report("boom", Uuid::nil())).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.group_count().await, 1);
        let (groups, total) = store.query_groups(&ErrorFilter::default()).await;
        assert_eq!(total, 1);
        assert_eq!(groups[0].count, 32);
    }

    #[tokio::test]
    async fn resolved_escalates_but_ignored_is_preserved() {
        let store = ErrorStore::new();
        let group = track(&store, report("boom", Uuid::nil())).await.group;

        store.set_status(group.id, ErrorStatus::Resolved).await.unwrap();
        let after = track(&store, report("boom", Uuid::nil())).await.group;
        assert_eq!(after.status, ErrorStatus::Active);

        store.set_status(group.id, ErrorStatus::Ignored).await.unwrap();
        let after = track(&store, report("boom", Uuid::nil())).await.group;
        assert_eq!(after.status, ErrorStatus::Ignored);
    }

    #[tokio::test]
    async fn detail_returns_ten_most_recent_occurrences() {
        let store = ErrorStore::new();
        let base = Utc::now();
        let mut group_id = None;
        for i in 0..15 {
            let report = report("boom", Uuid::nil());
            let fingerprint = fingerprint_of(&report);
            let outcome = store
                .upsert(
                    report,
                    fingerprint,
                    Vec::new(),
                    base + Duration::seconds(i),
                )
                .await;
            group_id = Some(outcome.group.id);
        }

        let detail = store.group_detail(group_id.unwrap()).await.unwrap();
        assert_eq!(detail.group.count, 15);
        assert_eq!(detail.recent_occurrences.len(), DETAIL_OCCURRENCE_LIMIT);
        // Newest first.
        assert_eq!(
            detail.recent_occurrences[0].timestamp,
            base + Duration::seconds(14)
        );
        assert!(detail.recent_occurrences[0].timestamp
            > detail.recent_occurrences[9].timestamp);
    }

    #[tokio::test]
    async fn detail_of_unknown_group_is_none() {
        let store = ErrorStore::new();
        assert!(store.group_detail(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn query_orders_by_last_seen_descending() {
        let store = ErrorStore::new();
        let base = Utc::now();
        for (i, message) in ["first", "second", "third"].iter().enumerate() {
            let report = report(message, Uuid::nil());
            let fingerprint = fingerprint_of(&report);
            store
                .upsert(
                    report,
                    fingerprint,
                    Vec::new(),
                    base + Duration::seconds(i as i64),
                )
                .await;
        }

        let (groups, total) = store.query_groups(&ErrorFilter::default()).await;
        assert_eq!(total, 3);
        assert_eq!(groups[0].message, "third");
        assert_eq!(groups[2].message, "first");
    }

    #[tokio::test]
    async fn query_paginates_and_reports_full_total() {
        let store = ErrorStore::new();
        for i in 0..5 {
            track(&store, report(&format!("error {i}"), Uuid::nil())).await;
        }

        let filter = ErrorFilter::default().with_page(2).with_limit(2);
        let (groups, total) = store.query_groups(&filter).await;
        assert_eq!(total, 5);
        assert_eq!(groups.len(), 2);
    }

    #[tokio::test]
    async fn bulk_status_counts_only_existing_groups() {
        let store = ErrorStore::new();
        let a = track(&store, report("a", Uuid::nil())).await.group.id;
        let b = track(&store, report("b", Uuid::nil())).await.group.id;

        let updated = store
            .set_status_bulk(&[a, b, Uuid::new_v4()], ErrorStatus::Resolved)
            .await;
        assert_eq!(updated, 2);

        let filter = ErrorFilter::default().with_status(ErrorStatus::Resolved);
        let (_, total) = store.query_groups(&filter).await;
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn stats_buckets_and_top_types_are_deterministic() {
        let store = ErrorStore::new();
        for (message, error_type) in [
            ("a", "TypeError"),
            ("b", "TypeError"),
            ("c", "RangeError"),
            ("d", "SyntaxError"),
        ] {
            let mut r = report(message, Uuid::nil());
            r.error_type = Some(error_type.to_owned());
            track(&store, r).await;
        }

        let stats = store.stats(None, None, None).await;
        assert_eq!(stats.total_errors, 4);
        assert_eq!(stats.top_types[0].error_type, "TypeError");
        assert_eq!(stats.top_types[0].count, 2);
        // Ties broken by type name ascending.
        assert_eq!(stats.top_types[1].error_type, "RangeError");
        assert_eq!(stats.top_types[2].error_type, "SyntaxError");
    }

    #[tokio::test]
    async fn trends_buckets_by_day() {
        let store = ErrorStore::new();
        let now = Utc::now();

        // Two occurrences today, one yesterday, all in one group.
        for offset_days in [0, 0, 1] {
            let report = report("boom", Uuid::nil());
            let fingerprint = fingerprint_of(&report);
            store
                .upsert(
                    report,
                    fingerprint,
                    Vec::new(),
                    now - Duration::days(offset_days),
                )
                .await;
        }

        let buckets = store.trends(None, 7, now).await;
        assert_eq!(buckets.len(), 7);
        let today = &buckets[6];
        let yesterday = &buckets[5];
        assert_eq!(today.total_occurrences, 2);
        assert_eq!(today.unique_groups, 1);
        assert_eq!(yesterday.total_occurrences, 1);
        assert_eq!(buckets[0].total_occurrences, 0);
    }

    #[tokio::test]
    async fn affected_users_are_distinct_and_non_null() {
        let store = ErrorStore::new();
        let mut group_id = None;
        for user in [Some("alice"), Some("bob"), Some("alice"), None] {
            let mut r = report("boom", Uuid::nil());
            r.user_id = user.map(str::to_owned);
            group_id = Some(track(&store, r).await.group.id);
        }

        let users = store.affected_users(group_id.unwrap()).await.unwrap();
        assert_eq!(users, vec!["alice".to_owned(), "bob".to_owned()]);

        assert!(store.affected_users(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn pruning_removes_occurrences_but_not_groups() {
        let store = ErrorStore::new();
        let now = Utc::now();

        let r = report("boom", Uuid::nil());
        let fingerprint = fingerprint_of(&r);
        store
            .upsert(r.clone(), fingerprint.clone(), Vec::new(), now - Duration::days(40))
            .await;
        let outcome = store.upsert(r, fingerprint, Vec::new(), now).await;

        let removed = store
            .prune_occurrences_before(now - Duration::days(30))
            .await;
        assert_eq!(removed, 1);

        // The group aggregate survives pruning untouched.
        let detail = store.group_detail(outcome.group.id).await.unwrap();
        assert_eq!(detail.group.count, 2);
        assert_eq!(detail.recent_occurrences.len(), 1);
    }

    #[tokio::test]
    async fn tag_registry_is_unique_on_key_value() {
        let store = ErrorStore::new();
        let tags = vec![
            Tag::new("browser", "Chrome"),
            Tag::new("environment", "production"),
        ];

        let r = report("a", Uuid::nil());
        let fp = fingerprint_of(&r);
        store.upsert(r, fp, tags.clone(), Utc::now()).await;

        let r = report("b", Uuid::nil());
        let fp = fingerprint_of(&r);
        store.upsert(r, fp, tags, Utc::now()).await;

        assert_eq!(store.tag_count().await, 2);
    }
}
