//! Periodic occurrence retention sweep.
//!
//! Occurrence rows are insert-only and would grow without bound; a
//! background task prunes rows older than the configured retention window.
//! Group rows are never touched: a group's aggregate `count` and `last_seen`
//! survive occurrence pruning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::RetentionConfig;
use crate::errors::ErrorAggregator;

/// Handle for controlling the background retention sweep.
pub struct SweepHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: JoinHandle<()>,
}

impl SweepHandle {
    /// Signal the background task to stop and wait for it to complete.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.join_handle.await;
    }

    /// Abort the background task immediately.
    pub fn abort(self) {
        self.join_handle.abort();
    }
}

/// Start the background retention sweep.
///
/// The task prunes occurrences older than `days_to_keep` on every
/// `sweep_interval_secs` tick. Returns a handle for graceful shutdown.
pub fn start_retention_sweep(
    aggregator: Arc<ErrorAggregator>,
    config: RetentionConfig,
) -> SweepHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let interval = Duration::from_secs(config.sweep_interval_secs);
    let days_to_keep = config.days_to_keep;

    let join_handle = tokio::spawn(async move {
        tracing::info!(
            interval_secs = interval.as_secs(),
            days_to_keep,
            "Starting retention sweep task"
        );

        let mut interval_timer =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = interval_timer.tick() => {
                    let removed = aggregator.cleanup_old_occurrences(days_to_keep).await;
                    tracing::debug!(removed, "Retention sweep completed");
                }
                _ = &mut shutdown_rx => {
                    break;
                }
            }
        }

        tracing::info!("Retention sweep task stopped");
    });

    SweepHandle {
        shutdown_tx: Some(shutdown_tx),
        join_handle,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::errors::{ErrorReport, ErrorStore};

    fn report() -> ErrorReport {
        ErrorReport {
            message: "boom".to_owned(),
            source: None,
            line: None,
            column: None,
            stack: None,
            error_type: None,
            component_stack: None,
            url: None,
            user_agent: None,
            session_id: "session_0_test".to_owned(),
            user_id: None,
            project_id: Uuid::nil(),
            environment: "production".to_owned(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_prunes_old_occurrences() {
        let aggregator = Arc::new(ErrorAggregator::new(Arc::new(ErrorStore::new())));

        let old = Utc::now() - ChronoDuration::days(40);
        let group_id = aggregator.track_error_at(report(), old).await.group.id;
        let group_id_check = aggregator.track_error(report()).await.group.id;
        assert_eq!(group_id, group_id_check);

        let handle = start_retention_sweep(
            aggregator.clone(),
            RetentionConfig {
                sweep_interval_secs: 1,
                days_to_keep: 30,
            },
        );

        // Paused clock auto-advances past the first tick.
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.shutdown().await;

        let detail = aggregator.get_error_by_id(group_id).await.unwrap();
        assert_eq!(detail.recent_occurrences.len(), 1);
        // The group aggregate is untouched by pruning.
        assert_eq!(detail.group.count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_task() {
        let aggregator = Arc::new(ErrorAggregator::new(Arc::new(ErrorStore::new())));
        let handle = start_retention_sweep(aggregator, RetentionConfig::default());
        handle.shutdown().await;
    }
}
