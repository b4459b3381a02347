//! Session-replay event batching with reliable delivery.
//!
//! Events accumulate in an in-memory queue and are flushed as one request
//! when either the batch size threshold is reached or the flush interval
//! elapses (measured from the first event of the current batch). A failed
//! flush is requeued ahead of anything that arrived in the meantime, so
//! delivery is at-least-once and chronological order survives retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::config::SdkConfig;
use crate::events::{ReplayBatch, ReplayEvent, ReplayEventKind, ReplayMetadata};
use crate::transport::Transport;

/// Calculate the delay before the next failed-flush retry.
///
/// The delay doubles with each consecutive failure, capped at `max_delay`.
fn calculate_backoff_delay(failures: u32, initial_delay: Duration, max_delay: Duration) -> Duration {
    let exponent = failures.saturating_sub(1);
    let multiplier = 2u32.saturating_pow(exponent);
    initial_delay.saturating_mul(multiplier).min(max_delay)
}

/// Batching configuration, usually derived from [`SdkConfig`].
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    /// Flush interval measured from the first event of the current batch.
    pub flush_interval: Duration,
    /// Minimum spacing between sampled pointer-move/scroll events.
    pub sample_interval: Duration,
    /// Initial delay before retrying a failed flush.
    pub retry_initial_delay: Duration,
    /// Cap on the retry delay.
    pub retry_max_delay: Duration,
}

impl From<&SdkConfig> for BatcherConfig {
    fn from(config: &SdkConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
            sample_interval: config.sample_interval,
            retry_initial_delay: config.retry_initial_delay,
            retry_max_delay: config.retry_max_delay,
        }
    }
}

/// Buffers replay events and delivers them in bulk.
///
/// Cheap to clone; all clones share the same queue.
#[derive(Clone)]
pub struct EventBatcher {
    inner: Arc<BatcherInner>,
}

struct BatcherInner {
    transport: Arc<dyn Transport>,
    config: BatcherConfig,
    session_id: String,
    url: String,
    user_agent: String,
    state: Mutex<BatchState>,
}

#[derive(Default)]
struct BatchState {
    queue: Vec<ReplayEvent>,
    /// Bumping this cancels any sleeping timer task.
    timer_generation: u64,
    timer_pending: bool,
    /// A flush request while one is in flight is a no-op; the in-flight
    /// completion re-evaluates the queue.
    in_flight: bool,
    consecutive_failures: u32,
    last_sampled: HashMap<ReplayEventKind, Instant>,
}

impl EventBatcher {
    /// Create a batcher delivering through the given transport.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: BatcherConfig,
        session_id: impl Into<String>,
        url: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                transport,
                config,
                session_id: session_id.into(),
                url: url.into(),
                user_agent: user_agent.into(),
                state: Mutex::new(BatchState::default()),
            }),
        }
    }

    /// Append an event, applying the pre-enqueue noise policies.
    ///
    /// Pointer-move and scroll events are rate limited to one per sampling
    /// interval; input events collapse to the last value per source within a
    /// batch. Reaching the batch size flushes inline; otherwise a flush timer
    /// is armed if none is pending.
    pub async fn enqueue(&self, event: ReplayEvent) {
        let should_flush = {
            let mut state = self.inner.state.lock().expect("batcher state poisoned");
            if !state.admit(event, self.inner.config.sample_interval) {
                return;
            }
            state.queue.len() >= self.inner.config.batch_size
        };

        if should_flush {
            Self::flush_inner(&self.inner).await;
        } else {
            Self::ensure_timer(&self.inner, self.inner.config.flush_interval);
        }
    }

    /// Record an error marker event and flush out-of-band.
    ///
    /// Error context must never sit behind a slow timer, so this bypasses
    /// both the sampling policies and the size/timer thresholds.
    pub async fn record_error(&self, payload: Value) {
        {
            let mut state = self.inner.state.lock().expect("batcher state poisoned");
            state.queue.push(ReplayEvent::new(
                ReplayEventKind::Custom,
                serde_json::json!({ "tag": "error", "payload": payload }),
            ));
        }
        Self::flush_inner(&self.inner).await;
    }

    /// Flush the current queue immediately.
    pub async fn flush(&self) {
        Self::flush_inner(&self.inner).await;
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn queued_events(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("batcher state poisoned")
            .queue
            .len()
    }

    /// Arm the flush timer if none is pending.
    fn ensure_timer(inner: &Arc<BatcherInner>, delay: Duration) {
        Self::arm_timer(inner, delay, false);
    }

    /// Arm the flush timer, replacing any pending one.
    ///
    /// Used after a failed flush so the backoff delay takes precedence over a
    /// previously armed interval timer.
    fn rearm_timer(inner: &Arc<BatcherInner>, delay: Duration) {
        Self::arm_timer(inner, delay, true);
    }

    fn arm_timer(inner: &Arc<BatcherInner>, delay: Duration, replace: bool) {
        let generation = {
            let mut state = inner.state.lock().expect("batcher state poisoned");
            if (state.timer_pending && !replace) || state.queue.is_empty() {
                return;
            }
            state.timer_pending = true;
            state.timer_generation += 1;
            state.timer_generation
        };

        let inner = inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let still_current = {
                let mut state = inner.state.lock().expect("batcher state poisoned");
                if state.timer_generation == generation {
                    state.timer_pending = false;
                    true
                } else {
                    false
                }
            };

            if still_current {
                EventBatcher::flush_inner(&inner).await;
            }
        });
    }

    async fn flush_inner(inner: &Arc<BatcherInner>) {
        loop {
            // Snapshot and clear the live queue in one critical section so
            // events arriving mid-flush accumulate into the next batch.
            let snapshot = {
                let mut state = inner.state.lock().expect("batcher state poisoned");
                if state.in_flight || state.queue.is_empty() {
                    return;
                }
                state.in_flight = true;
                state.timer_generation += 1;
                state.timer_pending = false;
                std::mem::take(&mut state.queue)
            };

            let batch = ReplayBatch {
                events: snapshot,
                metadata: ReplayMetadata {
                    user_agent: inner.user_agent.clone(),
                    url: inner.url.clone(),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                    session_id: inner.session_id.clone(),
                },
            };

            match inner.transport.send_replay_batch(&batch).await {
                Ok(()) => {
                    let pending = {
                        let mut state = inner.state.lock().expect("batcher state poisoned");
                        state.in_flight = false;
                        state.consecutive_failures = 0;
                        state.queue.len()
                    };

                    if pending >= inner.config.batch_size {
                        continue;
                    }
                    if pending > 0 {
                        Self::ensure_timer(inner, inner.config.flush_interval);
                    }
                    return;
                }
                Err(error) => {
                    let delay = {
                        let mut state = inner.state.lock().expect("batcher state poisoned");
                        state.in_flight = false;
                        state.consecutive_failures += 1;

                        // Failed events are older than anything queued since,
                        // so they go back on the front.
                        let mut requeued = batch.events;
                        requeued.append(&mut state.queue);
                        state.queue = requeued;

                        calculate_backoff_delay(
                            state.consecutive_failures,
                            inner.config.retry_initial_delay,
                            inner.config.retry_max_delay,
                        )
                    };

                    tracing::warn!(
                        error = %error,
                        retry_in_ms = delay.as_millis(),
                        "Replay batch delivery failed, requeued for retry"
                    );
                    Self::rearm_timer(inner, delay);
                    return;
                }
            }
        }
    }
}

impl BatchState {
    /// Apply the noise-reduction policies; returns whether the event was
    /// added to the queue.
    fn admit(&mut self, event: ReplayEvent, sample_interval: Duration) -> bool {
        match event.kind {
            ReplayEventKind::PointerMove | ReplayEventKind::Scroll => {
                let now = Instant::now();
                if let Some(last) = self.last_sampled.get(&event.kind) {
                    if now.duration_since(*last) < sample_interval {
                        return false;
                    }
                }
                self.last_sampled.insert(event.kind, now);
                self.queue.push(event);
                true
            }
            ReplayEventKind::Input => {
                let source = event.data.get("id").cloned();
                if let Some(source) = source {
                    if let Some(existing) = self
                        .queue
                        .iter_mut()
                        .find(|e| {
                            e.kind == ReplayEventKind::Input && e.data.get("id") == Some(&source)
                        })
                    {
                        existing.data = event.data;
                        existing.timestamp = event.timestamp;
                        return true;
                    }
                }
                self.queue.push(event);
                true
            }
            _ => {
                self.queue.push(event);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::events::{CustomEvent, ErrorEvent, PageView};
    use crate::transport::TransportError;

    /// Transport that records delivered batches and can fail or block on cue.
    #[derive(Default)]
    struct RecordingTransport {
        batches: Mutex<Vec<Vec<ReplayEvent>>>,
        fail_next: AtomicU32,
        entered: Notify,
        gate: Notify,
        gated_calls: AtomicU32,
    }

    impl RecordingTransport {
        fn recorded(&self) -> Vec<Vec<ReplayEvent>> {
            self.batches.lock().unwrap().clone()
        }

        fn labels(batch: &[ReplayEvent]) -> Vec<String> {
            batch
                .iter()
                .map(|e| {
                    e.data
                        .get("label")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_owned()
                })
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_error(&self, _event: &ErrorEvent) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_custom_event(&self, _event: &CustomEvent) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_replay_batch(&self, batch: &ReplayBatch) -> Result<(), TransportError> {
            if self.gated_calls.load(Ordering::SeqCst) > 0 {
                self.gated_calls.fetch_sub(1, Ordering::SeqCst);
                self.entered.notify_one();
                self.gate.notified().await;
            }
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(TransportError::Status { status: 503 });
            }
            self.batches.lock().unwrap().push(batch.events.clone());
            Ok(())
        }

        async fn send_page_view(&self, _view: &PageView) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn test_config(batch_size: usize) -> BatcherConfig {
        BatcherConfig {
            batch_size,
            flush_interval: Duration::from_millis(5_000),
            sample_interval: Duration::from_millis(200),
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
        }
    }

    fn batcher(transport: Arc<RecordingTransport>, batch_size: usize) -> EventBatcher {
        EventBatcher::new(
            transport,
            test_config(batch_size),
            "session_0_test",
            "https://example.test/",
            "test-agent",
        )
    }

    fn labelled(label: &str) -> ReplayEvent {
        ReplayEvent::new(ReplayEventKind::Mutation, json!({ "label": label }))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let initial = Duration::from_secs(1);
        let max = Duration::from_secs(30);
        assert_eq!(calculate_backoff_delay(1, initial, max), Duration::from_secs(1));
        assert_eq!(calculate_backoff_delay(2, initial, max), Duration::from_secs(2));
        assert_eq!(calculate_backoff_delay(3, initial, max), Duration::from_secs(4));
        assert_eq!(calculate_backoff_delay(10, initial, max), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn size_threshold_triggers_single_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = batcher(transport.clone(), 3);

        for label in ["a", "b", "c"] {
            batcher.enqueue(labelled(label)).await;
        }

        let recorded = transport.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(RecordingTransport::labels(&recorded[0]), ["a", "b", "c"]);
        assert_eq!(batcher.queued_events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_triggers_flush_of_partial_batch() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = batcher(transport.clone(), 50);

        batcher.enqueue(labelled("solo")).await;
        assert!(transport.recorded().is_empty());

        tokio::time::sleep(Duration::from_millis(5_100)).await;

        let recorded = transport.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(RecordingTransport::labels(&recorded[0]), ["solo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_timer_is_armed_per_batch() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = batcher(transport.clone(), 50);

        batcher.enqueue(labelled("a")).await;
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        batcher.enqueue(labelled("b")).await;

        // The timer counts from the first event; the second enqueue must not
        // rearm it.
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        let recorded = transport.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(RecordingTransport::labels(&recorded[0]), ["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_requeues_ahead_of_new_events() {
        let transport = Arc::new(RecordingTransport::default());
        transport.gated_calls.store(1, Ordering::SeqCst);
        transport.fail_next.store(1, Ordering::SeqCst);
        let batcher = batcher(transport.clone(), 2);

        // [a, b] hits the size threshold and flushes; the transport blocks.
        let flushing = {
            let batcher = batcher.clone();
            tokio::spawn(async move {
                batcher.enqueue(labelled("a")).await;
                batcher.enqueue(labelled("b")).await;
            })
        };
        transport.entered.notified().await;

        // [c, d] arrive while the failing request is in flight.
        batcher.enqueue(labelled("c")).await;
        batcher.enqueue(labelled("d")).await;

        transport.gate.notify_one();
        flushing.await.unwrap();

        // Nothing delivered yet; failed events sit in front of the newcomers.
        assert!(transport.recorded().is_empty());
        assert_eq!(batcher.queued_events(), 4);

        // The backoff retry delivers everything in chronological order.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let recorded = transport.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            RecordingTransport::labels(&recorded[0]),
            ["a", "b", "c", "d"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn error_event_forces_immediate_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = batcher(transport.clone(), 50);

        batcher.enqueue(labelled("before")).await;
        batcher
            .record_error(json!({ "message": "boom", "stack": null }))
            .await;

        let recorded = transport.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].len(), 2);
        assert_eq!(recorded[0][1].kind, ReplayEventKind::Custom);
        assert_eq!(recorded[0][1].data["tag"], "error");
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_moves_are_rate_limited() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = batcher(transport.clone(), 50);

        let pointer = |x: i64| ReplayEvent::new(ReplayEventKind::PointerMove, json!({ "x": x }));

        batcher.enqueue(pointer(1)).await;
        batcher.enqueue(pointer(2)).await;
        assert_eq!(batcher.queued_events(), 1);

        tokio::time::advance(Duration::from_millis(250)).await;
        batcher.enqueue(pointer(3)).await;
        assert_eq!(batcher.queued_events(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn input_events_collapse_to_last_value() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = batcher(transport.clone(), 50);

        let input = |value: &str| {
            ReplayEvent::new(
                ReplayEventKind::Input,
                json!({ "id": "email-field", "value": value }),
            )
        };

        batcher.enqueue(input("a")).await;
        batcher.enqueue(input("ab")).await;
        batcher.enqueue(input("abc")).await;
        assert_eq!(batcher.queued_events(), 1);

        batcher.flush().await;
        let recorded = transport.recorded();
        assert_eq!(recorded[0].len(), 1);
        assert_eq!(recorded[0][0].data["value"], "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_input_sources_are_kept() {
        let transport = Arc::new(RecordingTransport::default());
        let batcher = batcher(transport.clone(), 50);

        batcher
            .enqueue(ReplayEvent::new(
                ReplayEventKind::Input,
                json!({ "id": "email", "value": "x" }),
            ))
            .await;
        batcher
            .enqueue(ReplayEvent::new(
                ReplayEventKind::Input,
                json!({ "id": "name", "value": "y" }),
            ))
            .await;
        assert_eq!(batcher.queued_events(), 2);
    }
}
