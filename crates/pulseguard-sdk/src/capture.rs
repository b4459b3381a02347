//! Global error capture and manual reporting.
//!
//! [`Telemetry::init`] wires the whole client pipeline together: transport,
//! duplicate suppression, trace-context correlation, and the replay batcher.
//! Capture never blocks and never throws into the host application; a
//! monitoring SDK that crashes its host is worse than one that loses an
//! event.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::batcher::{BatcherConfig, EventBatcher};
use crate::config::SdkConfig;
use crate::context::active_trace_context;
use crate::dedup::DeduplicationCache;
use crate::events::{CapturedError, CustomEvent, ErrorEvent, PageView, Rejection, ReplayEvent};
use crate::session::generate_session_id;
use crate::transport::{HttpTransport, Transport, TransportError};

/// Handle to the client telemetry pipeline.
///
/// Cloning is cheap; all clones share one session. When initialisation is
/// refused (invalid project id, transport construction failure) the handle is
/// inert: every operation is a silent no-op.
#[derive(Clone)]
pub struct Telemetry {
    inner: Option<Arc<CaptureInner>>,
}

struct CaptureInner {
    project_id: Uuid,
    user_id: Option<String>,
    app_url: String,
    user_agent: String,
    session_id: String,
    transport: Arc<dyn Transport>,
    dedup: Mutex<DeduplicationCache>,
    batcher: EventBatcher,
}

/// Source position of a captured error, when known.
#[derive(Debug, Clone, Default)]
struct Origin {
    source: Option<String>,
    line: Option<u32>,
    column: Option<u32>,
}

impl Telemetry {
    /// Initialise the telemetry pipeline.
    ///
    /// A malformed project id or a transport that cannot be constructed
    /// yields an inert handle rather than an error: the host application
    /// must keep running whether or not monitoring does.
    #[must_use]
    pub fn init(config: SdkConfig) -> Self {
        let Some(project_id) = config.parsed_project_id() else {
            tracing::warn!(
                project_id = %config.project_id,
                "Invalid project id, telemetry disabled"
            );
            return Self { inner: None };
        };

        let transport: Arc<dyn Transport> = match HttpTransport::new(&config, project_id) {
            Ok(transport) => Arc::new(transport),
            Err(error) => {
                tracing::warn!(error = %error, "Transport construction failed, telemetry disabled");
                return Self { inner: None };
            }
        };

        Self::with_transport(config, transport)
    }

    /// Initialise with a custom transport.
    ///
    /// The project id is still validated; an invalid id yields an inert
    /// handle exactly as [`Telemetry::init`] does.
    #[must_use]
    pub fn with_transport(config: SdkConfig, transport: Arc<dyn Transport>) -> Self {
        let Some(project_id) = config.parsed_project_id() else {
            tracing::warn!(
                project_id = %config.project_id,
                "Invalid project id, telemetry disabled"
            );
            return Self { inner: None };
        };

        let session_id = generate_session_id();
        let batcher = EventBatcher::new(
            transport.clone(),
            BatcherConfig::from(&config),
            session_id.clone(),
            config.app_url.clone(),
            config.user_agent.clone(),
        );

        Self {
            inner: Some(Arc::new(CaptureInner {
                project_id,
                user_id: config.user_id,
                app_url: config.app_url,
                user_agent: config.user_agent,
                session_id,
                transport,
                dedup: Mutex::new(DeduplicationCache::new(config.dedup_ttl)),
                batcher,
            })),
        }
    }

    /// Whether the pipeline is live (as opposed to inert).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    /// Session id of this pipeline, when live.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.inner.as_ref().map(|inner| inner.session_id.as_str())
    }

    /// The replay batcher, when live.
    #[must_use]
    pub fn batcher(&self) -> Option<&EventBatcher> {
        self.inner.as_ref().map(|inner| &inner.batcher)
    }

    /// Install a panic hook that reports unrecovered panics.
    ///
    /// The hook normalises the panic payload and location into an error
    /// event, suppresses bursts through the duplicate cache, marks the
    /// session replay, and chains to the previously installed hook. It is
    /// careful to never panic itself.
    pub fn install_panic_hook(&self) {
        let Some(inner) = self.inner.clone() else {
            return;
        };

        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            let message = panic_message(panic_info);
            let origin = panic_info.location().map_or_else(Origin::default, |loc| Origin {
                source: Some(loc.file().to_owned()),
                line: Some(loc.line()),
                column: Some(loc.column()),
            });
            let stack = std::backtrace::Backtrace::force_capture().to_string();

            let error = CapturedError::new(message)
                .with_type("panic")
                .with_stack(stack);
            inner.capture(error, origin, None, true, true);

            previous(panic_info);
        }));
    }

    /// Report an abandoned asynchronous operation.
    ///
    /// Non-error reasons are wrapped into an error via their textual form,
    /// so reporting can never itself fail on an unusual payload.
    pub fn capture_rejection(&self, reason: impl Into<Rejection>) {
        let Some(inner) = &self.inner else { return };
        let error = reason.into().into_captured();
        inner.capture(error, Origin::default(), None, true, true);
    }

    /// Manually report an error.
    ///
    /// Explicit reports are assumed intentional and bypass duplicate
    /// suppression.
    pub fn report_error(
        &self,
        error: impl Into<CapturedError>,
        component_context: Option<&str>,
    ) {
        let Some(inner) = &self.inner else { return };
        inner.capture(
            error.into(),
            Origin::default(),
            component_context.map(str::to_owned),
            false,
            false,
        );
    }

    /// Report a custom (non-error) telemetry event.
    pub fn report_custom_event(&self, event_name: &str, event_data: serde_json::Value) {
        let Some(inner) = &self.inner else { return };

        let event = CustomEvent {
            event_name: event_name.to_owned(),
            event_data,
            timestamp: chrono::Utc::now().timestamp_millis(),
            session_id: inner.session_id.clone(),
            user_id: inner.user_id.clone(),
            project_id: inner.project_id,
            url: inner.app_url.clone(),
            user_agent: inner.user_agent.clone(),
        };

        let transport = inner.transport.clone();
        spawn_delivery(async move { transport.send_custom_event(&event).await });
    }

    /// Report a page view.
    pub fn report_page_view(&self, page: &str, referrer: Option<String>) {
        let Some(inner) = &self.inner else { return };

        let view = PageView {
            page: page.to_owned(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            user_id: inner
                .user_id
                .clone()
                .unwrap_or_else(|| "anonymous".to_owned()),
            referrer,
            user_agent: inner.user_agent.clone(),
        };

        let transport = inner.transport.clone();
        spawn_delivery(async move { transport.send_page_view(&view).await });
    }

    /// Append a session-replay event to the batcher.
    pub async fn record_replay_event(&self, event: ReplayEvent) {
        if let Some(inner) = &self.inner {
            inner.batcher.enqueue(event).await;
        }
    }
}

impl CaptureInner {
    /// Normalise, deduplicate, correlate, and deliver an error.
    ///
    /// `deduplicate` applies the burst-suppression window (global handlers);
    /// `mark_replay` records an error marker event and forces a replay flush.
    fn capture(
        self: &Arc<Self>,
        error: CapturedError,
        origin: Origin,
        component_context: Option<String>,
        deduplicate: bool,
        mark_replay: bool,
    ) {
        if deduplicate {
            let is_duplicate = self
                .dedup
                .lock()
                .map(|mut cache| cache.is_duplicate(&error.message))
                .unwrap_or(false);
            if is_duplicate {
                tracing::debug!(message = %error.message, "Suppressed duplicate error report");
                return;
            }
        }

        let event = ErrorEvent {
            message: error.message.clone(),
            source: origin.source,
            line: origin.line,
            column: origin.column,
            stack: error.stack.clone(),
            error_type: error.type_name,
            component_stack: component_context,
            timestamp: chrono::Utc::now().timestamp_millis(),
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            project_id: self.project_id,
            url: self.app_url.clone(),
            user_agent: self.user_agent.clone(),
            trace_context: active_trace_context(),
        };

        let transport = self.transport.clone();
        spawn_delivery(async move { transport.send_error(&event).await });

        if mark_replay {
            let batcher = self.batcher.clone();
            let payload = serde_json::json!({
                "message": error.message,
                "stack": error.stack,
            });
            spawn_task(async move {
                batcher.record_error(payload).await;
            });
        }
    }
}

/// Extract a readable message from a panic payload.
fn panic_message(panic_info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = panic_info.payload();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Spawn a delivery future, logging (never propagating) its failure.
///
/// Delivery is fire-and-forget: the capture path is done the moment the task
/// is handed to the runtime. Without a runtime the event is dropped with a
/// warning, which is the accepted-loss contract.
fn spawn_delivery<F>(future: F)
where
    F: std::future::Future<Output = Result<(), TransportError>> + Send + 'static,
{
    spawn_task(async move {
        if let Err(error) = future.await {
            tracing::warn!(error = %error, "Telemetry delivery failed");
        }
    });
}

fn spawn_task<F>(future: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => {
            tracing::warn!("No async runtime available, telemetry event dropped");
        }
    }
}
