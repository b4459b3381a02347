//! Prometheus metrics recorder and server.
//!
//! Counters recorded by the ingestion handlers:
//!
//! - `app.errors.total{errorType, source, userId}` - accepted error events
//!   (events, not distinct groups)
//! - `app.custom_events.total{eventName}` - accepted custom events
//! - `app.replay_events.total` - replay events received across batches
//! - `app.pageviews.total{page}` - page views

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

use crate::TelemetryError;

/// Initialise the Prometheus metrics recorder.
///
/// Must be called once at startup, before any counter is touched.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, TelemetryError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))
}

/// Create the metrics router exposing `GET /metrics`.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

/// Run the metrics server on its own address until `shutdown` resolves.
pub async fn run_metrics_server<F>(
    addr: SocketAddr,
    handle: PrometheusHandle,
    shutdown: F,
) -> Result<(), TelemetryError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Metrics server listening");

    axum::serve(listener, metrics_router(handle))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        // Recorder installation is process-global; tolerate another test
        // having installed it first.
        let handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => return,
        };

        metrics::counter!("app.errors.total", "errorType" => "TypeError").increment(1);

        let response = metrics_router(handle)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
