//! PulseGuard Telemetry binary entry point.
//!
//! Starts the telemetry service with:
//! - Ingestion + management API (port 8480)
//! - Prometheus metrics (port 9480)
//! - Background occurrence retention sweep

use std::sync::Arc;

use pulseguard_telemetry::{
    errors::{
        error_router, ErrorAggregator, ErrorApiState, ErrorFingerprinter, ErrorStore,
        FingerprintConfig,
    },
    ingest::{ingest_router_with_limit, IngestState},
    metrics::{init_metrics_recorder, run_metrics_server},
    retention::start_retention_sweep,
    TelemetryConfig,
};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulseguard_telemetry=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting pulseguard-telemetry");

    let config = TelemetryConfig::load()?;
    tracing::info!(
        http_addr = %config.server.http_addr,
        metrics_addr = %config.server.metrics_addr,
        "Configuration loaded"
    );

    let metrics_handle = init_metrics_recorder()?;

    let store = Arc::new(ErrorStore::new());
    let fingerprinter = ErrorFingerprinter::with_config(FingerprintConfig {
        include_stack_frames: config.aggregation.fingerprint_stack_frames,
    });
    let aggregator = Arc::new(ErrorAggregator::with_fingerprinter(store, fingerprinter));

    let sweep_handle = start_retention_sweep(aggregator.clone(), config.retention.clone());

    let ingest_state = IngestState {
        aggregator: aggregator.clone(),
        default_environment: config.ingest.default_environment.clone(),
    };
    let app = ingest_router_with_limit(ingest_state, config.ingest.max_body_bytes)
        .nest("/errors", error_router(ErrorApiState::new(aggregator)));

    let http_addr = config.server.http_addr;
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server =
        axum::serve(http_listener, app).with_graceful_shutdown(shutdown_signal("HTTP"));

    let metrics_server = run_metrics_server(
        config.server.metrics_addr,
        metrics_handle,
        shutdown_signal("Metrics"),
    );

    tracing::info!(
        http = %http_addr,
        metrics = %config.server.metrics_addr,
        "Servers starting"
    );

    tokio::select! {
        result = http_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        result = metrics_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Metrics server error");
            }
        }
    }

    tracing::info!("Shutting down background tasks");
    sweep_handle.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Create a shutdown signal future for graceful shutdown.
async fn shutdown_signal(server_name: &'static str) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!(server = server_name, "Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!(server = server_name, "Received SIGTERM, initiating shutdown");
        }
    }
}
