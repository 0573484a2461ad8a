//! Prometheus metrics for refreshes and serving.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vgmirror_core::metrics::{init_metrics, start_metrics_server};
//!
//! let handle = init_metrics();
//! start_metrics_server(addr, handle).await?;
//! ```
//!
//! Metric names are prefixed with the component (`refresh_`, `document_`,
//! `csv_`); labels are limited to the small set returned by
//! [`crate::Error::reason`].

use std::net::SocketAddr;

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Refresh attempts, labelled by `phase` (`startup` or `periodic`).
pub const REFRESH_ATTEMPTS: &str = "refresh_attempts_total";
/// Successful refreshes (document installed).
pub const REFRESH_SUCCESS: &str = "refresh_success_total";
/// Failed refreshes, labelled by `reason`.
pub const REFRESH_FAILURES: &str = "refresh_failures_total";
/// Size of the current document in bytes.
pub const DOCUMENT_BYTES: &str = "document_bytes";
/// Unix timestamp of the current document's capture time.
pub const DOCUMENT_CAPTURED_AT: &str = "document_captured_at_seconds";
/// Requests answered from the cache.
pub const CSV_REQUESTS: &str = "csv_requests_total";

/// Initialize the Prometheus metrics recorder.
///
/// Returns `None` if a recorder is already installed (e.g. in tests).
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_metrics();
    Some(handle)
}

/// Serve `/metrics` on `addr` in a background task.
///
/// The listener is bound before returning so a bad address fails startup.
pub async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "metrics server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

/// Register descriptions for all metrics.
fn register_metrics() {
    describe_counter!(REFRESH_ATTEMPTS, "Fetch-and-sanitize attempts (label: phase)");
    describe_counter!(REFRESH_SUCCESS, "Refreshes that installed a new document");
    describe_counter!(REFRESH_FAILURES, "Refreshes that kept the old document (label: reason)");
    describe_gauge!(DOCUMENT_BYTES, "Size of the cached document in bytes");
    describe_gauge!(
        DOCUMENT_CAPTURED_AT,
        "Unix time at which the cached document was captured"
    );
    describe_counter!(CSV_REQUESTS, "Requests answered from the cached document");
}
