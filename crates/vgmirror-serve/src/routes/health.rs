//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    source_date: String,
    document_bytes: usize,
    document_age_secs: u64,
    refresh_interval_secs: u64,
    refresh: RefreshHealth,
}

/// Refresh counters as reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshHealth {
    successes: u64,
    failures: u64,
    consecutive_failures: u64,
    last_failure_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Public health check endpoint.
///
/// Always 200 while the process is up: a stale document is still served.
/// `status` is `"stale"` when the most recent refresh attempt failed.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let document = state.cache.snapshot();
    let refresh = state.stats.status();

    let status = if refresh.consecutive_failures == 0 {
        "ok"
    } else {
        "stale"
    };

    Json(HealthResponse {
        status,
        service: "vgmirror",
        version: env!("CARGO_PKG_VERSION"),
        source_date: document.source_date(),
        document_bytes: document.byte_length,
        document_age_secs: document.age_secs(Utc::now()),
        refresh_interval_secs: state.config.refresh_interval.as_secs(),
        refresh: RefreshHealth {
            successes: refresh.successes,
            failures: refresh.failures,
            consecutive_failures: refresh.consecutive_failures,
            last_failure_at: refresh.last_failure_at,
            last_error: refresh.last_error,
        },
    })
}
