//! The mirrored CSV endpoint.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use vgmirror_core::metrics::CSV_REQUESTS;

use crate::state::AppState;

/// Capture time of the served document, so clients can see its age.
pub const X_SOURCE_DATE: HeaderName = HeaderName::from_static("x-source-date");

/// Serve the current document from one cache snapshot.
///
/// Route: `GET /csv`
pub async fn csv_handler(State(state): State<AppState>) -> Response {
    let document = state.cache.snapshot();
    counter!(CSV_REQUESTS).increment(1);

    let source_date = document.source_date();
    tracing::debug!(
        bytes = document.byte_length,
        source_date = %source_date,
        "answering csv request"
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(document.byte_length),
    );
    if let Ok(value) = HeaderValue::from_str(&source_date) {
        headers.insert(X_SOURCE_DATE, value);
    }

    (StatusCode::OK, headers, document.content.clone()).into_response()
}
