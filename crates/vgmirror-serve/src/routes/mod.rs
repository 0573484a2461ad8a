//! Route definitions.
//!
//! ## Routes
//!
//! - `GET /csv` - The sanitized server list
//! - `GET /health` - Health check (JSON)

mod csv;
mod health;

use std::net::SocketAddr;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::state::AppState;

pub use self::csv::X_SOURCE_DATE;

/// Path of the mirrored document.
pub const CSV_PATH: &str = "/csv";

/// Build the route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CSV_PATH, get(csv::csv_handler))
        .route("/health", get(health::health_check))
        .with_state(state)
}

/// Build the router with request tracing, CORS and optional gzip.
pub fn app(state: AppState) -> Router {
    let gzip = state.config.gzip;

    let app = router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let remote = request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.to_string())
                    .unwrap_or_default();
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    remote = %remote,
                )
            })
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    if gzip {
        tracing::info!("gzip compression enabled");
        app.layer(CompressionLayer::new().gzip(true))
    } else {
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, StatusCode, header};
    use axum::response::Response;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use clap::Parser;
    use tower::ServiceExt;
    use vgmirror_core::{
        Document, DocumentCache, Error, Fetch, RefreshStats, Refresher, Result,
    };

    use crate::config::{Args, Config};

    const BODY: &str = "*vpn_servers\npublic-vpn-1,1.2.3.4,JP,Y2xpZW50Cg==\n*\n";

    fn config(extra: &[&str]) -> Config {
        let mut argv = vec!["vgmirror", "--url", "http://upstream.test/api/iphone/"];
        argv.extend_from_slice(extra);
        Config::from_args(Args::try_parse_from(argv).unwrap()).unwrap()
    }

    fn state_with(cache: DocumentCache, stats: Arc<RefreshStats>, extra: &[&str]) -> AppState {
        AppState::new(config(extra), cache, stats)
    }

    fn fixed_cache() -> DocumentCache {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        DocumentCache::from_document(Document::with_capture_time(BODY.to_string(), at))
    }

    async fn send(app: Router, method: Method, uri: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    /// Upstream that is always down.
    struct DownUpstream;

    impl Fetch for DownUpstream {
        async fn fetch(&self) -> Result<Bytes> {
            Err(Error::Status(503))
        }
    }

    #[tokio::test]
    async fn csv_serves_snapshot_with_headers() {
        let app = router(state_with(fixed_cache(), Arc::default(), &[]));
        let response = send(app, Method::GET, CSV_PATH).await;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(headers[header::CONTENT_LENGTH], BODY.len().to_string().as_str());
        assert_eq!(headers[&X_SOURCE_DATE], "2024-05-01T12:00:00Z");
        assert_eq!(body_bytes(response).await, BODY.as_bytes());
    }

    #[tokio::test]
    async fn csv_head_has_headers_without_body() {
        let app = router(state_with(fixed_cache(), Arc::default(), &[]));
        let response = send(app, Method::HEAD, CSV_PATH).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            BODY.len().to_string().as_str()
        );
        assert!(response.headers().contains_key(&X_SOURCE_DATE));
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn csv_reflects_replaced_document() {
        let cache = fixed_cache();
        let state = state_with(cache.clone(), Arc::default(), &[]);

        let installed = cache.replace("fresh,line\n".to_string());
        let response = send(router(state), Method::GET, CSV_PATH).await;

        assert_eq!(
            response.headers()[&X_SOURCE_DATE],
            installed.source_date().as_str()
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
        assert_eq!(body_bytes(response).await, "fresh,line\n".as_bytes());
    }

    #[tokio::test]
    async fn csv_rejects_other_methods() {
        let app = router(state_with(fixed_cache(), Arc::default(), &[]));
        let response = send(app, Method::POST, CSV_PATH).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let app = router(state_with(fixed_cache(), Arc::default(), &[]));
        let response = send(app, Method::GET, "/csv/extra").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_source_date_and_marks_stale() {
        let cache = fixed_cache();
        let refresher = Refresher::new(DownUpstream, std::time::Duration::from_secs(600));
        let state = state_with(cache.clone(), refresher.stats(), &[]);

        let before = send(router(state.clone()), Method::GET, CSV_PATH).await;
        let before_date = before.headers()[&X_SOURCE_DATE].clone();

        assert!(refresher.refresh(&cache).await.is_err());

        let after = send(router(state.clone()), Method::GET, CSV_PATH).await;
        assert_eq!(after.status(), StatusCode::OK);
        assert_eq!(after.headers()[&X_SOURCE_DATE], before_date);
        assert_eq!(body_bytes(after).await, BODY.as_bytes());

        let health = send(router(state), Method::GET, "/health").await;
        assert_eq!(health.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(health).await).unwrap();
        assert_eq!(json["status"], "stale");
        assert_eq!(json["refresh"]["consecutive_failures"], 1);
        assert!(
            json["refresh"]["last_error"]
                .as_str()
                .unwrap()
                .contains("503")
        );
    }

    #[tokio::test]
    async fn health_reports_document() {
        let app = router(state_with(fixed_cache(), Arc::default(), &["--sleep", "120"]));
        let response = send(app, Method::GET, "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "vgmirror");
        assert_eq!(json["source_date"], "2024-05-01T12:00:00Z");
        assert_eq!(json["document_bytes"], BODY.len());
        assert_eq!(json["refresh_interval_secs"], 120);
        assert!(json["refresh"]["last_error"].is_null());
    }

    #[tokio::test]
    async fn app_gzip_keeps_source_date() {
        let app = app(state_with(fixed_cache(), Arc::default(), &["--gzip"]));
        let request = Request::builder()
            .uri(CSV_PATH)
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[&X_SOURCE_DATE], "2024-05-01T12:00:00Z");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn app_logs_each_request_at_info() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = app(state_with(fixed_cache(), Arc::default(), &[]));
        let response = send(app, Method::GET, CSV_PATH).await;
        assert_eq!(response.status(), StatusCode::OK);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("started processing request"), "{output}");
        assert!(output.contains("finished processing request"), "{output}");
        assert!(output.contains("path=/csv"), "{output}");
    }

    #[tokio::test]
    async fn app_without_gzip_sends_identity() {
        let app = app(state_with(fixed_cache(), Arc::default(), &[]));
        let request = Request::builder()
            .uri(CSV_PATH)
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(body_bytes(response).await, BODY.as_bytes());
    }
}
