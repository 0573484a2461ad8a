//! vgmirror - cached, comment-stripped mirror of a remote VPN server list.
//!
//! Loads the upstream document before binding any listener (retrying every
//! second until it succeeds), then serves it over HTTP and optionally HTTPS
//! while refreshing it in the background.

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vgmirror_core::metrics::{init_metrics, start_metrics_server};
use vgmirror_core::{HttpFetcher, Refresher};
use vgmirror_serve::{AppState, Args, Config, TlsConfig, app};

/// Rotated log files kept in `--log-dir`.
const MAX_LOG_FILES: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments; a missing --url prints usage and exits
    let args = Args::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&args)?;

    // reqwest and the TLS listener share one rustls provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = Config::from_args(args)?;

    if let Some(addr) = config.metrics_addr {
        if let Some(handle) = init_metrics() {
            start_metrics_server(addr, handle)
                .await
                .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
        }
    }

    // Block until the first document is loaded; nothing listens before that
    let fetcher = HttpFetcher::new(config.fetch_config())?;
    tracing::info!(url = %fetcher.url(), "loading initial document");
    let refresher = Refresher::new(fetcher, config.refresh_interval);
    let cache = refresher.bootstrap().await?;

    let _refresh_task = refresher.spawn(cache.clone());
    tracing::info!(
        interval_secs = refresher.interval().as_secs(),
        "background refresh scheduled"
    );

    let state = AppState::new(config.clone(), cache, refresher.stats());
    let app = app(state);

    // Either listener failing is fatal
    match &config.tls {
        Some(tls) => {
            tokio::try_join!(
                serve_http(config.http_addr, app.clone()),
                serve_https(tls, app)
            )?;
        }
        None => serve_http(config.http_addr, app).await?,
    }

    Ok(())
}

/// Install the global subscriber: stdout, plus rotated files when `--log-dir` is set.
fn init_tracing(args: &Args) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(format!("vg{}", args.port))
                .filename_suffix("log")
                .max_log_files(MAX_LOG_FILES)
                .build(dir)
                .with_context(|| format!("failed to open log directory {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn serve_http(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;
    tracing::info!(addr = %addr, "starting HTTP server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn serve_https(tls: &TlsConfig, app: Router) -> anyhow::Result<()> {
    let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .with_context(|| {
            format!(
                "failed to load TLS certificate {} / key {}",
                tls.cert_path.display(),
                tls.key_path.display()
            )
        })?;
    tracing::info!(addr = %tls.addr, "starting HTTPS server");

    axum_server::bind_rustls(tls.addr, rustls)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .with_context(|| format!("HTTPS listener on {} failed", tls.addr))?;

    Ok(())
}
