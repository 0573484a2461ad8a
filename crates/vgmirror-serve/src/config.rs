//! Configuration from command-line flags, with environment fallbacks.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vgmirror_core::FetchConfig;
use vgmirror_core::fetch::DEFAULT_MAX_BODY_BYTES;

/// Mirror a remote VPN server list with comments stripped.
#[derive(Parser, Debug, Clone)]
#[command(name = "vgmirror")]
#[command(version, about = "Cached, comment-stripped mirror of a remote VPN server list", long_about = None)]
pub struct Args {
    /// Remote CSV URL to mirror.
    #[arg(long, env = "VGMIRROR_URL")]
    pub url: String,

    /// Port to bind HTTP to.
    #[arg(long, env = "VGMIRROR_PORT", default_value_t = 80)]
    pub port: u16,

    /// Address to bind HTTP and HTTPS to.
    #[arg(long, env = "VGMIRROR_ADDR", default_value = "0.0.0.0")]
    pub addr: IpAddr,

    /// Seconds between refreshes of the cached CSV.
    #[arg(long, env = "VGMIRROR_SLEEP", default_value_t = 600)]
    pub sleep: u64,

    /// Certificate file (PEM) for HTTPS.
    #[arg(long, env = "VGMIRROR_CERT")]
    pub cert: Option<PathBuf>,

    /// Private key file (PEM) for HTTPS.
    #[arg(long, env = "VGMIRROR_KEY")]
    pub key: Option<PathBuf>,

    /// Port to bind HTTPS to when a certificate is given.
    #[arg(long, env = "VGMIRROR_TLS_PORT", default_value_t = 443)]
    pub tls_port: u16,

    /// Enable gzip response compression.
    #[arg(long, env = "VGMIRROR_GZIP")]
    pub gzip: bool,

    /// Upstream request timeout in seconds.
    #[arg(long, env = "VGMIRROR_FETCH_TIMEOUT", default_value_t = 30)]
    pub fetch_timeout: u64,

    /// Reject upstream bodies larger than this many bytes.
    #[arg(long, env = "VGMIRROR_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: u64,

    /// Directory for rotated log files (stdout only when unset).
    #[arg(long, env = "VGMIRROR_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Prometheus metrics port (0 to disable).
    #[arg(long, env = "VGMIRROR_METRICS_PORT", default_value_t = 0)]
    pub metrics_port: u16,
}

/// HTTPS listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream URL.
    pub url: String,

    /// HTTP listen address.
    pub http_addr: SocketAddr,

    /// Time between periodic refreshes.
    pub refresh_interval: Duration,

    /// HTTPS listener, if a certificate and key were given.
    pub tls: Option<TlsConfig>,

    /// Whether responses are gzip-compressed on request.
    pub gzip: bool,

    /// Upstream request timeout.
    pub fetch_timeout: Duration,

    /// Upstream body size limit.
    pub max_body_bytes: u64,

    /// Metrics listen address, if enabled.
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    /// Validate parsed arguments.
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        let url = args.url.trim().to_string();
        let parsed = url::Url::parse(&url)
            .map_err(|e| anyhow::anyhow!("invalid --url '{url}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("--url must be an http or https URL, got '{url}'");
        }

        if args.sleep == 0 {
            anyhow::bail!("--sleep must be at least 1 second");
        }
        if args.fetch_timeout == 0 {
            anyhow::bail!("--fetch-timeout must be at least 1 second");
        }

        let tls = match (args.cert, args.key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                addr: SocketAddr::new(args.addr, args.tls_port),
                cert_path,
                key_path,
            }),
            (None, None) => None,
            _ => anyhow::bail!("--cert and --key must be given together"),
        };

        let metrics_addr =
            (args.metrics_port != 0).then(|| SocketAddr::new(args.addr, args.metrics_port));

        let config = Self {
            url,
            http_addr: SocketAddr::new(args.addr, args.port),
            refresh_interval: Duration::from_secs(args.sleep),
            tls,
            gzip: args.gzip,
            fetch_timeout: Duration::from_secs(args.fetch_timeout),
            max_body_bytes: args.max_body_bytes,
            metrics_addr,
        };

        tracing::info!(
            url = %config.url,
            http_addr = %config.http_addr,
            https_addr = ?config.tls.as_ref().map(|t| t.addr),
            refresh_interval_secs = config.refresh_interval.as_secs(),
            gzip = config.gzip,
            metrics_addr = ?config.metrics_addr,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Settings for the upstream fetcher.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            url: self.url.clone(),
            timeout: self.fetch_timeout,
            max_body_bytes: self.max_body_bytes,
        }
    }
}
