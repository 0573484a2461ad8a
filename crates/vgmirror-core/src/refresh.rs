//! Startup load and periodic refresh of the cached document.
//!
//! ```text
//!   bootstrap():  fetch ─► sanitize ─► ok? ──yes──► DocumentCache::new
//!                   ▲                   │
//!                   └──── sleep(backoff)┘ no
//!
//!   run_periodic():  every interval ─► spawn { fetch ─► sanitize ─► replace | log }
//! ```
//!
//! Periodic refreshes are independent tasks. A slow upstream can make two of
//! them overlap; each is a full re-derivation from upstream, so whichever
//! finishes last simply wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cache::{Document, DocumentCache};
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::metrics::{
    DOCUMENT_BYTES, DOCUMENT_CAPTURED_AT, REFRESH_ATTEMPTS, REFRESH_FAILURES, REFRESH_SUCCESS,
};
use crate::sanitize::sanitize;

/// Default time between periodic refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// Default pause between failed startup attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// How the startup load retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts.
    pub backoff: Duration,
    /// Give up after this many attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever with a fixed backoff.
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            backoff,
            max_attempts: None,
        }
    }

    /// Retry at most `max_attempts` times in total.
    pub fn bounded(backoff: Duration, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(max_attempts),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(DEFAULT_RETRY_BACKOFF)
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Startup,
    Periodic,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Periodic => "periodic",
        }
    }
}

/// Point-in-time view of refresh health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStatus {
    /// Refreshes that installed a document.
    pub successes: u64,
    /// Attempts that failed.
    pub failures: u64,
    /// Failures since the last success.
    pub consecutive_failures: u64,
    /// When the most recent failure happened.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// Refresh counters shared between the refresher and diagnostics.
#[derive(Debug, Default)]
pub struct RefreshStats {
    status: Mutex<RefreshStatus>,
}

impl RefreshStats {
    fn record_success(&self) {
        let mut status = self.status.lock();
        status.successes += 1;
        status.consecutive_failures = 0;
    }

    fn record_failure(&self, error: &Error) {
        let mut status = self.status.lock();
        status.failures += 1;
        status.consecutive_failures += 1;
        status.last_failure_at = Some(Utc::now());
        status.last_error = Some(error.to_string());
    }

    /// Copy of the current counters.
    pub fn status(&self) -> RefreshStatus {
        self.status.lock().clone()
    }
}

/// Drives fetch → sanitize → install, once at startup and then on a timer.
pub struct Refresher<F> {
    fetcher: Arc<F>,
    interval: Duration,
    retry: RetryPolicy,
    stats: Arc<RefreshStats>,
}

impl<F> Clone for Refresher<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            interval: self.interval,
            retry: self.retry,
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<F: Fetch> Refresher<F> {
    /// Create a refresher with the default (unbounded, 1s) startup retry policy.
    ///
    /// # Panics
    ///
    /// [`run_periodic`](Self::run_periodic) panics if `interval` is zero.
    pub fn new(fetcher: F, interval: Duration) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            interval,
            retry: RetryPolicy::default(),
            stats: Arc::new(RefreshStats::default()),
        }
    }

    /// Replace the startup retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shared refresh counters.
    pub fn stats(&self) -> Arc<RefreshStats> {
        Arc::clone(&self.stats)
    }

    /// Time between periodic refreshes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch and sanitize once, without touching any cache.
    pub async fn load(&self) -> Result<String> {
        let raw = self.fetcher.fetch().await?;
        sanitize(&raw)
    }

    async fn attempt(&self, phase: Phase) -> Result<String> {
        counter!(REFRESH_ATTEMPTS, "phase" => phase.as_str()).increment(1);

        self.load().await.inspect_err(|e| {
            self.stats.record_failure(e);
            counter!(REFRESH_FAILURES, "reason" => e.reason()).increment(1);
        })
    }

    fn record_installed(&self, document: &Document) {
        self.stats.record_success();
        counter!(REFRESH_SUCCESS).increment(1);
        gauge!(DOCUMENT_BYTES).set(document.byte_length as f64);
        gauge!(DOCUMENT_CAPTURED_AT).set(document.captured_at.timestamp() as f64);
    }

    /// Load once at startup, retrying per the [`RetryPolicy`] until it succeeds.
    ///
    /// The cache only comes into existence here, so nothing can serve from it
    /// before a document exists.
    pub async fn bootstrap(&self) -> Result<DocumentCache> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match self.attempt(Phase::Startup).await {
                Ok(content) => {
                    let cache = DocumentCache::new(content);
                    let document = cache.snapshot();
                    self.record_installed(&document);
                    tracing::info!(
                        attempts,
                        bytes = document.byte_length,
                        "initial document loaded"
                    );
                    return Ok(cache);
                }
                Err(e) if self.retry.max_attempts.is_some_and(|max| attempts >= max) => {
                    tracing::error!(attempts, error = %e, "giving up on initial load");
                    return Err(Error::RetriesExhausted(attempts));
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempts,
                        error = %e,
                        retry_in_ms = self.retry.backoff.as_millis() as u64,
                        "initial load failed, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
            }
        }
    }

    /// Run one refresh cycle against `cache`.
    ///
    /// On failure the previous document stays in place and the error is
    /// logged before being returned.
    pub async fn refresh(&self, cache: &DocumentCache) -> Result<Arc<Document>> {
        match self.attempt(Phase::Periodic).await {
            Ok(content) => {
                let document = cache.replace(content);
                self.record_installed(&document);
                tracing::info!(bytes = document.byte_length, "refresh finished");
                Ok(document)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    reason = e.reason(),
                    "refresh failed, keeping previous document"
                );
                Err(e)
            }
        }
    }

    /// Spawn [`run_periodic`](Self::run_periodic) as a background task.
    pub fn spawn(&self, cache: DocumentCache) -> JoinHandle<()> {
        let refresher = self.clone();
        tokio::spawn(async move { refresher.run_periodic(cache).await })
    }

    /// Refresh `cache` every interval, forever.
    ///
    /// The first tick fires one interval from now. Each tick spawns its own
    /// refresh task so a slow upstream never delays the next tick.
    pub async fn run_periodic(&self, cache: DocumentCache) {
        let mut ticks = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "starting periodic refresh"
        );

        loop {
            ticks.tick().await;

            let refresher = self.clone();
            let cache = cache.clone();
            tokio::spawn(async move {
                // Failures are logged and counted inside `refresh`.
                let _ = refresher.refresh(&cache).await;
            });
        }
    }
}
