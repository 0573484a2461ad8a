//! Application state shared by all request handlers.

use std::sync::Arc;

use vgmirror_core::{DocumentCache, RefreshStats};

use crate::config::Config;

/// Shared application state available to all request handlers.
///
/// Handlers only read from it; the refresher owns all writes to the cache.
#[derive(Clone)]
pub struct AppState {
    /// The mirrored document.
    pub cache: DocumentCache,

    /// Refresh counters, for health reporting.
    pub stats: Arc<RefreshStats>,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Create the state once the first document has been loaded.
    pub fn new(config: Config, cache: DocumentCache, stats: Arc<RefreshStats>) -> Self {
        let document = cache.snapshot();
        tracing::info!(
            bytes = document.byte_length,
            source_date = %document.source_date(),
            "application state initialized"
        );

        Self {
            cache,
            stats,
            config: Arc::new(config),
        }
    }
}
