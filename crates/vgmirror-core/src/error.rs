//! Error types for fetching, sanitizing and refreshing the mirrored document.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a refresh cycle.
///
/// None of these ever reach an HTTP client: the refresher logs them and keeps
/// serving the last good document.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure talking to the upstream (DNS, connect, timeout, body read).
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Upstream answered with something other than 200 OK.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Upstream body exceeded the configured size limit.
    #[error("upstream body too large: {size} bytes (limit {limit})")]
    BodyTooLarge {
        /// Size reported or received.
        size: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// An embedded payload on the given line was not valid base64.
    #[error("invalid base64 payload on line {line}: {source}")]
    Decode {
        /// 1-based line number in the outer document.
        line: usize,
        /// Underlying decoder error.
        #[source]
        source: base64::DecodeError,
    },

    /// Sanitizing produced no output (e.g. an all-comment document).
    #[error("sanitized document is empty")]
    EmptyDocument,

    /// A bounded startup retry policy ran out of attempts.
    #[error("no successful load after {0} attempts")]
    RetriesExhausted(u32),
}

impl Error {
    /// Short, low-cardinality label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Status(_) => "status",
            Self::BodyTooLarge { .. } => "too_large",
            Self::Decode { .. } => "decode",
            Self::EmptyDocument => "empty",
            Self::RetriesExhausted(_) => "retries_exhausted",
        }
    }
}
