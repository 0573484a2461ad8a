//! Core of the vgmirror server-list mirror.
//!
//! This crate provides:
//! - Comment stripping for the upstream list and its embedded base64 configs
//! - The upstream HTTP fetcher
//! - A single-document cache with consistent snapshots
//! - The startup/periodic refresh loop that ties them together
//! - Prometheus metrics helpers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   bytes   ┌────────────┐  String  ┌──────────────┐
//! │ HttpFetcher ├──────────►│  sanitize  ├─────────►│  Refresher   │
//! └─────────────┘           └────────────┘          └──────┬───────┘
//!                                                          │ replace
//!                                                          ▼
//!                                  HTTP handlers ◄── DocumentCache (snapshot)
//! ```

pub mod cache;
mod error;
pub mod fetch;
pub mod metrics;
pub mod refresh;
pub mod sanitize;

pub use cache::{Document, DocumentCache};
pub use error::{Error, Result};
pub use fetch::{Fetch, FetchConfig, HttpFetcher};
pub use refresh::{RefreshStats, RefreshStatus, Refresher, RetryPolicy};
pub use sanitize::sanitize;
