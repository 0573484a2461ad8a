//! vgmirror - HTTP mirror of a remote VPN server list.
//!
//! Serves a cached, comment-stripped copy of an upstream CSV at `/csv` so
//! many clients can be answered without hitting upstream on every request.
//!
//! # Architecture
//!
//! - **Config**: CLI flags with environment fallbacks, validated once
//! - **AppState**: The document cache and refresh counters, shared read-only
//! - **Routes**: `/csv` and `/health`; neither ever fetches upstream
//!
//! Fetching, sanitizing and the refresh loop live in `vgmirror-core`.

pub mod config;
mod routes;
mod state;

pub use self::config::{Args, Config, TlsConfig};
pub use self::routes::{CSV_PATH, X_SOURCE_DATE, app, router};
pub use self::state::AppState;
