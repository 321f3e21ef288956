//! Tether: backing-service clients for an API process.
//!
//! Builds a pooled SQLite database handle and a cache client that keeps
//! itself connected, retrying with a capped linear backoff
//! (`min(attempt * 50ms, 2000ms)` by default).
//!
//! # Modules
//!
//! - [`backoff`]: Reconnect delay policy
//! - [`cache`]: Self-reconnecting RESP cache client
//! - [`config`]: CLI and environment configuration
//! - [`context`]: Composition root handing out client handles
//! - [`database`]: SQLite connection pool
//! - [`observability`]: Tracing and metrics setup

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // cache::CacheClient is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc          // Panic docs can be verbose
)]

pub mod backoff;
pub mod cache;
pub mod config;
pub mod context;
pub mod database;
pub mod observability;
