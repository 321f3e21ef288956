//! SQLite database access for Tether.
//!
//! Provides:
//! - A pooled connection handle with per-connection pragmas
//! - A cheap liveness query for health checks

mod pool;

pub use pool::{Database, DatabaseError};
