//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing-subscriber
//! - OpenTelemetry metrics for cache connection health

pub mod metrics;
pub mod tracing;
