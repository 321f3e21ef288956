//! OpenTelemetry metrics.
//!
//! Key metrics:
//! - tether_cache_reconnect_attempts_total: Counter of scheduled reconnects
//! - tether_cache_connected: Gauge, 1 while the cache connection is up
//! - tether_cache_command_latency_seconds: Histogram of command round-trips

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// How often the OTLP exporter pushes.
const EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Tether metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Reconnect attempts scheduled after a failure.
    pub reconnect_attempts: Counter<u64>,
    /// 1 while connected, 0 otherwise.
    pub cache_connected: Gauge<i64>,
    /// Cache command latency in seconds.
    pub command_latency: Histogram<f64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            reconnect_attempts: meter
                .u64_counter("tether_cache_reconnect_attempts_total")
                .with_description("Reconnect attempts scheduled after a cache failure")
                .with_unit("1")
                .init(),
            cache_connected: meter
                .i64_gauge("tether_cache_connected")
                .with_description("1 while the cache connection is established")
                .with_unit("1")
                .init(),
            command_latency: meter
                .f64_histogram("tether_cache_command_latency_seconds")
                .with_description("Cache command latency including offline queueing")
                .with_unit("s")
                .init(),
        }
    }
}

/// Resource attributes attached to every exported data point.
fn resource() -> Resource {
    Resource::new([
        KeyValue::new("service.name", "tether"),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ])
}

/// Build the meter provider: OTLP push when an endpoint is given, otherwise
/// a manual reader that nothing ever collects.
fn meter_provider(otel_endpoint: Option<&str>) -> SdkMeterProvider {
    let Some(endpoint) = otel_endpoint else {
        return local_provider();
    };

    use opentelemetry_otlp::{Protocol, WithExportConfig};
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc);

    let built = opentelemetry_otlp::new_pipeline()
        .metrics(opentelemetry_sdk::runtime::Tokio)
        .with_exporter(exporter)
        .with_resource(resource())
        .with_period(EXPORT_INTERVAL)
        .build();
    match built {
        Ok(provider) => {
            tracing::info!(endpoint, "OTLP metrics exporter configured");
            provider
        }
        Err(e) => {
            tracing::warn!(endpoint, error = %e, "OTLP exporter unavailable, cache metrics stay in-process");
            local_provider()
        }
    }
}

fn local_provider() -> SdkMeterProvider {
    SdkMeterProvider::builder()
        .with_reader(ManualReader::builder().build())
        .with_resource(resource())
        .build()
}

/// Initialize the metrics system.
///
/// Only the first call installs a provider. The OTLP exporter needs a Tokio
/// runtime.
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        global::set_meter_provider(meter_provider(otel_endpoint));
        Metrics::new(&global::meter("tether"))
    });
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Record one scheduled reconnect to `address`.
pub fn record_reconnect_attempt(address: &str) {
    if let Some(m) = METRICS.get() {
        m.reconnect_attempts
            .add(1, &[KeyValue::new("cache.address", address.to_string())]);
    }
}

/// Record whether the connection to `address` is up.
pub fn record_cache_connected(address: &str, connected: bool) {
    if let Some(m) = METRICS.get() {
        m.cache_connected.record(
            i64::from(connected),
            &[KeyValue::new("cache.address", address.to_string())],
        );
    }
}

/// Record a completed cache command.
pub fn record_command_latency(latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        m.command_latency.record(latency_seconds, &[]);
    }
}
