//! Tether: database and cache clients with reconnect backoff.
//!
//! # Usage
//!
//! ```bash
//! tether --cache-host localhost --database-url file:./data/app.db
//! tether --check
//! ```
//!
//! Environment variables can also be used:
//! - `REDIS_HOST` / `REDIS_PORT`: Cache server (default `cache:6379`)
//! - `DATABASE_URL`: Database location (`file:<path>`)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tether::config::Config;
use tether::context::AppContext;
use tether::observability::metrics::init_metrics_with_endpoint;
use tether::observability::tracing::init_tracing;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  Tether v{}

  Configuration:
    Cache:        {}:{}
    Retry:        +{}ms per attempt, max {}ms
    Database:     {} (pool {})
    Log Level:    {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.cache_host,
        config.cache_port,
        config.cache_retry_step_ms,
        config.cache_retry_ceiling_ms,
        config.database_url,
        config.database_pool_size,
        config.log_level
    );
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

        tokio::select! {
            result = ctrl_c => {
                result.context("failed to listen for ctrl+c")?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("failed to listen for ctrl+c")?;
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();
    config.validate().context("invalid configuration")?;

    init_tracing(&config.log_level);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let context = AppContext::connect(&config, shutdown_rx).context("failed to start clients")?;

    if config.check {
        let timeout = Duration::from_millis(config.cache_connect_timeout_ms);
        // Give the cache one connect window before probing.
        let _ = context.cache().wait_connected(timeout).await;
        let report = context.health(timeout).await;
        println!("{}", serde_json::to_string_pretty(&report)?);

        let _ = shutdown_tx.send(true);
        context.shutdown().await?;
        if !report.healthy {
            bail!("health check failed");
        }
        return Ok(());
    }

    print_banner(&config);

    let report = context.health(Duration::from_secs(1)).await;
    tracing::info!(
        database_ok = report.database.ok,
        cache_ok = report.cache.ok,
        "Initial health check"
    );

    shutdown_signal().await?;
    let _ = shutdown_tx.send(true);
    context.shutdown().await?;

    tracing::info!("Tether shutdown complete");
    Ok(())
}
