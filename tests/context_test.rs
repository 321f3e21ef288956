//! Integration tests for the composition root.
//!
//! Tests:
//! - Context wires a working database pool and cache client
//! - Health report reflects an unreachable cache
//! - Invalid configuration fails fast

mod common;

use common::{free_port, FakeCache, TestFixture};
use std::time::Duration;
use tether::cache::ConnectionState;
use tether::config::Config;
use tether::context::{AppContext, ContextError};
use tokio::sync::watch;

#[tokio::test]
async fn test_context_reports_healthy() {
    let fixture = TestFixture::new();
    let server = FakeCache::start().await;
    let config = Config::test_config(fixture.data_dir(), server.port);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let context = AppContext::connect(&config, shutdown_rx).expect("connect failed");
    context
        .cache()
        .wait_connected(Duration::from_secs(5))
        .await
        .unwrap();

    let report = context.health(Duration::from_secs(2)).await;
    assert!(report.healthy, "report: {report:?}");
    assert!(report.database.ok);
    assert!(report.cache.ok);
    assert_eq!(
        report.cache.connection.map(|c| c.state),
        Some(ConnectionState::Connected)
    );
    assert!(fixture.db_path.exists());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["healthy"], true);
    assert_eq!(json["cache"]["connection"]["state"], "connected");
    assert!(json["database"].get("error").is_none());

    shutdown_tx.send(true).unwrap();
    context.shutdown().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_health_reports_unreachable_cache() {
    let fixture = TestFixture::new();
    let port = free_port().await;
    let config = Config::test_config(fixture.data_dir(), port);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let context = AppContext::connect(&config, shutdown_rx).expect("connect failed");
    let report = context.health(Duration::from_millis(200)).await;

    assert!(!report.healthy);
    assert!(report.database.ok);
    assert!(!report.cache.ok);
    assert!(report.cache.error.is_some());
    let connection = report.cache.connection.expect("status missing");
    assert_ne!(connection.state, ConnectionState::Connected);

    shutdown_tx.send(true).unwrap();
    context.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_database_shared_through_context() {
    let fixture = TestFixture::new();
    let port = free_port().await;
    let config = Config::test_config(fixture.data_dir(), port);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let context = AppContext::connect(&config, shutdown_rx).unwrap();
    {
        let conn = context.database().get().unwrap();
        conn.execute_batch("CREATE TABLE notes (body TEXT); INSERT INTO notes VALUES ('hi');")
            .unwrap();
    }
    let count: i64 = context
        .database()
        .get()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);

    shutdown_tx.send(true).unwrap();
    context.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_fails_fast() {
    let fixture = TestFixture::new();
    let mut config = Config::test_config(fixture.data_dir(), 6379);
    config.database_url = "postgres://localhost/app".into();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = AppContext::connect(&config, shutdown_rx);
    assert!(matches!(result, Err(ContextError::Config(_))));
}
