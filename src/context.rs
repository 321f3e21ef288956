//! Composition root for backing-service clients.
//!
//! [`AppContext`] is built once at startup and passed by reference to
//! whatever needs the database or the cache. Nothing here is global.

use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

use crate::cache::{CacheClient, CacheConnection, CacheError, ConnectionStatus};
use crate::config::{Config, ConfigError};
use crate::database::{Database, DatabaseError};

/// Error type for building the application context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Health of one backing service.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionStatus>,
}

impl ComponentHealth {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>, started: Instant) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                latency_ms: Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
                error: None,
                connection: None,
            },
            Err(e) => Self {
                ok: false,
                latency_ms: None,
                error: Some(e.to_string()),
                connection: None,
            },
        }
    }
}

/// Point-in-time health of every backing service.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
}

/// Handles to the database pool and the cache client.
pub struct AppContext {
    database: Database,
    cache: CacheClient,
    cache_connection: CacheConnection,
}

impl AppContext {
    /// Validate `config`, open the database pool and start the cache client.
    ///
    /// The cache connects in the background; a cache that is down at startup
    /// is not an error. `shutdown` stops the cache supervisor once it turns
    /// `true`.
    pub fn connect(config: &Config, shutdown: watch::Receiver<bool>) -> Result<Self, ContextError> {
        config.validate()?;

        let database = Database::open(config.database_path()?, config.database_pool_size)?;
        let cache_connection = CacheConnection::spawn(config.cache_options(), shutdown);
        let cache = cache_connection.handle();

        Ok(Self {
            database,
            cache,
            cache_connection,
        })
    }

    /// The database pool.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The cache client.
    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    /// Check both services, each bounded by `timeout`.
    pub async fn health(&self, timeout: Duration) -> HealthReport {
        let database = {
            let started = Instant::now();
            let db = self.database.clone();
            let result = tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || db.ping()))
                .await;
            let result = match result {
                Ok(Ok(ping)) => ping.map_err(|e| e.to_string()),
                Ok(Err(join)) => Err(join.to_string()),
                Err(_) => Err(format!("timed out after {timeout:?}")),
            };
            ComponentHealth::from_result(result, started)
        };

        let cache = {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, self.cache.ping()).await {
                Ok(ping) => ping,
                Err(_) => Err(CacheError::Timeout(timeout)),
            };
            ComponentHealth {
                connection: Some(self.cache.status()),
                ..ComponentHealth::from_result(result, started)
            }
        };

        HealthReport {
            healthy: database.ok && cache.ok,
            database,
            cache,
        }
    }

    /// Release the handles and wait for the cache supervisor to stop.
    ///
    /// Signal shutdown on the channel given to [`AppContext::connect`] first.
    pub async fn shutdown(self) -> Result<(), CacheError> {
        drop(self.cache);
        self.cache_connection.join().await
    }
}
