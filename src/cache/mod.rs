//! Cache client with automatic reconnect.
//!
//! Provides:
//! - A supervising task that owns the TCP connection and the attempt counter
//! - A cloneable [`CacheClient`] handle for issuing commands
//! - RESP framing in [`resp`]
//!
//! The connection moves between `Disconnected`, `Connecting` and `Connected`.
//! Every failed connect and every lost connection bumps the attempt counter
//! and waits [`ReconnectPolicy::delay`] before trying again; a successful
//! connect resets it. There is no give-up state.

mod client;
mod connection;
pub mod resp;

use std::time::Duration;
use thiserror::Error;

use crate::backoff::ReconnectPolicy;

pub use client::CacheClient;
pub use connection::{CacheConnection, ConnectionState, ConnectionStatus};
pub use resp::{ProtocolError, Reply};

/// Error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection lost while command was in flight")]
    ConnectionLost,

    #[error("connection closed by server")]
    ClosedByServer,

    #[error("cache client is closed")]
    Closed,

    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(Reply),

    #[error("command must have at least one argument")]
    EmptyCommand,

    #[error("supervisor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Connection settings for the cache client.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub host: String,
    pub port: u16,
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Bound on a single command, including time spent queued offline.
    pub command_timeout: Duration,
    /// Commands buffered while disconnected.
    pub queue_size: usize,
    pub policy: ReconnectPolicy,
}

impl CacheOptions {
    /// `host:port` string used for logging and connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            host: "cache".into(),
            port: 6379,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            queue_size: 256,
            policy: ReconnectPolicy::default(),
        }
    }
}
