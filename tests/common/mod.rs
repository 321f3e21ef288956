//! Test utilities for Tether integration tests.
//!
//! Provides:
//! - An in-process fake cache server speaking RESP
//! - Temporary database fixtures
//! - Polling helpers

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tether::backoff::ReconnectPolicy;
use tether::cache::resp::{self, Reply};
use tether::cache::CacheOptions;
use tether::observability::tracing::init_test_tracing;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Test fixture that manages a temporary data directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache options tuned for fast retries against a local port.
pub fn test_cache_options(port: u16) -> CacheOptions {
    init_test_tracing();
    CacheOptions {
        host: "127.0.0.1".into(),
        port,
        connect_timeout: Duration::from_millis(500),
        command_timeout: Duration::from_secs(2),
        queue_size: 16,
        policy: ReconnectPolicy::new(Duration::from_millis(10), Duration::from_millis(50)),
    }
}

/// Reserve a localhost port with nothing listening on it.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    listener.local_addr().expect("no local addr").port()
}

/// Minimal RESP server.
///
/// Answers `PING` with `PONG` and `ECHO x` with `x`. `HANG` closes the
/// connection without replying. `STALL` leaves the connection open and
/// never answers anything on it again. `DOUBLE` writes two replies in one
/// write. Anything else gets an error reply.
pub struct FakeCache {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
    kill_tx: broadcast::Sender<()>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl FakeCache {
    /// Start on an ephemeral port.
    pub async fn start() -> Self {
        Self::bind(0).await
    }

    /// Start on a specific port.
    pub async fn bind(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("failed to bind fake cache");
        let port = listener.local_addr().expect("no local addr").port();

        let accepted = Arc::new(AtomicUsize::new(0));
        let (kill_tx, _) = broadcast::channel(4);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let counter = accepted.clone();
        let kill = kill_tx.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    conn = listener.accept() => {
                        let Ok((socket, _)) = conn else { break };
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve_connection(socket, kill.subscribe()));
                    }
                }
            }
        });

        Self {
            port,
            accepted,
            kill_tx,
            stop_tx,
            task,
        }
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Close every open connection while keeping the listener up.
    pub fn drop_connections(&self) {
        let _ = self.kill_tx.send(());
    }

    /// Close every connection and stop listening.
    pub async fn stop(self) {
        let _ = self.kill_tx.send(());
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }
}

/// What the fake server does with one command.
enum Action {
    Reply(Vec<u8>),
    Close,
    Stall,
}

async fn serve_connection(mut socket: TcpStream, mut kill: broadcast::Receiver<()>) {
    let mut buf = Vec::new();
    let mut stalled = false;
    loop {
        tokio::select! {
            _ = kill.recv() => return,
            read = socket.read_buf(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                if stalled {
                    buf.clear();
                    continue;
                }
                while let Ok(Some((command, used))) = resp::decode(&buf) {
                    buf.drain(..used);
                    match respond(&command) {
                        Action::Reply(reply) => {
                            if socket.write_all(&reply).await.is_err() {
                                return;
                            }
                        }
                        Action::Close => return,
                        Action::Stall => {
                            stalled = true;
                            buf.clear();
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn respond(command: &Reply) -> Action {
    let Reply::Array(Some(items)) = command else {
        return Action::Reply(b"-ERR expected array\r\n".to_vec());
    };
    let args: Vec<Vec<u8>> = items
        .iter()
        .filter_map(|item| match item {
            Reply::Bulk(Some(bytes)) => Some(bytes.clone()),
            _ => None,
        })
        .collect();

    let name = args.first().map(|a| a.to_ascii_uppercase());
    match name.as_deref() {
        Some(b"PING") => Action::Reply(b"+PONG\r\n".to_vec()),
        Some(b"ECHO") if args.len() == 2 => {
            let mut out = format!("${}\r\n", args[1].len()).into_bytes();
            out.extend_from_slice(&args[1]);
            out.extend_from_slice(b"\r\n");
            Action::Reply(out)
        }
        Some(b"DOUBLE") => Action::Reply(b"+FIRST\r\n+EXTRA\r\n".to_vec()),
        Some(b"HANG") => Action::Close,
        Some(b"STALL") => Action::Stall,
        _ => Action::Reply(b"-ERR unknown command\r\n".to_vec()),
    }
}

/// Wait for a condition to become true with timeout.
///
/// Returns `true` if the condition was met, `false` if the timeout expired.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
