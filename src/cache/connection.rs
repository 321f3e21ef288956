//! Connection supervisor for the cache client.
//!
//! A single task owns the socket. Commands arrive over an mpsc channel and
//! are answered through a oneshot each. While disconnected the channel is
//! not drained, so it doubles as the offline queue.

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::client::CacheClient;
use super::resp::{self, ProtocolError, Reply};
use super::{CacheError, CacheOptions};
use crate::observability::metrics;

/// Lifecycle state of the cache connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state plus the consecutive-failure counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failures since the last successful connect.
    pub attempt: u32,
}

/// A command waiting for its reply.
pub(crate) struct Request {
    pub(crate) frame: Vec<u8>,
    pub(crate) reply: oneshot::Sender<Result<Reply, CacheError>>,
}

/// Why the supervisor left the connected state.
enum Exit {
    Shutdown,
    Lost(CacheError),
}

/// Owner of the supervising task.
///
/// Dropping this does not stop the task; signal shutdown and call
/// [`CacheConnection::join`].
pub struct CacheConnection {
    client: CacheClient,
    task: JoinHandle<()>,
}

impl CacheConnection {
    /// Spawn the supervisor. It begins connecting immediately.
    ///
    /// Must be called from within a Tokio runtime. The task stops once
    /// `shutdown` turns `true` or its sender is dropped.
    pub fn spawn(options: CacheOptions, shutdown: watch::Receiver<bool>) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_size.max(1));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let client_id = Uuid::now_v7();

        let span = tracing::info_span!(
            "cache",
            client_id = %client_id,
            address = %options.address()
        );
        let supervisor = Supervisor {
            options: options.clone(),
            commands: rx,
            status: status_tx,
            shutdown,
        };
        let task = tokio::spawn(supervisor.run().instrument(span));

        Self {
            client: CacheClient::new(tx, status_rx, options.command_timeout, client_id),
            task,
        }
    }

    /// Get a handle for issuing commands.
    pub fn handle(&self) -> CacheClient {
        self.client.clone()
    }

    /// Wait for the supervisor task to finish.
    pub async fn join(self) -> Result<(), CacheError> {
        drop(self.client);
        self.task.await?;
        Ok(())
    }
}

struct Supervisor {
    options: CacheOptions,
    commands: mpsc::Receiver<Request>,
    status: watch::Sender<ConnectionStatus>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        let address = self.options.address();

        loop {
            self.publish(ConnectionState::Connecting, attempt);

            let connected = tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                result = connect(&self.options) => result,
            };

            match connected {
                Ok(stream) => {
                    if attempt > 0 {
                        tracing::info!(attempt, "Reconnected to cache");
                    } else {
                        tracing::info!("Connected to cache");
                    }
                    attempt = 0;
                    self.publish(ConnectionState::Connected, attempt);
                    metrics::record_cache_connected(&address, true);

                    let exit = self.serve(stream).await;
                    metrics::record_cache_connected(&address, false);
                    match exit {
                        Exit::Shutdown => break,
                        Exit::Lost(e) => tracing::warn!(error = %e, "Cache connection lost"),
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt.saturating_add(1), error = %e, "Cache connect failed");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.options.policy.delay(attempt);
            self.publish(ConnectionState::Disconnected, attempt);
            metrics::record_reconnect_attempt(&address);
            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Scheduling cache reconnect"
            );

            tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.publish(ConnectionState::Disconnected, attempt);
        self.commands.close();
        while let Ok(request) = self.commands.try_recv() {
            let _ = request.reply.send(Err(CacheError::Closed));
        }
        tracing::info!("Cache supervisor stopped");
    }

    fn publish(&self, state: ConnectionState, attempt: u32) {
        tracing::debug!(?state, attempt, "Cache connection state");
        self.status.send_replace(ConnectionStatus { state, attempt });
    }

    /// Drive one established connection until it fails or shutdown.
    async fn serve(&mut self, stream: TcpStream) -> Exit {
        let (mut reader, mut writer) = stream.into_split();
        let mut buf = Vec::with_capacity(4096);
        let command_timeout = self.options.command_timeout;

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => return Exit::Shutdown,
                request = self.commands.recv() => {
                    let Some(request) = request else {
                        return Exit::Shutdown;
                    };
                    // Caller already gave up.
                    if request.reply.is_closed() {
                        continue;
                    }

                    let exchange = roundtrip(&mut reader, &mut writer, &mut buf, &request.frame);
                    let outcome = tokio::select! {
                        _ = wait_for_shutdown(&mut self.shutdown) => {
                            let _ = request.reply.send(Err(CacheError::Closed));
                            return Exit::Shutdown;
                        }
                        outcome = tokio::time::timeout(command_timeout, exchange) => outcome,
                    };

                    match outcome {
                        Ok(Ok(reply)) => {
                            let _ = request.reply.send(Ok(reply));
                            // One command, one reply. Anything left over would be
                            // taken as the answer to the next command.
                            if !buf.is_empty() {
                                return Exit::Lost(CacheError::Protocol(ProtocolError::Unsolicited));
                            }
                        }
                        Ok(Err(e)) => {
                            let _ = request.reply.send(Err(CacheError::ConnectionLost));
                            return Exit::Lost(e);
                        }
                        // A stalled server is treated like a dead one.
                        Err(_) => {
                            let _ = request.reply.send(Err(CacheError::Timeout(command_timeout)));
                            return Exit::Lost(CacheError::Timeout(command_timeout));
                        }
                    }
                }
                read = reader.read_buf(&mut buf) => {
                    return Exit::Lost(match read {
                        Ok(0) => CacheError::ClosedByServer,
                        Ok(_) => CacheError::Protocol(ProtocolError::Unsolicited),
                        Err(e) => CacheError::Io(e),
                    });
                }
            }
        }
    }
}

async fn connect(options: &CacheOptions) -> Result<TcpStream, CacheError> {
    let addr = (options.host.as_str(), options.port);
    let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| CacheError::ConnectTimeout(options.connect_timeout))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Write one command and read exactly one reply.
async fn roundtrip(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    buf: &mut Vec<u8>,
    frame: &[u8],
) -> Result<Reply, CacheError> {
    writer.write_all(frame).await?;
    loop {
        if let Some((reply, used)) = resp::decode(&buf[..])? {
            buf.drain(..used);
            return Ok(reply);
        }
        if reader.read_buf(buf).await? == 0 {
            return Err(CacheError::ClosedByServer);
        }
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
