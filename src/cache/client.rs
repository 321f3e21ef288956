//! Cloneable command handle for the cache connection.

use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::connection::{ConnectionState, ConnectionStatus, Request};
use super::resp::{self, Reply};
use super::CacheError;
use crate::observability::metrics;

/// Handle for sending commands to the cache.
///
/// Cheap to clone; all clones share one supervised connection.
#[derive(Clone)]
pub struct CacheClient {
    tx: mpsc::Sender<Request>,
    status: watch::Receiver<ConnectionStatus>,
    command_timeout: Duration,
    client_id: Uuid,
}

impl CacheClient {
    pub(crate) fn new(
        tx: mpsc::Sender<Request>,
        status: watch::Receiver<ConnectionStatus>,
        command_timeout: Duration,
        client_id: Uuid,
    ) -> Self {
        Self {
            tx,
            status,
            command_timeout,
            client_id,
        }
    }

    /// Send a raw command and wait for its reply.
    ///
    /// If the connection is down the command waits in the offline queue
    /// until it reconnects or the command timeout expires. A server error
    /// reply is returned as [`CacheError::Server`].
    pub async fn command<A: AsRef<[u8]>>(&self, args: &[A]) -> Result<Reply, CacheError> {
        if args.is_empty() {
            return Err(CacheError::EmptyCommand);
        }

        let started = Instant::now();
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request {
            frame: resp::encode_command(args),
            reply: reply_tx,
        };

        let reply = tokio::time::timeout(self.command_timeout, self.exchange(request, reply_rx))
            .await
            .map_err(|_| CacheError::Timeout(self.command_timeout))??;
        metrics::record_command_latency(started.elapsed().as_secs_f64());

        match reply {
            Reply::Error(message) => Err(CacheError::Server(message)),
            other => Ok(other),
        }
    }

    async fn exchange(
        &self,
        request: Request,
        reply_rx: oneshot::Receiver<Result<Reply, CacheError>>,
    ) -> Result<Reply, CacheError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| CacheError::Closed)?;
        reply_rx.await.map_err(|_| CacheError::Closed)?
    }

    /// Round-trip a `PING`, expecting `PONG`.
    pub async fn ping(&self) -> Result<(), CacheError> {
        match self.command(&["PING"]).await? {
            Reply::Simple(s) if s == "PONG" => Ok(()),
            other => Err(CacheError::UnexpectedReply(other)),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait until the connection reaches `Connected`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), CacheError> {
        let mut rx = self.status.clone();
        tokio::time::timeout(
            timeout,
            rx.wait_for(|s| s.state == ConnectionState::Connected),
        )
        .await
        .map_err(|_| CacheError::Timeout(timeout))?
        .map_err(|_| CacheError::Closed)?;
        Ok(())
    }

    /// Identifier attached to this connection's log span.
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Whether the supervisor has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("client_id", &self.client_id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
