// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client proxy for the fault-injection servant.
//!
//! One TCP connection per proxy. Calls are multiplexed by request id and
//! matched to replies by a background reader task. The proxy never retries:
//! a lost connection fails every call in flight and every call after it.

use crate::error::{RpcError, RpcResult};
use crate::runtime::connection::{self, FramedWriter};
use crate::runtime::{Frame, OperationMode, ReplyFrame, RequestFrame};
use crate::runtime::{INTERFACE_ID_OPERATION, PING_OPERATION};
use crate::servant::ops;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

const STATE_OPEN: u8 = 0;
const STATE_CLOSED: u8 = 1;
const STATE_LOST: u8 = 2;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default frame size limit used by proxies.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

type Pending = DashMap<u64, oneshot::Sender<ReplyFrame>>;

/// Connection state shared with the reader task.
#[derive(Debug)]
struct ConnectionState(AtomicU8);

impl ConnectionState {
    fn set(&self, state: u8) {
        // First terminal state wins.
        let _ = self
            .0
            .compare_exchange(STATE_OPEN, state, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn check(&self) -> RpcResult<()> {
        match self.0.load(Ordering::SeqCst) {
            STATE_OPEN => Ok(()),
            STATE_CLOSED => Err(RpcError::ConnectionClosed),
            _ => Err(RpcError::ConnectionLost),
        }
    }
}

/// Proxy to a servant identity at a remote endpoint.
///
/// # Example
///
/// ```rust,no_run
/// use faultline::client::FaultProxy;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let proxy = FaultProxy::connect("127.0.0.1:12010".parse()?, "test").await?;
/// let pid = proxy.pid().await?;
/// println!("served by process {}", pid);
///
/// let err = proxy.idempotent_abort().await;
/// assert!(err.is_connectivity());
/// # Ok(())
/// # }
/// ```
pub struct FaultProxy {
    identity: String,
    endpoint: SocketAddr,
    writer: Mutex<FramedWriter<OwnedWriteHalf>>,
    pending: Arc<Pending>,
    state: Arc<ConnectionState>,
    next_request_id: AtomicU64,
    timeout: Duration,
    reader_task: JoinHandle<()>,
}

impl FaultProxy {
    /// Connect with the default timeout.
    pub async fn connect(endpoint: SocketAddr, identity: &str) -> RpcResult<Self> {
        Self::connect_with_timeout(endpoint, identity, DEFAULT_TIMEOUT).await
    }

    /// Connect; `timeout` bounds both the connect and every call.
    pub async fn connect_with_timeout(
        endpoint: SocketAddr,
        identity: &str,
        timeout: Duration,
    ) -> RpcResult<Self> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(RpcError::ConnectFailed(format!("{}: {}", endpoint, e))),
            Err(_) => {
                return Err(RpcError::ConnectFailed(format!(
                    "{}: connect timed out",
                    endpoint
                )))
            }
        };
        // Nagle only delays small request frames.
        let _ = stream.set_nodelay(true);

        let (reader, writer) = connection::split(stream, DEFAULT_MAX_MESSAGE_SIZE);
        let pending: Arc<Pending> = Arc::new(DashMap::new());
        let state = Arc::new(ConnectionState(AtomicU8::new(STATE_OPEN)));

        let reader_task = {
            let pending = pending.clone();
            let state = state.clone();
            tokio::spawn(async move {
                let mut reader = reader;
                loop {
                    match reader.read_frame().await {
                        Ok(Some(Frame::Reply(reply))) => {
                            match pending.remove(&reply.request_id) {
                                // Receiver may have timed out and gone.
                                Some((_, tx)) => drop(tx.send(reply)),
                                None => debug!("Reply {} has no waiter", reply.request_id),
                            }
                        }
                        Ok(Some(Frame::Close)) => {
                            debug!("{} closed the connection", endpoint);
                            state.set(STATE_CLOSED);
                            break;
                        }
                        Ok(Some(Frame::Request(req))) => {
                            debug!("Ignoring request {} from server", req.request_id);
                        }
                        Ok(None) => {
                            debug!("Lost connection to {}", endpoint);
                            state.set(STATE_LOST);
                            break;
                        }
                        Err(e) => {
                            debug!("Read error from {}: {}", endpoint, e);
                            state.set(STATE_LOST);
                            break;
                        }
                    }
                }
                // Dropping the senders fails every waiting call.
                pending.clear();
            })
        };

        Ok(Self {
            identity: identity.to_string(),
            endpoint,
            writer: Mutex::new(writer),
            pending,
            state,
            next_request_id: AtomicU64::new(1),
            timeout,
            reader_task,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Invoke `operation` and wait for its reply.
    pub async fn invoke(
        &self,
        operation: &str,
        mode: OperationMode,
    ) -> RpcResult<serde_json::Value> {
        self.state.check()?;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);

        // The reader may have cleared `pending` just before our insert.
        if let Err(e) = self.state.check() {
            self.pending.remove(&request_id);
            return Err(e);
        }

        let frame = Frame::Request(RequestFrame {
            request_id,
            identity: self.identity.clone(),
            operation: operation.to_string(),
            mode,
        });
        let sent = self.writer.lock().await.send_frame(&frame).await;
        if let Err(e) = sent {
            debug!("Send of '{}' to {} failed: {}", operation, self.endpoint, e);
            self.pending.remove(&request_id);
            self.state.set(STATE_LOST);
            return Err(RpcError::ConnectionLost);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply.into_result().map_err(RpcError::from),
            Ok(Err(_)) => Err(self.state.check().err().unwrap_or(RpcError::ConnectionLost)),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(RpcError::Timeout)
            }
        }
    }

    /// Identity of the process serving this proxy.
    pub async fn pid(&self) -> RpcResult<i32> {
        let value = self.invoke(ops::PID, OperationMode::Normal).await?;
        serde_json::from_value(value).map_err(|e| RpcError::DeserializationError(e.to_string()))
    }

    /// Ask the server to shut down gracefully.
    pub async fn shutdown(&self) -> RpcResult<()> {
        self.invoke(ops::SHUTDOWN, OperationMode::Normal)
            .await
            .map(|_| ())
    }

    /// Kill the server process. Returns the error that ended the call.
    pub async fn abort(&self) -> RpcError {
        self.invoke_abort(ops::ABORT, OperationMode::Normal).await
    }

    /// Kill the server process through the idempotent variant.
    pub async fn idempotent_abort(&self) -> RpcError {
        self.invoke_abort(ops::IDEMPOTENT_ABORT, OperationMode::Idempotent)
            .await
    }

    /// Kill the server process through the nonmutating variant.
    pub async fn nonmutating_abort(&self) -> RpcError {
        self.invoke_abort(ops::NONMUTATING_ABORT, OperationMode::Nonmutating)
            .await
    }

    /// Check that the identity exists at the endpoint.
    pub async fn ping(&self) -> RpcResult<()> {
        self.invoke(PING_OPERATION, OperationMode::Idempotent)
            .await
            .map(|_| ())
    }

    /// Interface id of the remote servant.
    pub async fn interface_id(&self) -> RpcResult<String> {
        let value = self
            .invoke(INTERFACE_ID_OPERATION, OperationMode::Idempotent)
            .await?;
        serde_json::from_value(value).map_err(|e| RpcError::DeserializationError(e.to_string()))
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.send_frame(&Frame::Close).await;
        let _ = writer.shutdown().await;
    }

    async fn invoke_abort(&self, operation: &str, mode: OperationMode) -> RpcError {
        match self.invoke(operation, mode).await {
            Ok(_) => RpcError::UnexpectedReply(operation.to_string()),
            Err(e) => e,
        }
    }
}

impl Drop for FaultProxy {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl std::fmt::Debug for FaultProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultProxy")
            .field("identity", &self.identity)
            .field("endpoint", &self.endpoint)
            .field("pending", &self.pending.len())
            .finish()
    }
}
