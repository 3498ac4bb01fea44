// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object adapter: servant registry, accept loop and dispatch pipeline.

use super::communicator::{Communicator, RunningAdapter};
use super::connection::{self, ConnectionError};
use super::dispatch::{Current, DispatchResult, Servant};
use super::protocol::{Frame, ReplyFrame, RequestFrame};
use crate::error::{RemoteException, RemoteExceptionCode};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Built-in operation answering with `null` for any registered identity.
pub const PING_OPERATION: &str = "_ping";

/// Built-in operation answering with the servant's interface id.
pub const INTERFACE_ID_OPERATION: &str = "_id";

/// Adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Identity '{0}' already registered")]
    AlreadyRegistered(String),

    #[error("Adapter '{0}' already active")]
    AlreadyActive(String),

    #[error("Adapter name '{0}' already in use")]
    NameInUse(String),

    #[error("Communicator is shut down")]
    CommunicatorShutdown,

    #[error("Bind error on {endpoint}: {source}")]
    Bind {
        endpoint: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Hosts servants and serves invocations for them on one TCP endpoint.
pub struct ObjectAdapter {
    name: String,
    endpoint: SocketAddr,
    communicator: Communicator,
    servants: DashMap<String, Arc<dyn Servant>>,
    bound: Mutex<Option<SocketAddr>>,
    active: AtomicBool,
    requests_dispatched: AtomicU64,
}

impl ObjectAdapter {
    pub(crate) fn new(name: &str, endpoint: SocketAddr, communicator: Communicator) -> Self {
        Self {
            name: name.to_string(),
            endpoint,
            communicator,
            servants: DashMap::new(),
            bound: Mutex::new(None),
            active: AtomicBool::new(false),
            requests_dispatched: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The communicator that owns this adapter.
    pub fn communicator(&self) -> &Communicator {
        &self.communicator
    }

    /// Register a servant under `identity`.
    pub fn add(&self, identity: &str, servant: Arc<dyn Servant>) -> Result<(), AdapterError> {
        use dashmap::mapref::entry::Entry;

        match self.servants.entry(identity.to_string()) {
            Entry::Occupied(_) => Err(AdapterError::AlreadyRegistered(identity.to_string())),
            Entry::Vacant(slot) => {
                debug!(
                    "Adapter '{}': registered '{}' ({})",
                    self.name,
                    identity,
                    servant.interface_id()
                );
                slot.insert(servant);
                Ok(())
            }
        }
    }

    /// Unregister a servant, returning it if present.
    pub fn remove(&self, identity: &str) -> Option<Arc<dyn Servant>> {
        self.servants.remove(identity).map(|(_, servant)| servant)
    }

    pub fn find(&self, identity: &str) -> Option<Arc<dyn Servant>> {
        self.servants.get(identity).map(|s| Arc::clone(s.value()))
    }

    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servants.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Address the accept loop is bound to, once active.
    pub fn bound_endpoint(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of requests handed to servants so far.
    pub fn requests_dispatched(&self) -> u64 {
        self.requests_dispatched.load(Ordering::Relaxed)
    }

    /// Bind the endpoint and start accepting connections.
    ///
    /// Returns the bound address (useful with port 0).
    pub async fn activate(self: &Arc<Self>) -> Result<SocketAddr, AdapterError> {
        if self.communicator.is_shutdown() {
            return Err(AdapterError::CommunicatorShutdown);
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(AdapterError::AlreadyActive(self.name.clone()));
        }

        let listener = match TcpListener::bind(self.endpoint).await {
            Ok(listener) => listener,
            Err(source) => {
                self.active.store(false, Ordering::SeqCst);
                return Err(AdapterError::Bind {
                    endpoint: self.endpoint,
                    source,
                });
            }
        };
        let local = listener.local_addr().map_err(|source| AdapterError::Bind {
            endpoint: self.endpoint,
            source,
        })?;
        *self.bound.lock() = Some(local);

        info!("Adapter '{}' listening on {}", self.name, local);

        let running = self.communicator.track_adapter();
        let shutdown = self.communicator.shutdown_signal();
        tokio::spawn(Arc::clone(self).run(listener, shutdown, running));

        Ok(local)
    }

    /// Accept loop; exits on communicator shutdown after draining connections.
    async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
        _running: RunningAdapter,
    ) {
        let mut connections = JoinSet::new();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!("Adapter '{}': connection from {}", self.name, peer);
                            let adapter = Arc::clone(&self);
                            let signal = shutdown.clone();
                            connections.spawn(async move {
                                if let Err(e) = adapter.serve_connection(stream, peer, signal).await {
                                    warn!("Connection error from {}: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        info!(
            "Adapter '{}' stopped accepting; draining {} connection(s)",
            self.name,
            connections.len()
        );

        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                warn!("Connection task failed: {}", e);
            }
        }

        self.active.store(false, Ordering::SeqCst);
        info!("Adapter '{}' deactivated", self.name);
    }

    /// Serve one connection until the peer leaves or shutdown is requested.
    ///
    /// Requests are dispatched concurrently; replies go out in completion
    /// order. Before the connection closes, every request already read gets
    /// its reply.
    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectionError> {
        let config = self.communicator.config();
        if config.tcp_nodelay {
            stream.set_nodelay(true)?;
        }
        let (mut reader, writer) = connection::split(stream, config.max_message_size);
        let writer = Arc::new(AsyncMutex::new(writer));
        let mut in_flight: InFlight = JoinSet::new();

        loop {
            if *shutdown.borrow_and_update() {
                if !settle(&mut in_flight, peer).await? {
                    return Ok(());
                }
                debug!("Closing connection to {} on shutdown", peer);
                // Peer may already be gone; closing anyway.
                let _ = writer.lock().await.send_frame(&Frame::Close).await;
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if !request_completed(joined, peer)? {
                        return Ok(());
                    }
                }
                result = reader.read_frame() => {
                    match result? {
                        Some(Frame::Request(request)) => {
                            let adapter = Arc::clone(&self);
                            let writer = Arc::clone(&writer);
                            in_flight.spawn(async move {
                                match adapter.handle_request(request, peer).await {
                                    Some(reply) => {
                                        let mut writer = writer.lock().await;
                                        writer.send_frame(&Frame::Reply(reply)).await.map(|()| true)
                                    }
                                    None => Ok(false),
                                }
                            });
                        }
                        Some(Frame::Close) | None => {
                            debug!("Connection closed: {}", peer);
                            if !settle(&mut in_flight, peer).await? {
                                return Ok(());
                            }
                            break;
                        }
                        Some(Frame::Reply(reply)) => {
                            debug!("Ignoring unexpected reply {} from {}", reply.request_id, peer);
                        }
                    }
                }
            }
        }

        let _ = writer.lock().await.shutdown().await;
        Ok(())
    }

    async fn handle_request(&self, request: RequestFrame, peer: SocketAddr) -> Option<ReplyFrame> {
        let request_id = request.request_id;
        let current = Current {
            identity: request.identity,
            operation: request.operation,
            mode: request.mode,
            request_id,
            peer: Some(peer),
        };

        self.dispatch(current).await.map(|result| match result {
            Ok(value) => ReplyFrame::ok(request_id, value),
            Err(exc) => ReplyFrame::exception(request_id, exc),
        })
    }

    /// Run the dispatch pipeline for one request.
    ///
    /// Returns `None` when the servant did not return normally (it panicked
    /// or its process was told to terminate); no reply must be sent then.
    pub async fn dispatch(&self, current: Current) -> Option<DispatchResult> {
        if self.communicator.is_shutdown() {
            return Some(Err(RemoteException::new(
                RemoteExceptionCode::CommunicatorShutdown,
                format!(
                    "adapter '{}' is shutting down; '{}' not dispatched",
                    self.name, current.operation
                ),
            )));
        }

        let servant = match self.find(&current.identity) {
            Some(servant) => servant,
            None => {
                return Some(Err(RemoteException::new(
                    RemoteExceptionCode::ObjectNotExist,
                    format!("no servant registered as '{}'", current.identity),
                )))
            }
        };

        match current.operation.as_str() {
            PING_OPERATION => return Some(Ok(serde_json::Value::Null)),
            INTERFACE_ID_OPERATION => return Some(Ok(servant.interface_id().into())),
            _ => {}
        }

        let descriptor = match servant
            .operations()
            .iter()
            .find(|op| op.name == current.operation)
        {
            Some(descriptor) => *descriptor,
            None => {
                return Some(Err(RemoteException::new(
                    RemoteExceptionCode::OperationNotExist,
                    format!(
                        "'{}' has no operation '{}'",
                        servant.interface_id(),
                        current.operation
                    ),
                )))
            }
        };

        if !descriptor.mode.accepts(current.mode) {
            return Some(Err(RemoteException::new(
                RemoteExceptionCode::InvalidMode,
                format!(
                    "operation '{}' expects mode {}, received {}",
                    descriptor.name, descriptor.mode, current.mode
                ),
            )));
        }

        debug!(
            "Dispatching {}::{} ({}) request={}",
            current.identity, current.operation, current.mode, current.request_id
        );
        self.requests_dispatched.fetch_add(1, Ordering::Relaxed);

        let operation = descriptor.name;
        match tokio::task::spawn_blocking(move || servant.dispatch(&current)).await {
            Ok(result) => Some(result),
            Err(e) => {
                error!("Servant did not return from '{}': {}", operation, e);
                None
            }
        }
    }
}

/// Outcome of one dispatched request: `false` when its servant never returned.
type InFlight = JoinSet<Result<bool, ConnectionError>>;

fn request_completed(
    joined: Result<Result<bool, ConnectionError>, JoinError>,
    peer: SocketAddr,
) -> Result<bool, ConnectionError> {
    match joined {
        Ok(Ok(true)) => Ok(true),
        Ok(Ok(false)) => {
            // Servant never returned; the request gets no reply.
            warn!("Dropping connection to {} without reply", peer);
            Ok(false)
        }
        Ok(Err(e)) => Err(e),
        Err(e) => {
            warn!("Request task for {} failed: {}", peer, e);
            Ok(false)
        }
    }
}

/// Wait for every in-flight request on a connection.
async fn settle(in_flight: &mut InFlight, peer: SocketAddr) -> Result<bool, ConnectionError> {
    while let Some(joined) = in_flight.join_next().await {
        if !request_completed(joined, peer)? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl std::fmt::Debug for ObjectAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectAdapter")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("bound", &self.bound_endpoint())
            .field("identities", &self.identities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FaultProxy;
    use crate::config::ServerConfig;
    use crate::runtime::{OperationDescriptor, OperationMode};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    /// Echoes the operation name; `boom` panics.
    struct EchoServant;

    const ECHO_OPS: &[OperationDescriptor] = &[
        OperationDescriptor::new("echo", OperationMode::Normal),
        OperationDescriptor::new("peek", OperationMode::Idempotent),
        OperationDescriptor::new("boom", OperationMode::Normal),
    ];

    impl Servant for EchoServant {
        fn interface_id(&self) -> &'static str {
            "::Test::Echo"
        }

        fn operations(&self) -> &'static [OperationDescriptor] {
            ECHO_OPS
        }

        fn dispatch(&self, current: &Current) -> DispatchResult {
            if current.operation == "boom" {
                std::panic::resume_unwind(Box::new("boom"));
            }
            Ok(current.operation.clone().into())
        }
    }

    /// `meet` returns `true` once two callers are inside it at the same time,
    /// `false` if the second one never shows up.
    #[derive(Default)]
    struct RendezvousServant {
        arrivals: AtomicUsize,
    }

    const MEET_OPS: &[OperationDescriptor] =
        &[OperationDescriptor::new("meet", OperationMode::Normal)];

    impl Servant for RendezvousServant {
        fn interface_id(&self) -> &'static str {
            "::Test::Rendezvous"
        }

        fn operations(&self) -> &'static [OperationDescriptor] {
            MEET_OPS
        }

        fn dispatch(&self, _current: &Current) -> DispatchResult {
            self.arrivals.fetch_add(1, Ordering::SeqCst);
            let deadline = Instant::now() + Duration::from_secs(2);
            while self.arrivals.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok((self.arrivals.load(Ordering::SeqCst) >= 2).into())
        }
    }

    fn adapter() -> Arc<ObjectAdapter> {
        let communicator = Communicator::new(ServerConfig::default()).unwrap();
        let adapter = communicator
            .create_object_adapter("TestAdapter", "127.0.0.1:0".parse().unwrap())
            .unwrap();
        adapter.add("echo", Arc::new(EchoServant)).unwrap();
        adapter
    }

    fn code_of(result: Option<DispatchResult>) -> RemoteExceptionCode {
        result.unwrap().unwrap_err().code
    }

    #[test]
    fn duplicate_identity_rejected() {
        let adapter = adapter();
        let err = adapter.add("echo", Arc::new(EchoServant)).unwrap_err();
        assert!(matches!(err, AdapterError::AlreadyRegistered(_)));
        assert_eq!(adapter.identities(), vec!["echo".to_string()]);
    }

    #[test]
    fn remove_unregisters() {
        let adapter = adapter();
        assert!(adapter.remove("echo").is_some());
        assert!(adapter.find("echo").is_none());
        assert!(adapter.remove("echo").is_none());
    }

    #[tokio::test]
    async fn dispatch_routes_to_servant() {
        let adapter = adapter();
        let result = adapter.dispatch(Current::new("echo", "echo")).await;
        assert_eq!(result.unwrap().unwrap(), serde_json::json!("echo"));
        assert_eq!(adapter.requests_dispatched(), 1);
    }

    #[tokio::test]
    async fn unknown_identity() {
        let adapter = adapter();
        let result = adapter.dispatch(Current::new("nobody", "echo")).await;
        assert_eq!(code_of(result), RemoteExceptionCode::ObjectNotExist);
    }

    #[tokio::test]
    async fn unknown_operation() {
        let adapter = adapter();
        let result = adapter.dispatch(Current::new("echo", "missing")).await;
        assert_eq!(code_of(result), RemoteExceptionCode::OperationNotExist);
    }

    #[tokio::test]
    async fn mode_mismatch_is_not_dispatched() {
        let adapter = adapter();
        let current = Current::new("echo", "echo").with_mode(OperationMode::Idempotent);
        assert_eq!(
            code_of(adapter.dispatch(current).await),
            RemoteExceptionCode::InvalidMode
        );
        assert_eq!(adapter.requests_dispatched(), 0);

        // Idempotent operations accept nonmutating callers.
        let current = Current::new("echo", "peek").with_mode(OperationMode::Nonmutating);
        assert!(adapter.dispatch(current).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn builtin_operations() {
        let adapter = adapter();
        let ping = adapter.dispatch(Current::new("echo", PING_OPERATION)).await;
        assert_eq!(ping.unwrap().unwrap(), serde_json::Value::Null);

        let id = adapter.dispatch(Current::new("echo", INTERFACE_ID_OPERATION)).await;
        assert_eq!(id.unwrap().unwrap(), serde_json::json!("::Test::Echo"));
    }

    #[tokio::test]
    async fn unwinding_servant_yields_no_reply() {
        let adapter = adapter();
        assert!(adapter.dispatch(Current::new("echo", "boom")).await.is_none());
    }

    #[tokio::test]
    async fn activate_twice_fails() {
        let adapter = adapter();
        let addr = adapter.activate().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(adapter.bound_endpoint(), Some(addr));
        assert!(adapter.is_active());

        let err = adapter.activate().await.unwrap_err();
        assert!(matches!(err, AdapterError::AlreadyActive(_)));

        adapter.communicator().shutdown();
        adapter.communicator().wait_for_shutdown().await;
        assert!(!adapter.is_active());
    }

    #[tokio::test]
    async fn requests_after_shutdown_are_rejected() {
        let adapter = adapter();
        adapter.communicator().shutdown();

        let result = adapter.dispatch(Current::new("echo", "echo")).await;
        assert_eq!(code_of(result), RemoteExceptionCode::CommunicatorShutdown);
        assert_eq!(adapter.requests_dispatched(), 0);
    }

    #[tokio::test]
    async fn one_connection_dispatches_concurrently() {
        let adapter = adapter();
        adapter
            .add("meet", Arc::new(RendezvousServant::default()))
            .unwrap();
        let addr = adapter.activate().await.unwrap();

        let proxy = FaultProxy::connect_with_timeout(addr, "meet", Duration::from_secs(5))
            .await
            .unwrap();
        let (first, second) = tokio::join!(
            proxy.invoke("meet", OperationMode::Normal),
            proxy.invoke("meet", OperationMode::Normal)
        );
        assert_eq!(first.unwrap(), serde_json::json!(true));
        assert_eq!(second.unwrap(), serde_json::json!(true));

        adapter.communicator().shutdown();
        adapter.communicator().wait_for_shutdown().await;
    }
}
