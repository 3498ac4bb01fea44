// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! End-to-end tests against an in-process runtime.
//!
//! The servant runs on a simulated process: aborts unwind the dispatch
//! thread instead of killing the test runner, which the adapter treats
//! exactly like a dead servant (connection dropped, no reply).

use faultline::process::testing::SimulatedProcess;
use faultline::runtime::{INTERFACE_ID_OPERATION, PING_OPERATION};
use faultline::servant::{ops, INTERFACE_ID};
use faultline::{
    Communicator, FaultProxy, FaultServant, ObjectAdapter, OperationMode, RemoteExceptionCode,
    RpcError, ServerConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

struct Server {
    communicator: Communicator,
    adapter: Arc<ObjectAdapter>,
    addr: SocketAddr,
    process: Arc<SimulatedProcess>,
}

async fn start(process: SimulatedProcess) -> Server {
    let config = ServerConfig {
        port: 0,
        ..Default::default()
    };
    let communicator = Communicator::new(config.clone()).unwrap();
    let adapter = communicator
        .create_object_adapter(&config.adapter_name, config.endpoint())
        .unwrap();

    let process = Arc::new(process);
    let servant = FaultServant::with_process(&adapter, process.clone());
    adapter.add(&config.identity, Arc::new(servant)).unwrap();
    let addr = adapter.activate().await.unwrap();

    Server {
        communicator,
        adapter,
        addr,
        process,
    }
}

async fn connect(addr: SocketAddr) -> FaultProxy {
    FaultProxy::connect_with_timeout(addr, "test", Duration::from_secs(5))
        .await
        .unwrap()
}

#[tokio::test]
async fn pid_then_idempotent_abort() {
    let server = start(SimulatedProcess::new(4242)).await;
    let proxy = connect(server.addr).await;

    assert_eq!(proxy.pid().await.unwrap(), 4242);
    assert_eq!(proxy.pid().await.unwrap(), 4242);
    assert_eq!(server.process.lookups(), 1);

    let err = proxy.idempotent_abort().await;
    assert!(matches!(err, RpcError::ConnectionLost), "got {:?}", err);
    assert_eq!(server.process.terminations(), 1);

    let err = proxy.pid().await.unwrap_err();
    assert!(err.is_connectivity(), "got {:?}", err);

    server.communicator.shutdown();
    server.communicator.wait_for_shutdown().await;
}

#[tokio::test]
async fn every_abort_variant_drops_the_call() {
    let server = start(SimulatedProcess::new(1)).await;

    for op in [ops::ABORT, ops::IDEMPOTENT_ABORT, ops::NONMUTATING_ABORT] {
        let proxy = connect(server.addr).await;
        let err = match op {
            ops::ABORT => proxy.abort().await,
            ops::IDEMPOTENT_ABORT => proxy.idempotent_abort().await,
            _ => proxy.nonmutating_abort().await,
        };
        assert!(
            matches!(err, RpcError::ConnectionLost),
            "{} produced {:?}",
            op,
            err
        );
    }

    assert_eq!(server.process.terminations(), 3);
    server.communicator.shutdown();
    server.communicator.wait_for_shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_see_one_identity() {
    let server =
        start(SimulatedProcess::new(31337).with_lookup_delay(Duration::from_millis(50))).await;

    let mut calls = JoinSet::new();
    for _ in 0..8 {
        let proxy = connect(server.addr).await;
        calls.spawn(async move { proxy.pid().await });
    }

    let mut answers = 0;
    while let Some(joined) = calls.join_next().await {
        assert_eq!(joined.unwrap().unwrap(), 31337);
        answers += 1;
    }
    assert_eq!(answers, 8);
    assert_eq!(server.process.lookups(), 1);

    server.communicator.shutdown();
    server.communicator.wait_for_shutdown().await;
}

#[tokio::test]
async fn shutdown_completes_and_stops_accepting() {
    let server = start(SimulatedProcess::new(9)).await;
    let proxy = connect(server.addr).await;
    let bystander = connect(server.addr).await;

    assert_eq!(bystander.pid().await.unwrap(), 9);
    proxy.shutdown().await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        server.communicator.wait_for_shutdown(),
    )
    .await
    .expect("runtime did not drain");

    assert!(!server.process.is_terminated());

    let err = bystander.pid().await.unwrap_err();
    assert!(err.is_connectivity(), "got {:?}", err);

    let err = FaultProxy::connect(server.addr, "test").await.unwrap_err();
    assert!(matches!(err, RpcError::ConnectFailed(_)), "got {:?}", err);
}

#[tokio::test]
async fn every_shutdown_waiter_sees_the_drain() {
    let server =
        start(SimulatedProcess::new(77).with_lookup_delay(Duration::from_millis(500))).await;
    let proxy = connect(server.addr).await;
    let call = tokio::spawn(async move { proxy.pid().await });

    // Wait until the slow lookup is running inside the servant.
    while server.process.lookups() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let first = {
        let communicator = server.communicator.clone();
        tokio::spawn(async move { communicator.wait_for_shutdown().await })
    };
    tokio::task::yield_now().await;

    server.communicator.shutdown();
    tokio::time::timeout(
        Duration::from_secs(5),
        server.communicator.wait_for_shutdown(),
    )
    .await
    .expect("runtime did not drain");
    assert!(!server.adapter.is_active());
    assert_eq!(server.communicator.running_adapters(), 0);

    first.await.unwrap();
    assert!(!server.adapter.is_active());

    // The in-flight call was answered before the connection closed.
    assert_eq!(call.await.unwrap().unwrap(), 77);
}

#[tokio::test]
async fn wrong_mode_is_rejected_before_the_servant() {
    let server = start(SimulatedProcess::new(5)).await;
    let proxy = connect(server.addr).await;

    let err = proxy
        .invoke(ops::ABORT, OperationMode::Idempotent)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            RpcError::RemoteException {
                code: RemoteExceptionCode::InvalidMode,
                ..
            }
        ),
        "got {:?}",
        err
    );
    assert!(!server.process.is_terminated());

    // Connection survives a rejected call.
    assert_eq!(proxy.pid().await.unwrap(), 5);

    server.communicator.shutdown();
    server.communicator.wait_for_shutdown().await;
}

#[tokio::test]
async fn unknown_identity_and_operation() {
    let server = start(SimulatedProcess::new(5)).await;

    let stranger = FaultProxy::connect(server.addr, "nobody").await.unwrap();
    let err = stranger.pid().await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::RemoteException {
            code: RemoteExceptionCode::ObjectNotExist,
            ..
        }
    ));

    let proxy = connect(server.addr).await;
    let err = proxy
        .invoke("explode", OperationMode::Normal)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::RemoteException {
            code: RemoteExceptionCode::OperationNotExist,
            ..
        }
    ));

    server.communicator.shutdown();
    server.communicator.wait_for_shutdown().await;
}

#[tokio::test]
async fn builtin_operations() {
    let server = start(SimulatedProcess::new(5)).await;
    let proxy = connect(server.addr).await;

    proxy.ping().await.unwrap();
    assert_eq!(proxy.interface_id().await.unwrap(), INTERFACE_ID);

    let value = proxy
        .invoke(PING_OPERATION, OperationMode::Normal)
        .await
        .unwrap();
    assert!(value.is_null());
    let value = proxy
        .invoke(INTERFACE_ID_OPERATION, OperationMode::Nonmutating)
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!(INTERFACE_ID));

    proxy.close().await;
    server.communicator.shutdown();
    server.communicator.wait_for_shutdown().await;
}
