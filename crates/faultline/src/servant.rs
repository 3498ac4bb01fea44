// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fault-injection servant.
//!
//! Remote test drivers use it to find out which process answered a call
//! (`pid`), to kill that process in the middle of a call (`abort` and its
//! idempotent and nonmutating variants) and to stop the server cleanly
//! (`shutdown`).
//!
//! The three aborts are the same operation declared under different call
//! modes. The runtime routes by name; the servant never looks at the mode.

use crate::error::{RemoteException, RemoteExceptionCode, RpcError, RpcResult};
use crate::process::{OsProcess, ProcessController, ProcessIdentity};
use crate::runtime::{
    Current, DispatchResult, ObjectAdapter, OperationDescriptor, OperationMode, Servant,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Interface id of the fault-injection servant.
pub const INTERFACE_ID: &str = "::Test::TestIntf";

/// Operation names as they appear on the wire.
pub mod ops {
    pub const ABORT: &str = "abort";
    pub const IDEMPOTENT_ABORT: &str = "idempotentAbort";
    pub const NONMUTATING_ABORT: &str = "nonmutatingAbort";
    pub const PID: &str = "pid";
    pub const SHUTDOWN: &str = "shutdown";
}

const OPERATIONS: &[OperationDescriptor] = &[
    OperationDescriptor::new(ops::ABORT, OperationMode::Normal),
    OperationDescriptor::new(ops::IDEMPOTENT_ABORT, OperationMode::Idempotent),
    OperationDescriptor::new(ops::NONMUTATING_ABORT, OperationMode::Nonmutating),
    OperationDescriptor::new(ops::PID, OperationMode::Normal),
    OperationDescriptor::new(ops::SHUTDOWN, OperationMode::Normal),
];

/// Servant exposing process identity and process termination to remote
/// callers.
pub struct FaultServant {
    adapter: Weak<ObjectAdapter>,
    identity: Arc<dyn ProcessIdentity>,
    controller: Arc<dyn ProcessController>,
    cached_pid: Mutex<Option<i32>>,
}

impl FaultServant {
    /// Servant for the real process hosting `adapter`.
    pub fn new(adapter: &Arc<ObjectAdapter>) -> Self {
        Self::with_process(adapter, Arc::new(OsProcess))
    }

    /// Servant whose identity and termination come from `process`.
    pub fn with_process<P>(adapter: &Arc<ObjectAdapter>, process: Arc<P>) -> Self
    where
        P: ProcessIdentity + ProcessController,
    {
        Self::with_primitives(adapter, process.clone(), process)
    }

    pub fn with_primitives(
        adapter: &Arc<ObjectAdapter>,
        identity: Arc<dyn ProcessIdentity>,
        controller: Arc<dyn ProcessController>,
    ) -> Self {
        Self {
            adapter: Arc::downgrade(adapter),
            identity,
            controller,
            cached_pid: Mutex::new(None),
        }
    }

    /// Kill the hosting process. No reply is sent.
    pub fn abort(&self, current: &Current) -> ! {
        self.terminate(ops::ABORT, current)
    }

    /// Same as [`abort`](Self::abort), declared idempotent.
    pub fn idempotent_abort(&self, current: &Current) -> ! {
        self.terminate(ops::IDEMPOTENT_ABORT, current)
    }

    /// Same as [`abort`](Self::abort), declared nonmutating.
    pub fn nonmutating_abort(&self, current: &Current) -> ! {
        self.terminate(ops::NONMUTATING_ABORT, current)
    }

    /// Identity of the hosting process.
    ///
    /// The lookup runs once; every caller, concurrent or not, gets the value
    /// stored by the first one.
    pub fn pid(&self, _current: &Current) -> i32 {
        let mut cached = self.cached_pid.lock();
        *cached.get_or_insert_with(|| {
            let pid = self.identity.lookup();
            debug!("Cached process identity {}", pid);
            pid
        })
    }

    /// Ask the adapter's communicator to begin an orderly shutdown.
    ///
    /// Returns as soon as the request is registered; the process keeps
    /// running until the hosting code observes the shutdown.
    pub fn shutdown(&self, current: &Current) -> RpcResult<()> {
        let adapter = self.adapter.upgrade().ok_or(RpcError::AdapterDestroyed)?;
        info!(
            "Shutdown requested by {} via adapter '{}'",
            peer_of(current),
            adapter.name()
        );
        adapter.communicator().shutdown();
        Ok(())
    }

    /// Identity stored by a previous `pid` call, if any.
    pub fn cached_pid(&self) -> Option<i32> {
        *self.cached_pid.lock()
    }

    fn terminate(&self, operation: &str, current: &Current) -> ! {
        warn!(
            "{} requested by {} (mode {}); terminating",
            operation,
            peer_of(current),
            current.mode
        );
        self.controller.terminate_self()
    }
}

fn peer_of(current: &Current) -> String {
    current
        .peer
        .map(|p| p.to_string())
        .unwrap_or_else(|| "local caller".to_string())
}

impl Servant for FaultServant {
    fn interface_id(&self) -> &'static str {
        INTERFACE_ID
    }

    fn operations(&self) -> &'static [OperationDescriptor] {
        OPERATIONS
    }

    fn dispatch(&self, current: &Current) -> DispatchResult {
        match current.operation.as_str() {
            ops::ABORT => self.abort(current),
            ops::IDEMPOTENT_ABORT => self.idempotent_abort(current),
            ops::NONMUTATING_ABORT => self.nonmutating_abort(current),
            ops::PID => Ok(self.pid(current).into()),
            ops::SHUTDOWN => self
                .shutdown(current)
                .map(|()| serde_json::Value::Null)
                .map_err(RemoteException::from),
            other => Err(RemoteException::new(
                RemoteExceptionCode::OperationNotExist,
                format!("'{}' has no operation '{}'", INTERFACE_ID, other),
            )),
        }
    }
}

impl std::fmt::Debug for FaultServant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultServant")
            .field("cached_pid", &self.cached_pid())
            .finish_non_exhaustive()
    }
}
