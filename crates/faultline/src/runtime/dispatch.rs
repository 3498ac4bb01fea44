// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Servant dispatch contract.

use crate::error::RemoteException;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Result of dispatching one request to a servant.
pub type DispatchResult = Result<serde_json::Value, RemoteException>;

/// Call category declared for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// May mutate servant state; never retried transparently
    #[default]
    Normal,
    /// Safe to invoke more than once
    Idempotent,
    /// Read-only
    Nonmutating,
}

impl OperationMode {
    /// Whether a request sent with `received` may be routed to an operation
    /// declared with `self`.
    ///
    /// Modes must match, except that idempotent operations also accept
    /// nonmutating requests.
    pub fn accepts(self, received: OperationMode) -> bool {
        self == received || (self == Self::Idempotent && received == Self::Nonmutating)
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Idempotent => write!(f, "idempotent"),
            Self::Nonmutating => write!(f, "nonmutating"),
        }
    }
}

/// Static description of one servant operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub mode: OperationMode,
}

impl OperationDescriptor {
    pub const fn new(name: &'static str, mode: OperationMode) -> Self {
        Self { name, mode }
    }
}

/// Per-call context handed to every servant operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Current {
    /// Identity the request was addressed to
    pub identity: String,
    /// Operation name
    pub operation: String,
    /// Mode declared by the caller
    pub mode: OperationMode,
    /// Caller-assigned request id
    pub request_id: u64,
    /// Remote address of the caller
    pub peer: Option<SocketAddr>,
}

impl Current {
    pub fn new(identity: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            operation: operation.into(),
            mode: OperationMode::Normal,
            request_id: 0,
            peer: None,
        }
    }

    pub fn with_mode(mut self, mode: OperationMode) -> Self {
        self.mode = mode;
        self
    }
}

/// An object hosted by an [`ObjectAdapter`](super::ObjectAdapter).
///
/// Called from the blocking thread pool; implementations may block and may
/// be invoked concurrently.
pub trait Servant: Send + Sync + 'static {
    /// Interface id reported by the built-in `_id` operation.
    fn interface_id(&self) -> &'static str;

    /// Operations this servant implements.
    fn operations(&self) -> &'static [OperationDescriptor];

    /// Run `current.operation`. Only called for names listed in
    /// [`operations`](Servant::operations) with a compatible mode.
    fn dispatch(&self, current: &Current) -> DispatchResult;
}
