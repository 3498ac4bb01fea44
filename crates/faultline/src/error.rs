// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for remote invocations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Exception codes carried in a failed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
#[repr(i32)]
pub enum RemoteExceptionCode {
    /// No error, request processed successfully
    #[default]
    Ok = 0,
    /// No servant registered under the target identity
    ObjectNotExist = 1,
    /// Servant does not implement the operation
    OperationNotExist = 2,
    /// Declared call mode does not match the operation
    InvalidMode = 3,
    /// Adapter or communicator is no longer available
    AdapterDestroyed = 4,
    /// Communicator is shutting down
    CommunicatorShutdown = 5,
    /// Unknown/custom error
    Unknown = -1,
}

impl RemoteExceptionCode {
    /// Convert from i32
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::ObjectNotExist,
            2 => Self::OperationNotExist,
            3 => Self::InvalidMode,
            4 => Self::AdapterDestroyed,
            5 => Self::CommunicatorShutdown,
            _ => Self::Unknown,
        }
    }

    /// Convert to i32
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<i32> for RemoteExceptionCode {
    fn from(value: i32) -> Self {
        Self::from_i32(value)
    }
}

impl From<RemoteExceptionCode> for i32 {
    fn from(code: RemoteExceptionCode) -> Self {
        code.as_i32()
    }
}

/// Exception raised by the dispatch pipeline and sent back in a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteException {
    pub code: RemoteExceptionCode,
    pub message: String,
}

impl RemoteException {
    pub fn new(code: RemoteExceptionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteException {}

/// Errors that can occur during RPC operations
#[derive(Debug)]
pub enum RpcError {
    /// Could not establish a connection to the endpoint
    ConnectFailed(String),

    /// Connection dropped while calls were in flight
    ConnectionLost,

    /// Peer closed the connection gracefully
    ConnectionClosed,

    /// Request timed out waiting for reply
    Timeout,

    /// Remote side returned an exception
    RemoteException {
        code: RemoteExceptionCode,
        message: Option<String>,
    },

    /// Reply could not be decoded into the expected result
    DeserializationError(String),

    /// A reply arrived for an operation that must never reply
    UnexpectedReply(String),

    /// Local adapter is gone (servant outlived its host)
    AdapterDestroyed,
}

impl RpcError {
    /// Create a remote exception with message
    pub fn remote_with_message(code: RemoteExceptionCode, message: impl Into<String>) -> Self {
        Self::RemoteException {
            code,
            message: Some(message.into()),
        }
    }

    /// True when the failure means the peer process is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed(_) | Self::ConnectionLost | Self::ConnectionClosed
        )
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(msg) => write!(f, "Connect failed: {}", msg),
            Self::ConnectionLost => write!(f, "Connection lost"),
            Self::ConnectionClosed => write!(f, "Connection closed by peer"),
            Self::Timeout => write!(f, "RPC request timed out"),
            Self::RemoteException { code, message } => {
                write!(f, "Remote exception: {:?}", code)?;
                if let Some(msg) = message {
                    write!(f, " - {}", msg)?;
                }
                Ok(())
            }
            Self::DeserializationError(msg) => write!(f, "RPC deserialization error: {}", msg),
            Self::UnexpectedReply(op) => write!(f, "Unexpected reply to '{}'", op),
            Self::AdapterDestroyed => write!(f, "Object adapter destroyed"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<RemoteException> for RpcError {
    fn from(e: RemoteException) -> Self {
        Self::remote_with_message(e.code, e.message)
    }
}

impl From<RpcError> for RemoteException {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::RemoteException { code, message } => {
                RemoteException::new(code, message.unwrap_or_default())
            }
            RpcError::AdapterDestroyed => RemoteException::new(
                RemoteExceptionCode::AdapterDestroyed,
                "object adapter destroyed",
            ),
            other => RemoteException::new(RemoteExceptionCode::Unknown, other.to_string()),
        }
    }
}
