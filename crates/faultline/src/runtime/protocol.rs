// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Invocation wire protocol.
//!
//! Length-prefixed JSON frames, shared by the adapter and the client proxy.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use super::dispatch::OperationMode;
use crate::error::{RemoteException, RemoteExceptionCode};
use serde::{Deserialize, Serialize};

/// Frames exchanged on a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Client invokes an operation.
    #[serde(rename = "request")]
    Request(RequestFrame),

    /// Server answers a request.
    #[serde(rename = "reply")]
    Reply(ReplyFrame),

    /// Sender is about to close the connection gracefully.
    #[serde(rename = "close")]
    Close,
}

/// An invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub request_id: u64,
    pub identity: String,
    pub operation: String,
    #[serde(default)]
    pub mode: OperationMode,
}

/// Answer to a [`RequestFrame`] with the same `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub request_id: u64,
    pub status: ReplyStatus,
}

/// Outcome carried by a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok {
        #[serde(default)]
        value: serde_json::Value,
    },
    Exception {
        code: RemoteExceptionCode,
        message: String,
    },
}

impl ReplyFrame {
    pub fn ok(request_id: u64, value: serde_json::Value) -> Self {
        Self {
            request_id,
            status: ReplyStatus::Ok { value },
        }
    }

    pub fn exception(request_id: u64, exc: RemoteException) -> Self {
        Self {
            request_id,
            status: ReplyStatus::Exception {
                code: exc.code,
                message: exc.message,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ReplyStatus::Ok { .. })
    }

    /// Split into the returned value or the remote exception.
    pub fn into_result(self) -> Result<serde_json::Value, RemoteException> {
        match self.status {
            ReplyStatus::Ok { value } => Ok(value),
            ReplyStatus::Exception { code, message } => Err(RemoteException::new(code, message)),
        }
    }
}

/// Protocol error types.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    EmptyFrame,
    FrameTooLarge { len: usize, max: usize },
    InvalidFrame(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFrame => write!(f, "Empty frame"),
            Self::FrameTooLarge { len, max } => write!(f, "Frame too large: {} > {}", len, max),
            Self::InvalidFrame(s) => write!(f, "Invalid frame: {}", s),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a frame body (without the length prefix).
pub fn encode(frame: &Frame, max_size: usize) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(frame).map_err(|e| ProtocolError::InvalidFrame(e.to_string()))?;
    check_len(json.len(), max_size)?;
    Ok(json)
}

/// Decode a frame body.
pub fn decode(body: &[u8]) -> Result<Frame, ProtocolError> {
    serde_json::from_slice(body).map_err(|e| ProtocolError::InvalidFrame(format!("{}", e)))
}

/// Validate a frame length against the configured limit.
pub fn check_len(len: usize, max_size: usize) -> Result<(), ProtocolError> {
    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    if len > max_size {
        return Err(ProtocolError::FrameTooLarge { len, max: max_size });
    }
    Ok(())
}
