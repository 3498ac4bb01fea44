// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal hosting runtime.
//!
//! A [`Communicator`] owns one or more [`ObjectAdapter`]s. Each adapter
//! listens on a TCP endpoint, decodes request frames and dispatches them to
//! the [`Servant`] registered under the target identity:
//!
//! ```text
//! request -> identity lookup -> operation lookup -> mode check -> servant
//! ```
//!
//! Servants run on the blocking thread pool. Requests are dispatched as they
//! arrive, including several on one connection, so a servant may be running
//! many requests at once.

pub mod adapter;
pub mod communicator;
pub mod connection;
pub mod dispatch;
pub mod protocol;

pub use adapter::{AdapterError, ObjectAdapter, INTERFACE_ID_OPERATION, PING_OPERATION};
pub use communicator::Communicator;
pub use connection::ConnectionError;
pub use dispatch::{Current, DispatchResult, OperationDescriptor, OperationMode, Servant};
pub use protocol::{Frame, ReplyFrame, ReplyStatus, RequestFrame};
