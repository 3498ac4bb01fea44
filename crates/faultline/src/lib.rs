// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fault-injection test endpoint for RPC fault-tolerance testing.
//!
//! A server process hosts a [`FaultServant`] on an [`ObjectAdapter`]. A test
//! driver then calls it remotely to:
//!
//! - learn which process answered (`pid`, computed once and cached),
//! - kill that process in the middle of a call (`abort`, `idempotentAbort`,
//!   `nonmutatingAbort`; the caller only ever sees a connection failure),
//! - stop the server gracefully (`shutdown`).
//!
//! # Quick Start
//!
//! ```bash
//! # Host the servant as "test" on 127.0.0.1:12010
//! faultline-server --port 12010
//!
//! # Ask which process answers, then kill it
//! faultline-ctl --endpoint 127.0.0.1:12010 pid
//! faultline-ctl --endpoint 127.0.0.1:12010 idempotent-abort
//! ```
//!
//! # Embedding
//!
//! ```rust,no_run
//! use faultline::{Communicator, FaultServant, ServerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::default();
//! let communicator = Communicator::new(config.clone())?;
//! let adapter = communicator.create_object_adapter(&config.adapter_name, config.endpoint())?;
//! adapter.add(&config.identity, Arc::new(FaultServant::new(&adapter)))?;
//! adapter.activate().await?;
//! communicator.wait_for_shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod process;
pub mod runtime;
pub mod servant;

pub use client::FaultProxy;
pub use config::{ConfigError, ServerConfig};
pub use error::{RemoteException, RemoteExceptionCode, RpcError, RpcResult};
pub use process::{OsProcess, ProcessController, ProcessIdentity};
pub use runtime::{
    AdapterError, Communicator, Current, ObjectAdapter, OperationDescriptor, OperationMode,
    Servant,
};
pub use servant::FaultServant;
