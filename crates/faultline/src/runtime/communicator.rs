// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Communicator: owns configuration, the shutdown signal and the count of
//! running adapters.

use super::adapter::{AdapterError, ObjectAdapter};
use crate::config::{ConfigError, ServerConfig};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Hosting runtime handle. Cheap to clone.
#[derive(Clone)]
pub struct Communicator {
    inner: Arc<CommunicatorInner>,
}

struct CommunicatorInner {
    config: ServerConfig,
    shutdown_tx: watch::Sender<bool>,
    running_tx: watch::Sender<usize>,
    adapter_names: Mutex<Vec<String>>,
}

/// Counts one running accept loop; released when the loop task ends.
pub(crate) struct RunningAdapter {
    running_tx: watch::Sender<usize>,
}

impl Drop for RunningAdapter {
    fn drop(&mut self) {
        self.running_tx.send_modify(|n| *n -= 1);
    }
}

impl Communicator {
    /// Create a communicator from a validated configuration.
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (shutdown_tx, _) = watch::channel(false);
        let (running_tx, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(CommunicatorInner {
                config,
                shutdown_tx,
                running_tx,
                adapter_names: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Create a named object adapter that will listen on `endpoint`.
    pub fn create_object_adapter(
        &self,
        name: &str,
        endpoint: SocketAddr,
    ) -> Result<Arc<ObjectAdapter>, AdapterError> {
        if self.is_shutdown() {
            return Err(AdapterError::CommunicatorShutdown);
        }

        let mut names = self.inner.adapter_names.lock();
        if names.iter().any(|n| n == name) {
            return Err(AdapterError::NameInUse(name.to_string()));
        }
        names.push(name.to_string());

        debug!("Created object adapter '{}' for {}", name, endpoint);
        Ok(Arc::new(ObjectAdapter::new(name, endpoint, self.clone())))
    }

    /// Begin an orderly shutdown.
    ///
    /// Returns immediately. Adapters stop accepting connections, finish the
    /// request each connection is processing, and close. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.shutdown_tx.send_replace(true) {
            info!("Communicator shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Subscribe to the shutdown signal.
    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Count an accept loop as running until the returned guard drops.
    pub(crate) fn track_adapter(&self) -> RunningAdapter {
        self.inner.running_tx.send_modify(|n| *n += 1);
        RunningAdapter {
            running_tx: self.inner.running_tx.clone(),
        }
    }

    /// Number of adapters whose accept loop has not finished draining.
    pub fn running_adapters(&self) -> usize {
        *self.inner.running_tx.borrow()
    }

    /// Wait until shutdown has been requested and every adapter has drained.
    ///
    /// Any number of callers may wait; all of them resume only once the
    /// last adapter has finished its in-flight requests.
    pub async fn wait_for_shutdown(&self) {
        // Both senders live in `inner`, which we hold; wait_for cannot fail.
        let mut shutdown = self.shutdown_signal();
        let _ = shutdown.wait_for(|down| *down).await;

        let mut running = self.inner.running_tx.subscribe();
        let _ = running.wait_for(|n| *n == 0).await;

        debug!("Communicator drained");
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("shutdown", &self.is_shutdown())
            .field("running_adapters", &self.running_adapters())
            .field("adapters", &*self.inner.adapter_names.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = ServerConfig {
            adapter_name: String::new(),
            ..Default::default()
        };
        assert!(Communicator::new(config).is_err());
    }

    #[test]
    fn adapter_names_are_unique() {
        let communicator = Communicator::new(ServerConfig::default()).unwrap();
        communicator.create_object_adapter("A", local()).unwrap();

        let err = communicator.create_object_adapter("A", local()).unwrap_err();
        assert!(matches!(err, AdapterError::NameInUse(ref n) if n == "A"));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let communicator = Communicator::new(ServerConfig::default()).unwrap();
        assert!(!communicator.is_shutdown());

        communicator.shutdown();
        communicator.shutdown();
        assert!(communicator.is_shutdown());
    }

    #[test]
    fn no_adapters_after_shutdown() {
        let communicator = Communicator::new(ServerConfig::default()).unwrap();
        communicator.shutdown();

        let err = communicator.create_object_adapter("A", local()).unwrap_err();
        assert!(matches!(err, AdapterError::CommunicatorShutdown));
    }

    #[tokio::test]
    async fn wait_for_shutdown_resolves_after_shutdown() {
        let communicator = Communicator::new(ServerConfig::default()).unwrap();

        let waiter = {
            let communicator = communicator.clone();
            tokio::spawn(async move { communicator.wait_for_shutdown().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        communicator.shutdown();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("wait_for_shutdown did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn every_waiter_blocks_until_adapters_stop() {
        let communicator = Communicator::new(ServerConfig::default()).unwrap();
        let guard = communicator.track_adapter();
        assert_eq!(communicator.running_adapters(), 1);

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let communicator = communicator.clone();
                tokio::spawn(async move { communicator.wait_for_shutdown().await })
            })
            .collect();

        communicator.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(waiters.iter().all(|w| !w.is_finished()));

        drop(guard);
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(5), waiter)
                .await
                .expect("waiter did not resolve")
                .unwrap();
        }
        assert_eq!(communicator.running_adapters(), 0);
    }
}
