// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Hosting server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (0 = ephemeral)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name of the object adapter hosting the servant
    #[serde(default = "default_adapter_name")]
    pub adapter_name: String,

    /// Identity the servant is registered under
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Maximum frame size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Disable Nagle on accepted connections
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,

    /// Client-side call timeout in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    12010
}

fn default_adapter_name() -> String {
    "TestAdapter".to_string()
}

fn default_identity() -> String {
    "test".to_string()
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_true() -> bool {
    true
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            adapter_name: default_adapter_name(),
            identity: default_identity(),
            max_message_size: default_max_message_size(),
            tcp_nodelay: true,
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Socket address the adapter binds to.
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Get call timeout as Duration.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adapter_name.is_empty() {
            return Err(ConfigError::Invalid("adapter_name cannot be empty".into()));
        }
        if self.identity.is_empty() {
            return Err(ConfigError::Invalid("identity cannot be empty".into()));
        }
        if self.max_message_size < 64 {
            return Err(ConfigError::Invalid(
                "max_message_size must be at least 64 bytes".into(),
            ));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(ConfigError::Invalid(
                "max_message_size does not fit the 4-byte length prefix".into(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("call_timeout_ms cannot be 0".into()));
        }
        Ok(())
    }
}
