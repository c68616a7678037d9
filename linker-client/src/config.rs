//! Client configuration
//!
//! Read from `config.toml` in the linker config directory. Every field has
//! a default, so a missing file or a partial file is fine.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use linker_protocol::{DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use linker_utils::{config_file, LinkerError, Result};

use crate::connection::TransportOptions;

/// Broker address used when nothing else is configured
pub const DEFAULT_ADDR: &str = "ws://127.0.0.1:12360/ws";

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker address or remote alias
    pub addr: String,
    pub namespace: Option<String>,
    pub credential: Option<String>,
    pub connect_timeout_ms: u64,
    /// Largest frame accepted on `tcp://` endpoints
    pub max_frame_size: usize,
    /// Alias -> address
    pub remotes: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.into(),
            namespace: None,
            credential: None,
            connect_timeout_ms: 5000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            remotes: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LinkerError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| LinkerError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(LinkerError::config("connect_timeout_ms must be non-zero"));
        }

        if self.max_frame_size < HEADER_SIZE {
            return Err(LinkerError::config(format!(
                "max_frame_size must be at least {}",
                HEADER_SIZE
            )));
        }

        if self.addr.is_empty() {
            return Err(LinkerError::config("addr must not be empty"));
        }

        Ok(())
    }

    /// Resolve a remote alias, or return `name` unchanged
    pub fn resolve_addr(&self, name: &str) -> String {
        self.remotes
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_frame_size: self.max_frame_size,
        }
    }
}
