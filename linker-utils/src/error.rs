//! Error types for the Linker-IM client
//!
//! Provides a unified error type used across all linker crates. The three
//! protocol-level classes are [`LinkerError::Protocol`] (malformed or
//! out-of-sequence units), [`LinkerError::Auth`] (the broker refused the
//! credential) and [`LinkerError::Operation`] (misuse, or a request the
//! broker rejected).

use std::path::PathBuf;

use linker_protocol::ProtocolError;

/// Main error type for linker operations
#[derive(Debug, thiserror::Error)]
pub enum LinkerError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection timeout after {seconds}s")]
    ConnectionTimeout { seconds: u64 },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LinkerError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create an operation error
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The operation was attempted without a live session
    pub fn not_connected() -> Self {
        Self::Operation("Not connected.".into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
            | Self::Connection(_)
            | Self::ConnectionClosed
        )
    }
}

/// Result type alias using LinkerError
pub type Result<T> = std::result::Result<T, LinkerError>;
