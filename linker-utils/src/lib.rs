//! linker-utils: Common utilities shared across Linker-IM crates
//!
//! This crate provides:
//! - Unified error type ([`LinkerError`], [`Result`])
//! - Logging setup ([`init_logging_with_config`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

// Re-export main types at crate root for convenience
pub use error::{LinkerError, Result};
pub use logging::{init_logging_with_config, LogConfig};
pub use paths::{config_dir, config_file};
