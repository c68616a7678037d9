//! Logging setup for the linker client
//!
//! Logs go to stderr through `tracing-subscriber`. The filter comes from
//! `LINKER_LOG` when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{LinkerError, Result};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "LINKER_LOG";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive (e.g., "warn", "linker_client=debug,tokio=warn")
    pub filter: String,
    /// Include file/line in logs
    pub file_line: bool,
}

impl LogConfig {
    /// Quiet by default; `LINKER_LOG` overrides
    pub fn client() -> Self {
        Self {
            filter: std::env::var(LOG_ENV).unwrap_or_else(|_| "warn".into()),
            file_line: false,
        }
    }

    /// Debug output for the linker crates, with source locations
    pub fn verbose() -> Self {
        Self {
            filter: "warn,linker_client=debug,linker_protocol=debug".into(),
            file_line: true,
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.filter)
            .map_err(|e| LinkerError::config(format!("Invalid log filter: {}", e)))
    }
}

/// Install the global subscriber
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = config.env_filter()?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| LinkerError::internal(format!("Failed to init logging: {}", e)))
}
