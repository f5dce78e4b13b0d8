//! Configuration parsing and validation.
//!
//! Configuration is read from a TOML file with two optional sections:
//!
//! ```toml
//! [connection]
//! max_line_bytes = 1048576
//! outbound_buffer = 64
//! max_in_flight_handlers = 16
//!
//! [agent]
//! command = "acp-echo-agent"
//! args = ["--log-format", "json"]
//! cwd = "/path/to/workspace"
//! handshake_timeout_seconds = 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::acp::codec::MAX_LINE_BYTES;
use crate::{AppError, Result};

fn default_max_line_bytes() -> usize {
    MAX_LINE_BYTES
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_handshake_timeout_seconds() -> u64 {
    10
}

/// Per-connection tuning knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConnectionConfig {
    /// Maximum accepted length of one inbound frame, in bytes.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Capacity of the outbound frame queue feeding the writer task.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Upper bound on concurrently running inbound handlers.
    ///
    /// `None` (the default) leaves handler concurrency unbounded. When set,
    /// the dispatch loop stops reading frames while the bound is reached.
    #[serde(default)]
    pub max_in_flight_handlers: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: default_max_line_bytes(),
            outbound_buffer: default_outbound_buffer(),
            max_in_flight_handlers: None,
        }
    }
}

impl ConnectionConfig {
    /// Check invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when any size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_line_bytes == 0 {
            return Err(AppError::Config(
                "max_line_bytes must be greater than zero".into(),
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(AppError::Config(
                "outbound_buffer must be greater than zero".into(),
            ));
        }
        if self.max_in_flight_handlers == Some(0) {
            return Err(AppError::Config(
                "max_in_flight_handlers must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }
}

/// How to launch an agent process that speaks ACP over stdio.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentCommandConfig {
    /// Agent executable.
    pub command: String,
    /// Arguments passed to the agent.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory of the agent; defaults to the current directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Seconds allowed for the `initialize` exchange.
    #[serde(default = "default_handshake_timeout_seconds")]
    pub handshake_timeout_seconds: u64,
}

impl AgentCommandConfig {
    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }
}

/// Top-level configuration parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LinkConfig {
    /// Connection tuning.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Agent process launch settings (client side only).
    #[serde(default)]
    pub agent: Option<AgentCommandConfig>,
}

impl LinkConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.connection.validate()?;

        if let Some(agent) = &self.agent {
            if agent.command.trim().is_empty() {
                return Err(AppError::Config("agent.command must not be empty".into()));
            }
            if agent.handshake_timeout_seconds == 0 {
                return Err(AppError::Config(
                    "agent.handshake_timeout_seconds must be greater than zero".into(),
                ));
            }
        }

        Ok(())
    }
}
