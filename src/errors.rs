//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

use crate::acp::error::ProtocolError;

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Crate error enumeration covering all local failure modes.
///
/// Wire-level failures reported by the remote peer arrive as
/// [`AppError::Rpc`] and keep their original [`ProtocolError`] intact.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Framing, serialisation or stream write failure.
    Transport(String),
    /// The connection reached its terminal state.
    ConnectionClosed(String),
    /// The remote peer answered a request with an error object.
    Rpc(ProtocolError),
    /// A response result did not match the expected shape.
    InvalidResponse(String),
    /// Protocol initialisation exchange failed.
    Handshake(String),
    /// Agent child process could not be launched.
    Spawn(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::ConnectionClosed(msg) => write!(f, "connection closed: {msg}"),
            Self::Rpc(err) => write!(f, "rpc: {err}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Self::Handshake(msg) => write!(f, "handshake: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("json serialisation failed: {err}"))
    }
}

impl From<ProtocolError> for AppError {
    fn from(err: ProtocolError) -> Self {
        Self::Rpc(err)
    }
}
