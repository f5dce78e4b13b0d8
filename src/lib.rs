#![forbid(unsafe_code)]

//! Bidirectional JSON-RPC message bus for the Agent Client Protocol.

pub mod acp;
pub mod config;
pub mod echo;
pub mod errors;

pub use config::{ConnectionConfig, LinkConfig};
pub use errors::{AppError, Result};
