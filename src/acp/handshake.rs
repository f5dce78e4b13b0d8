//! ACP initialization handshake (client side).
//!
//! Before any session work, the client sends `initialize` with the latest
//! protocol version it speaks and its capabilities. The agent answers with
//! the version it selected, which must not be newer than the one offered.
//!
//! [`initialize`] bounds the exchange with a timeout so a silent or
//! misbehaving agent cannot hang the client forever.

use std::time::Duration;

use tracing::{debug, info};

use crate::acp::client::ClientSideConnection;
use crate::acp::schema::{
    ClientCapabilities, InitializeRequest, InitializeResponse, ProtocolVersion, PROTOCOL_VERSION,
};
use crate::{AppError, Result};

/// `initialize` request offering [`PROTOCOL_VERSION`] and `capabilities`.
#[must_use]
pub fn initialize_request(capabilities: ClientCapabilities) -> InitializeRequest {
    InitializeRequest {
        protocol_version: PROTOCOL_VERSION,
        client_capabilities: capabilities,
    }
}

/// Send `initialize` and validate the agent's answer.
///
/// # Errors
///
/// - `AppError::Handshake("initialize timeout …")` — no answer within
///   `timeout`.
/// - `AppError::Handshake("initialize failed: …")` — the agent returned an
///   error or the connection failed.
/// - `AppError::Handshake("unsupported protocol version …")` — the agent
///   selected a version newer than the one offered.
pub async fn initialize(
    client: &ClientSideConnection,
    request: &InitializeRequest,
    timeout: Duration,
) -> Result<InitializeResponse> {
    debug!(
        protocol_version = request.protocol_version,
        "handshake: sending initialize"
    );

    let response = tokio::time::timeout(timeout, client.initialize(request))
        .await
        .map_err(|_| {
            AppError::Handshake(format!(
                "initialize timeout: no answer within {timeout:?}"
            ))
        })?
        .map_err(|e| AppError::Handshake(format!("initialize failed: {e}")))?;

    check_version(request.protocol_version, response.protocol_version)?;

    info!(
        protocol_version = response.protocol_version,
        load_session = response.agent_capabilities.load_session,
        auth_methods = response.auth_methods.len(),
        "handshake: agent initialized"
    );
    Ok(response)
}

fn check_version(offered: ProtocolVersion, selected: ProtocolVersion) -> Result<()> {
    if selected > offered {
        return Err(AppError::Handshake(format!(
            "unsupported protocol version {selected}: client speaks up to {offered}"
        )));
    }
    Ok(())
}
