//! Integration tests for the client-side `initialize` handshake.

use std::time::Duration;

use serde_json::json;

use acp_link::acp::client::{Client, ClientSideConnection};
use acp_link::acp::error::HandlerResult;
use acp_link::acp::handshake;
use acp_link::acp::schema::{
    ClientCapabilities, FileSystemCapability, RequestPermissionOutcome, RequestPermissionRequest,
    RequestPermissionResponse, SessionNotification, PROTOCOL_VERSION,
};
use acp_link::acp::BoxFuture;
use acp_link::AppError;

use super::test_helpers::{raw_transport, RawPeer};

struct QuietClient;

impl Client for QuietClient {
    fn request_permission(
        &self,
        _args: RequestPermissionRequest,
    ) -> BoxFuture<'_, HandlerResult<RequestPermissionResponse>> {
        Box::pin(async {
            Ok(RequestPermissionResponse {
                outcome: RequestPermissionOutcome::Cancelled,
            })
        })
    }

    fn session_update(&self, _args: SessionNotification) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

fn client_with_raw_agent() -> (ClientSideConnection, RawPeer) {
    let (reader, writer, peer) = raw_transport();
    let client = ClientSideConnection::new(|_| QuietClient, reader, writer);
    (client, peer)
}

/// The request offers the crate's protocol version and the given
/// capabilities on the wire.
#[tokio::test]
async fn initialize_request_carries_version_and_capabilities() {
    let (client, mut peer) = client_with_raw_agent();
    let request = handshake::initialize_request(ClientCapabilities {
        fs: FileSystemCapability {
            read_text_file: true,
            write_text_file: false,
        },
    });

    let exchange = tokio::spawn(async move {
        handshake::initialize(&client, &request, Duration::from_secs(5)).await
    });

    let frame = peer.recv().await;
    assert_eq!(frame["method"], "initialize");
    assert_eq!(frame["params"]["protocolVersion"], PROTOCOL_VERSION);
    assert_eq!(
        frame["params"]["clientCapabilities"]["fs"],
        json!({ "readTextFile": true, "writeTextFile": false })
    );

    peer.send(&json!({
        "jsonrpc": "2.0",
        "id": frame["id"],
        "result": { "protocolVersion": PROTOCOL_VERSION }
    }))
    .await;

    let response = exchange.await.expect("join").expect("handshake");
    assert_eq!(response.protocol_version, PROTOCOL_VERSION);
    assert!(!response.agent_capabilities.load_session);
    assert!(response.auth_methods.is_empty());
}

/// A silent agent fails the handshake after the timeout.
#[tokio::test]
async fn silent_agent_times_out() {
    let (client, mut peer) = client_with_raw_agent();
    let request = handshake::initialize_request(ClientCapabilities::default());

    let exchange = tokio::spawn(async move {
        handshake::initialize(&client, &request, Duration::from_millis(100)).await
    });
    let _frame = peer.recv().await;

    let err = exchange.await.expect("join").expect_err("must time out");
    assert!(
        matches!(&err, AppError::Handshake(msg) if msg.contains("timeout")),
        "got {err:?}"
    );
}

/// An agent selecting a newer version than offered is rejected.
#[tokio::test]
async fn newer_protocol_version_is_rejected() {
    let (client, mut peer) = client_with_raw_agent();
    let request = handshake::initialize_request(ClientCapabilities::default());

    let exchange = tokio::spawn(async move {
        handshake::initialize(&client, &request, Duration::from_secs(5)).await
    });
    let frame = peer.recv().await;
    peer.send(&json!({
        "jsonrpc": "2.0",
        "id": frame["id"],
        "result": { "protocolVersion": PROTOCOL_VERSION + 1 }
    }))
    .await;

    let err = exchange.await.expect("join").expect_err("must be rejected");
    assert!(
        matches!(&err, AppError::Handshake(msg) if msg.contains("unsupported protocol version")),
        "got {err:?}"
    );
}

/// An error answer fails the handshake and keeps the agent's reason.
#[tokio::test]
async fn agent_error_fails_handshake() {
    let (client, mut peer) = client_with_raw_agent();
    let request = handshake::initialize_request(ClientCapabilities::default());

    let exchange = tokio::spawn(async move {
        handshake::initialize(&client, &request, Duration::from_secs(5)).await
    });
    let frame = peer.recv().await;
    peer.send(&json!({
        "jsonrpc": "2.0",
        "id": frame["id"],
        "error": {
            "code": -32603,
            "message": "Internal error",
            "data": { "details": "model offline" }
        }
    }))
    .await;

    let err = exchange.await.expect("join").expect_err("must fail");
    assert!(
        matches!(&err, AppError::Handshake(msg) if msg.contains("model offline")),
        "got {err:?}"
    );
}

/// A result that is not an `initialize` response is reported as a failure.
#[tokio::test]
async fn malformed_initialize_result_fails_handshake() {
    let (client, mut peer) = client_with_raw_agent();
    let request = handshake::initialize_request(ClientCapabilities::default());

    let exchange = tokio::spawn(async move {
        handshake::initialize(&client, &request, Duration::from_secs(5)).await
    });
    let frame = peer.recv().await;
    peer.send(&json!({ "jsonrpc": "2.0", "id": frame["id"], "result": "ready" }))
        .await;

    let err = exchange.await.expect("join").expect_err("must fail");
    assert!(
        matches!(&err, AppError::Handshake(msg) if msg.contains("invalid response")),
        "got {err:?}"
    );
}
