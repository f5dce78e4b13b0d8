//! Integration tests for request/response correlation and inbound dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use acp_link::acp::connection::handler_fn;
use acp_link::acp::error::{HandlerError, ProtocolError, ValidationError};
use acp_link::config::ConnectionConfig;
use acp_link::AppError;

use super::test_helpers::{connect_raw, connected_pair, STEP_TIMEOUT};

/// Handler that answers every request with `{"method": m, "params": p}`.
fn echo_handler() -> impl acp_link::acp::connection::MethodHandler {
    handler_fn(|method, params| async move { Ok(json!({ "method": method, "params": params })) })
}

/// Handler that never expects to be called.
fn unused_handler() -> impl acp_link::acp::connection::MethodHandler {
    handler_fn(|method, _| async move {
        Err(HandlerError::other(format!("unexpected call to {method}")))
    })
}

// ── Round trips ──────────────────────────────────────────────────────────────

/// A request is answered with the peer handler's result.
#[tokio::test]
async fn request_round_trip_returns_handler_result() {
    let (client, _agent) = connected_pair(unused_handler(), echo_handler());

    let result = client
        .send_request("session/new", json!({ "cwd": "/tmp" }))
        .await
        .expect("request succeeds");

    assert_eq!(
        result,
        json!({ "method": "session/new", "params": { "cwd": "/tmp" } })
    );
}

/// Notifications reach the peer handler and produce no response.
#[tokio::test]
async fn notification_is_delivered() {
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, Value)>();
    let recorder = handler_fn(move |method, params| {
        let tx = tx.clone();
        async move {
            tx.send((method, params)).expect("record call");
            Ok(Value::Null)
        }
    });
    let (client, _agent) = connected_pair(unused_handler(), recorder);

    client
        .send_notification("session/cancel", json!({ "sessionId": "s-1" }))
        .await
        .expect("notification written");

    let (method, params) = tokio::time::timeout(STEP_TIMEOUT, rx.recv())
        .await
        .expect("notification delivered in time")
        .expect("recorder alive");
    assert_eq!(method, "session/cancel");
    assert_eq!(params, json!({ "sessionId": "s-1" }));
}

/// A notification resolves once written, without waiting for the peer's
/// handler to finish.
#[tokio::test]
async fn notification_does_not_wait_for_handler() {
    let (started_tx, mut started) = mpsc::unbounded_channel::<()>();
    let stalled = handler_fn(move |_, _| {
        let started_tx = started_tx.clone();
        async move {
            started_tx.send(()).expect("record start");
            std::future::pending::<()>().await;
            Ok(Value::Null)
        }
    });
    let (client, _agent) = connected_pair(unused_handler(), stalled);

    tokio::time::timeout(
        Duration::from_millis(500),
        client.send_notification("session/cancel", json!({ "sessionId": "s-1" })),
    )
    .await
    .expect("notification resolves while the handler is still running")
    .expect("notification written");

    tokio::time::timeout(STEP_TIMEOUT, started.recv())
        .await
        .expect("handler started in time")
        .expect("handler alive");
}

/// Both sides can issue requests over the same connection pair.
#[tokio::test]
async fn requests_flow_in_both_directions() {
    let (left, right) = connected_pair(echo_handler(), echo_handler());

    let (from_left, from_right) = tokio::join!(
        left.send_request("fs/read_text_file", json!({ "path": "/a" })),
        right.send_request("session/prompt", json!({ "prompt": [] })),
    );

    assert_eq!(from_left.expect("left request")["method"], "fs/read_text_file");
    assert_eq!(from_right.expect("right request")["method"], "session/prompt");
}

// ── Error conversions ────────────────────────────────────────────────────────

/// A protocol error raised by the handler reaches the caller unchanged.
#[tokio::test]
async fn protocol_error_is_passed_through() {
    let failing = handler_fn(|_, _| async {
        Err::<Value, HandlerError>(
            ProtocolError::internal_error()
                .with_details("Custom internal error")
                .into(),
        )
    });
    let (client, _agent) = connected_pair(unused_handler(), failing);

    let err = client
        .send_request("session/prompt", json!({}))
        .await
        .expect_err("request must fail");

    let AppError::Rpc(err) = err else {
        panic!("expected Rpc error, got {err:?}");
    };
    assert_eq!(err.code(), -32603);
    assert_eq!(err.message(), "Internal error");
    assert_eq!(err.details(), Some("Custom internal error"));
}

/// A validation failure surfaces as `Invalid params`.
#[tokio::test]
async fn validation_failure_surfaces_as_invalid_params() {
    let failing = handler_fn(|_, _| async {
        Err::<Value, HandlerError>(ValidationError::single(&["sessionId"], "required").into())
    });
    let (client, _agent) = connected_pair(unused_handler(), failing);

    let err = client
        .send_request("session/prompt", json!({}))
        .await
        .expect_err("request must fail");

    let AppError::Rpc(err) = err else {
        panic!("expected Rpc error, got {err:?}");
    };
    assert_eq!(err.code(), -32602);
    assert_eq!(err.details(), Some("sessionId: required"));
}

/// Any other failure surfaces as `Internal error` with its message.
#[tokio::test]
async fn generic_failure_surfaces_as_internal_error() {
    let failing =
        handler_fn(|_, _| async { Err::<Value, _>(HandlerError::other("generic error")) });
    let (client, _agent) = connected_pair(unused_handler(), failing);

    let err = client
        .send_request("session/prompt", json!({}))
        .await
        .expect_err("request must fail");

    let AppError::Rpc(err) = err else {
        panic!("expected Rpc error, got {err:?}");
    };
    assert_eq!(err.code(), -32603);
    assert_eq!(err.details(), Some("generic error"));
}

/// A panicking handler still produces exactly one `Internal error` response
/// and the connection keeps serving.
#[tokio::test]
async fn panicking_handler_is_reported_as_internal_error() {
    let fragile = handler_fn(|method, _| async move {
        assert!(method != "boom", "handler exploded");
        Ok(json!("fine"))
    });
    let (client, _agent) = connected_pair(unused_handler(), fragile);

    let err = client
        .send_request("boom", Value::Null)
        .await
        .expect_err("panic becomes an error response");
    let AppError::Rpc(err) = err else {
        panic!("expected Rpc error, got {err:?}");
    };
    assert_eq!(err.code(), -32603);

    let ok = client
        .send_request("calm", Value::Null)
        .await
        .expect("connection survives the panic");
    assert_eq!(ok, json!("fine"));
}

// ── Concurrency ──────────────────────────────────────────────────────────────

/// Responses arriving out of order are matched to the right callers.
#[tokio::test]
async fn concurrent_requests_resolve_out_of_order() {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<u64>();
    let slow_first = handler_fn(move |_, params| {
        let done_tx = done_tx.clone();
        async move {
            let delay = params["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            done_tx.send(delay).expect("record completion");
            Ok(json!({ "delay_ms": delay }))
        }
    });
    let (client, _agent) = connected_pair(unused_handler(), slow_first);

    let (slow, fast) = tokio::join!(
        client.send_request("work", json!({ "delay_ms": 200 })),
        client.send_request("work", json!({ "delay_ms": 0 })),
    );

    assert_eq!(slow.expect("slow request")["delay_ms"], 200);
    assert_eq!(fast.expect("fast request")["delay_ms"], 0);

    let first_done = done_rx.recv().await.expect("completion recorded");
    assert_eq!(first_done, 0, "the fast handler must finish first");
}

/// With a handler bound of one, handlers never overlap.
#[tokio::test]
async fn in_flight_bound_serialises_handlers() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tracked = {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        handler_fn(move |_, _| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        })
    };

    let bounded = ConnectionConfig {
        max_in_flight_handlers: Some(1),
        ..ConnectionConfig::default()
    };
    let (_agent, mut peer) = connect_raw(tracked, &bounded);

    for id in 0..3 {
        peer.send(&json!({ "jsonrpc": "2.0", "id": id, "method": "work" }))
            .await;
    }
    for _ in 0..3 {
        let response = peer.recv().await;
        assert!(response.get("result").is_some(), "got {response}");
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

// ── Wire behaviour ───────────────────────────────────────────────────────────

/// Outbound requests carry `jsonrpc: "2.0"` and fresh, increasing ids.
#[tokio::test]
async fn outbound_requests_use_increasing_numeric_ids() {
    let (conn, mut peer) = connect_raw(unused_handler(), &ConnectionConfig::default());

    let first = tokio::spawn({
        let conn = conn.clone();
        async move { conn.send_request("first", json!({ "n": 1 })).await }
    });
    let frame_one = peer.recv().await;

    let second = tokio::spawn({
        let conn = conn.clone();
        async move { conn.send_request("second", Value::Null).await }
    });
    let frame_two = peer.recv().await;

    assert_eq!(frame_one["jsonrpc"], "2.0");
    assert_eq!(frame_one["method"], "first");
    assert_eq!(frame_one["params"], json!({ "n": 1 }));
    assert!(frame_two.get("params").is_none(), "null params are omitted");

    let id_one = frame_one["id"].as_i64().expect("numeric id");
    let id_two = frame_two["id"].as_i64().expect("numeric id");
    assert!(id_two > id_one, "ids must increase: {id_one} then {id_two}");

    peer.send(&json!({ "jsonrpc": "2.0", "id": id_two, "result": "two" }))
        .await;
    peer.send(&json!({ "jsonrpc": "2.0", "id": id_one, "result": "one" }))
        .await;

    assert_eq!(first.await.expect("join").expect("first"), json!("one"));
    assert_eq!(second.await.expect("join").expect("second"), json!("two"));
}

/// A response for an id nobody is waiting on is dropped and the connection
/// keeps working.
#[tokio::test]
async fn unknown_response_id_is_ignored() {
    let (conn, mut peer) = connect_raw(echo_handler(), &ConnectionConfig::default());

    peer.send(&json!({ "jsonrpc": "2.0", "id": 9999, "result": "stray" }))
        .await;
    peer.send(&json!({ "jsonrpc": "2.0", "id": "req-1", "method": "ping" }))
        .await;

    let response = peer.recv().await;
    assert_eq!(response["id"], "req-1");
    assert_eq!(response["result"]["method"], "ping");
    assert!(!conn.is_closed());
}

/// Malformed frames are not answered and do not stop the connection.
#[tokio::test]
async fn malformed_frame_is_not_fatal() {
    let (conn, mut peer) = connect_raw(echo_handler(), &ConnectionConfig::default());

    let outbound = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.send_request("x", Value::Null).await })
    };
    let request = peer.recv().await;

    peer.send_raw("this is not json\n").await;
    peer.send_bytes(b"\xff\xfe garbage\n").await;
    peer.send(&json!({ "jsonrpc": "2.0", "something": "else" }))
        .await;
    peer.send(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .await;

    let response = peer.recv().await;
    assert_eq!(response["id"], 1, "first frame back answers the valid request");
    assert!(!conn.is_closed());

    peer.send(&json!({ "jsonrpc": "2.0", "id": request["id"], "result": "pong" }))
        .await;
    let outcome = tokio::time::timeout(STEP_TIMEOUT, outbound)
        .await
        .expect("pending request resolved in time")
        .expect("join");
    assert_eq!(outcome.expect("pending request survives"), json!("pong"));
}

/// Notifications are never answered, even when the handler fails.
#[tokio::test]
async fn failing_notification_gets_no_response() {
    let failing =
        handler_fn(|_, _| async { Err::<Value, HandlerError>(HandlerError::other("nope")) });
    let (_conn, mut peer) = connect_raw(failing, &ConnectionConfig::default());

    peer.send(&json!({ "jsonrpc": "2.0", "method": "session/cancel" }))
        .await;
    peer.expect_silence(Duration::from_millis(100)).await;
}

/// A failed inbound request is answered with the handler's error under the
/// request's own id.
#[tokio::test]
async fn request_error_response_echoes_id() {
    let strict = handler_fn(|method, _| async move {
        Err::<Value, HandlerError>(ProtocolError::method_not_found().with_details(method).into())
    });
    let (_conn, mut peer) = connect_raw(strict, &ConnectionConfig::default());

    peer.send(&json!({ "jsonrpc": "2.0", "id": "abc", "method": "nope/nope" }))
        .await;

    let response = peer.recv().await;
    assert_eq!(
        response,
        json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "error": {
                "code": -32601,
                "message": "Method not found",
                "data": { "details": "nope/nope" }
            }
        })
    );
}

// ── Closing ──────────────────────────────────────────────────────────────────

/// Pending requests are rejected when the peer closes its stream.
#[tokio::test]
async fn pending_request_is_rejected_on_peer_eof() {
    let (conn, mut peer) = connect_raw(unused_handler(), &ConnectionConfig::default());

    let pending = tokio::spawn({
        let conn = conn.clone();
        async move { conn.send_request("session/prompt", json!({})).await }
    });
    let _frame = peer.recv().await;
    peer.close();

    let outcome = tokio::time::timeout(STEP_TIMEOUT, pending)
        .await
        .expect("pending request settles")
        .expect("join");
    assert!(
        matches!(outcome, Err(AppError::ConnectionClosed(_))),
        "got {outcome:?}"
    );

    tokio::time::timeout(STEP_TIMEOUT, conn.closed())
        .await
        .expect("connection reports closed");
    assert!(conn.is_closed());
}

/// After closing, new requests and notifications fail immediately.
#[tokio::test]
async fn sends_after_close_fail_with_connection_closed() {
    let (conn, mut peer) = connect_raw(unused_handler(), &ConnectionConfig::default());

    conn.shutdown().await;
    assert!(conn.is_closed());

    let request = conn.send_request("initialize", json!({})).await;
    assert!(matches!(request, Err(AppError::ConnectionClosed(_))), "got {request:?}");

    let notification = conn.send_notification("session/cancel", json!({})).await;
    assert!(
        matches!(notification, Err(AppError::ConnectionClosed(_))),
        "got {notification:?}"
    );

    peer.expect_eof().await;
}

/// Shutdown rejects requests that are still waiting for an answer.
#[tokio::test]
async fn shutdown_rejects_pending_requests() {
    let (conn, mut peer) = connect_raw(unused_handler(), &ConnectionConfig::default());

    let pending = tokio::spawn({
        let conn = conn.clone();
        async move { conn.send_request("session/prompt", json!({})).await }
    });
    let _frame = peer.recv().await;

    conn.shutdown().await;

    let outcome = tokio::time::timeout(STEP_TIMEOUT, pending)
        .await
        .expect("pending request settles")
        .expect("join");
    assert!(
        matches!(outcome, Err(AppError::ConnectionClosed(_))),
        "got {outcome:?}"
    );
}
