//! Unit tests for the protocol error taxonomy and handler-failure
//! normalisation.

use serde_json::json;

use acp_link::acp::error::{
    ErrorKind, HandlerError, ProtocolError, ValidationError, ValidationIssue,
};
use acp_link::AppError;

// ── Fixed taxonomy ───────────────────────────────────────────────────────────

/// Every named constructor produces its fixed code and message.
#[test]
fn named_constructors_use_fixed_codes_and_messages() {
    let cases = [
        (ProtocolError::parse_error(), -32700, "Parse error"),
        (ProtocolError::invalid_request(), -32600, "Invalid request"),
        (ProtocolError::method_not_found(), -32601, "Method not found"),
        (ProtocolError::invalid_params(), -32602, "Invalid params"),
        (ProtocolError::internal_error(), -32603, "Internal error"),
        (ProtocolError::auth_required(), -32000, "Authentication required"),
    ];

    for (err, code, message) in cases {
        assert_eq!(err.code(), code, "code of {message}");
        assert_eq!(err.message(), message);
        assert!(err.data().is_none(), "{message} must start without data");
    }
}

/// Every kind round-trips through its code.
#[test]
fn kinds_are_recoverable_from_codes() {
    for kind in ErrorKind::ALL {
        assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        assert_eq!(ProtocolError::of_kind(kind).kind(), Some(kind));
    }
    assert_eq!(ErrorKind::from_code(123), None);
}

// ── Details and projection ───────────────────────────────────────────────────

/// An arbitrary code with details projects into the `{"error": …}` shape.
#[test]
fn to_result_projects_code_message_and_details() {
    let err = ProtocolError::new(123, "message").with_details("details");

    assert_eq!(
        err.to_result(),
        json!({
            "error": {
                "code": 123,
                "message": "message",
                "data": { "details": "details" }
            }
        })
    );
    assert_eq!(err.kind(), None, "123 is outside the fixed taxonomy");
}

/// Without data the `data` member is omitted entirely.
#[test]
fn to_result_omits_absent_data() {
    let err = ProtocolError::method_not_found();
    assert_eq!(
        err.to_result(),
        json!({ "error": { "code": -32601, "message": "Method not found" } })
    );
}

/// A second `with_details` call replaces the first.
#[test]
fn with_details_replaces_previous_details() {
    let err = ProtocolError::internal_error()
        .with_details("first")
        .with_details("second");
    assert_eq!(err.details(), Some("second"));
}

/// `Display` renders message, code, and details.
#[test]
fn display_includes_details_when_present() {
    let err = ProtocolError::invalid_params().with_details("missing sessionId");
    assert_eq!(err.to_string(), "Invalid params (-32602): missing sessionId");
    assert_eq!(
        ProtocolError::parse_error().to_string(),
        "Parse error (-32700)"
    );
}

/// The wire object deserialises back into the same error.
#[test]
fn error_object_deserialises() {
    let raw = json!({ "code": -32000, "message": "Authentication required" });
    let err: ProtocolError = serde_json::from_value(raw).expect("valid error object");
    assert_eq!(err, ProtocolError::auth_required());
}

// ── Normalisation ────────────────────────────────────────────────────────────

/// Protocol errors pass through normalisation unchanged.
#[test]
fn protocol_failure_passes_through() {
    let original = ProtocolError::internal_error().with_details("Custom internal error");
    let normalised = ProtocolError::from(HandlerError::from(original.clone()));
    assert_eq!(normalised, original);
}

/// Validation failures become `Invalid params` with the rendered issues.
#[test]
fn validation_failure_becomes_invalid_params() {
    let validation = ValidationError {
        issues: vec![
            ValidationIssue {
                path: vec!["sessionId".to_owned()],
                message: "required".to_owned(),
            },
            ValidationIssue {
                path: Vec::new(),
                message: "unexpected shape".to_owned(),
            },
        ],
    };

    let normalised = ProtocolError::from(HandlerError::from(validation));
    assert_eq!(normalised.code(), -32602);
    assert_eq!(
        normalised.details(),
        Some("sessionId: required; unexpected shape")
    );
}

/// Any other failure becomes `Internal error` carrying its message.
#[test]
fn other_failure_becomes_internal_error() {
    let normalised = ProtocolError::from(HandlerError::other("generic error"));
    assert_eq!(normalised.code(), -32603);
    assert_eq!(normalised.details(), Some("generic error"));
}

/// A failure without a message is reported as `unknown error`.
#[test]
fn empty_failure_message_is_reported_as_unknown() {
    let normalised = ProtocolError::from(HandlerError::other(""));
    assert_eq!(normalised.details(), Some("unknown error"));
}

/// I/O failures are opaque internal errors.
#[test]
fn io_failure_becomes_internal_error() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let normalised = ProtocolError::from(HandlerError::from(io));
    assert_eq!(normalised.code(), -32603);
    assert_eq!(normalised.details(), Some("no such file"));
}

/// A remote error surfacing as `AppError::Rpc` keeps its shape when
/// re-raised from a handler; other application errors do not.
#[test]
fn app_error_conversion_preserves_remote_errors_only() {
    let remote = ProtocolError::auth_required();
    let passthrough = ProtocolError::from(HandlerError::from(AppError::Rpc(remote.clone())));
    assert_eq!(passthrough, remote);

    let closed = ProtocolError::from(HandlerError::from(AppError::ConnectionClosed(
        "peer went away".into(),
    )));
    assert_eq!(closed.code(), -32603);
    assert_eq!(
        closed.details(),
        Some("connection closed: peer went away")
    );
}

/// A single-issue validation error renders its dotted path.
#[test]
fn single_issue_renders_path() {
    let err = ValidationError::single(&["prompt", "0", "type"], "unknown variant");
    assert_eq!(err.render(), "prompt.0.type: unknown variant");
}

/// An empty validation error still renders a useful message.
#[test]
fn empty_validation_error_renders_fallback() {
    let err = ValidationError { issues: Vec::new() };
    assert_eq!(err.render(), "validation failed");
}
