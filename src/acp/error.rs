//! Protocol error taxonomy.
//!
//! [`ProtocolError`] is the `{code, message, data}` object carried in the
//! `error` member of a JSON-RPC response. Six kinds are fixed by the
//! protocol:
//!
//! | Kind             | Code     | Message                   |
//! |------------------|----------|---------------------------|
//! | `ParseError`     | `-32700` | Parse error               |
//! | `InvalidRequest` | `-32600` | Invalid request           |
//! | `MethodNotFound` | `-32601` | Method not found          |
//! | `InvalidParams`  | `-32602` | Invalid params            |
//! | `InternalError`  | `-32603` | Internal error            |
//! | `AuthRequired`   | `-32000` | Authentication required   |
//!
//! Handlers fail with a [`HandlerError`]; the connection normalises every
//! such failure into exactly one [`ProtocolError`] through
//! `From<HandlerError>` before it is written back to the peer.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::AppError;

/// Result type returned by request and notification handlers.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Closed set of protocol error kinds with fixed codes and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Frame could not be parsed as JSON.
    ParseError,
    /// Frame is JSON but not a valid message.
    InvalidRequest,
    /// The method is not part of the receiver's surface.
    MethodNotFound,
    /// Parameters failed validation.
    InvalidParams,
    /// The handler failed for any other reason.
    InternalError,
    /// The caller must authenticate first.
    AuthRequired,
}

impl ErrorKind {
    /// Every kind, in table order.
    pub const ALL: [Self; 6] = [
        Self::ParseError,
        Self::InvalidRequest,
        Self::MethodNotFound,
        Self::InvalidParams,
        Self::InternalError,
        Self::AuthRequired,
    ];

    /// Numeric wire code for this kind.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::AuthRequired => -32000,
        }
    }

    /// Default human-readable message for this kind.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::AuthRequired => "Authentication required",
        }
    }

    /// Look up the kind owning `code`, if it is one of the fixed six.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// Structured error object exchanged on the wire.
///
/// `code` and `message` are fixed at construction; only `data` may be
/// attached afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    code: i32,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl ProtocolError {
    /// Build an error with an arbitrary code and message.
    ///
    /// Used for passthrough of errors raised outside the fixed taxonomy.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Build an error of the given taxonomy kind.
    #[must_use]
    pub fn of_kind(kind: ErrorKind) -> Self {
        Self::new(kind.code(), kind.message())
    }

    /// `-32700 Parse error`.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::of_kind(ErrorKind::ParseError)
    }

    /// `-32600 Invalid request`.
    #[must_use]
    pub fn invalid_request() -> Self {
        Self::of_kind(ErrorKind::InvalidRequest)
    }

    /// `-32601 Method not found`.
    #[must_use]
    pub fn method_not_found() -> Self {
        Self::of_kind(ErrorKind::MethodNotFound)
    }

    /// `-32602 Invalid params`.
    #[must_use]
    pub fn invalid_params() -> Self {
        Self::of_kind(ErrorKind::InvalidParams)
    }

    /// `-32603 Internal error`.
    #[must_use]
    pub fn internal_error() -> Self {
        Self::of_kind(ErrorKind::InternalError)
    }

    /// `-32000 Authentication required`.
    #[must_use]
    pub fn auth_required() -> Self {
        Self::of_kind(ErrorKind::AuthRequired)
    }

    /// Fold a free-text `details` string into `data.details`.
    ///
    /// Other members already present in an object-shaped `data` are kept.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        let details = Value::String(details.into());
        match self.data {
            Some(Value::Object(ref mut map)) => {
                map.insert("details".to_owned(), details);
            }
            _ => {
                let mut map = Map::new();
                map.insert("details".to_owned(), details);
                self.data = Some(Value::Object(map));
            }
        }
        self
    }

    /// Attach an arbitrary structured `data` payload, replacing any existing one.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Numeric error code.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured payload, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// The `data.details` string, if present.
    #[must_use]
    pub fn details(&self) -> Option<&str> {
        self.data.as_ref()?.get("details")?.as_str()
    }

    /// Taxonomy kind matching this error's code, if any.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(self.code)
    }

    /// Project into the response shape `{"error": {code, message, data}}`.
    #[must_use]
    pub fn to_result(&self) -> Value {
        json!({ "error": self.to_error_object() })
    }

    /// The bare `{code, message, data}` object.
    #[must_use]
    pub fn to_error_object(&self) -> Value {
        let mut object = Map::new();
        object.insert("code".to_owned(), Value::from(self.code));
        object.insert("message".to_owned(), Value::String(self.message.clone()));
        if let Some(data) = &self.data {
            object.insert("data".to_owned(), data.clone());
        }
        Value::Object(object)
    }
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        if let Some(details) = self.details() {
            write!(f, ": {details}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

/// A single schema-validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location of the offending value; empty when unknown.
    pub path: Vec<String>,
    /// Description of the problem.
    pub message: String,
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

/// Structured collection of validation issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Issues found, in discovery order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// A validation error with a single issue.
    #[must_use]
    pub fn single(path: &[&str], message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue {
                path: path.iter().map(|segment| (*segment).to_owned()).collect(),
                message: message.into(),
            }],
        }
    }

    /// Human-readable rendering of all issues, joined by `"; "`.
    #[must_use]
    pub fn render(&self) -> String {
        if self.issues.is_empty() {
            return "validation failed".to_owned();
        }
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for ValidationError {}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            issues: vec![ValidationIssue {
                path: Vec::new(),
                message: err.to_string(),
            }],
        }
    }
}

/// Failure raised by a handler while servicing a request or notification.
#[derive(Debug)]
pub enum HandlerError {
    /// Already a protocol error; passed through unchanged.
    Protocol(ProtocolError),
    /// Parameters failed schema validation.
    Validation(ValidationError),
    /// Any other failure.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Opaque failure carrying only a message.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Other(message.into())
    }
}

impl Display for HandlerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Protocol(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<ProtocolError> for HandlerError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<ValidationError> for HandlerError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<AppError> for HandlerError {
    /// Remote protocol errors keep their shape; everything else is opaque.
    fn from(err: AppError) -> Self {
        match err {
            AppError::Rpc(protocol) => Self::Protocol(protocol),
            other => Self::Other(Box::new(other)),
        }
    }
}

impl From<HandlerError> for ProtocolError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Protocol(protocol) => protocol,
            HandlerError::Validation(validation) => {
                Self::invalid_params().with_details(validation.render())
            }
            HandlerError::Other(other) => {
                let message = other.to_string();
                let details = if message.is_empty() {
                    "unknown error".to_owned()
                } else {
                    message
                };
                Self::internal_error().with_details(details)
            }
        }
    }
}
