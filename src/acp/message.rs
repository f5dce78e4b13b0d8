//! Wire message model.
//!
//! Every inbound frame is classified exactly once into a [`Message`]
//! variant; downstream code matches on the variant and never re-inspects
//! raw JSON fields.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::acp::error::ProtocolError;

/// JSON-RPC protocol version stamped on every outbound frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation identifier of a request and its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id; outbound requests always use this form.
    Number(i64),
    /// String id, accepted from peers that prefer them.
    String(String),
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// A classified wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Expects exactly one [`Message::Response`] with the same `id`.
    Request {
        /// Correlation id.
        id: RequestId,
        /// Method name.
        method: String,
        /// Opaque parameters; `Null` when absent.
        params: Value,
    },
    /// Reply to an earlier request.
    Response {
        /// Id of the request being answered.
        id: RequestId,
        /// `Ok(result)` or `Err(error)`.
        result: std::result::Result<Value, ProtocolError>,
    },
    /// Fire-and-forget message; never answered.
    Notification {
        /// Method name.
        method: String,
        /// Opaque parameters; `Null` when absent.
        params: Value,
    },
}

impl Message {
    /// Parse one frame of text into a message.
    ///
    /// # Errors
    ///
    /// - `ParseError` when `line` is not valid JSON.
    /// - `InvalidRequest` when the JSON does not have a message shape.
    pub fn parse(line: &str) -> std::result::Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| ProtocolError::parse_error().with_details(e.to_string()))?;
        Self::from_value(value)
    }

    /// Classify a JSON value as a request, notification or response.
    ///
    /// Unrecognised members are ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` with a description of the defect.
    pub fn from_value(value: Value) -> std::result::Result<Self, ProtocolError> {
        let Value::Object(mut object) = value else {
            return Err(invalid("message must be a JSON object"));
        };

        let id = match object.remove("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(parse_id(raw)?),
        };

        if let Some(method) = object.remove("method") {
            let Value::String(method) = method else {
                return Err(invalid("`method` must be a string"));
            };
            let params = object.remove("params").unwrap_or(Value::Null);
            return Ok(match id {
                Some(id) => Self::Request { id, method, params },
                None => Self::Notification { method, params },
            });
        }

        let Some(id) = id else {
            return Err(invalid("message has neither `method` nor `id`"));
        };

        if let Some(error) = object.remove("error") {
            let error: ProtocolError = serde_json::from_value(error)
                .map_err(|e| invalid(&format!("malformed `error` object: {e}")))?;
            return Ok(Self::Response {
                id,
                result: Err(error),
            });
        }

        match object.remove("result") {
            Some(result) => Ok(Self::Response {
                id,
                result: Ok(result),
            }),
            None => Err(invalid("response has neither `result` nor `error`")),
        }
    }

    /// Serialise into the outbound JSON frame shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            "jsonrpc".to_owned(),
            Value::String(JSONRPC_VERSION.to_owned()),
        );
        match self {
            Self::Request { id, method, params } => {
                object.insert("id".to_owned(), id_value(id));
                object.insert("method".to_owned(), Value::String(method.clone()));
                if !params.is_null() {
                    object.insert("params".to_owned(), params.clone());
                }
            }
            Self::Response { id, result } => {
                object.insert("id".to_owned(), id_value(id));
                match result {
                    Ok(result) => {
                        object.insert("result".to_owned(), result.clone());
                    }
                    Err(error) => {
                        object.insert("error".to_owned(), error.to_error_object());
                    }
                }
            }
            Self::Notification { method, params } => {
                object.insert("method".to_owned(), Value::String(method.clone()));
                if !params.is_null() {
                    object.insert("params".to_owned(), params.clone());
                }
            }
        }
        Value::Object(object)
    }

    /// Method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Response { .. } => None,
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn invalid(details: &str) -> ProtocolError {
    ProtocolError::invalid_request().with_details(details)
}

fn parse_id(raw: Value) -> std::result::Result<RequestId, ProtocolError> {
    match raw {
        Value::String(s) => Ok(RequestId::String(s)),
        Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| invalid("`id` must be an integer or a string")),
        _ => Err(invalid("`id` must be an integer or a string")),
    }
}

fn id_value(id: &RequestId) -> Value {
    match id {
        RequestId::Number(n) => Value::from(*n),
        RequestId::String(s) => Value::String(s.clone()),
    }
}
