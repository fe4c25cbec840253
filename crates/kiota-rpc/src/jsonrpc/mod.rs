//! JSON-RPC 2.0 message types and line classification.
//!
//! Outgoing requests are serialised with [`JsonRpcRequest`]. Each line read
//! from the generator is classified by [`JsonRpcMessage::parse`], which
//! enforces the shape the correlation layer relies on: a `"jsonrpc": "2.0"`
//! marker, an integer (or null) id on responses, and exactly one of `result`
//! or `error`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Protocol version marker carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// Correlation id assigned by the client.
    pub id: i64,
    /// The method to invoke.
    pub method: String,
    /// Parameters, usually an object.
    pub params: Value,
}

impl JsonRpcRequest {
    /// Creates a request with a specific id.
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialises the request as a single line without the terminator.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the parameters cannot be encoded.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The payload carried by a response: exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// The call succeeded. `null` is a valid result.
    Result(Value),
    /// The call failed remotely.
    Error(JsonRpcError),
}

/// A JSON-RPC 2.0 response message.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    /// Request identifier this response corresponds to. `None` when the
    /// generator answered with a null id.
    pub id: Option<i64>,
    /// Result or error.
    pub payload: ResponsePayload,
}

/// A request initiated by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcServerRequest {
    /// Identifier chosen by the generator.
    pub id: Value,
    /// Requested method.
    pub method: String,
}

/// A notification sent by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcNotification {
    /// Notified method.
    pub method: String,
    /// Parameters, if any.
    pub params: Option<Value>,
}

/// Any message the generator may emit.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// A response to one of our requests.
    Response(JsonRpcResponse),
    /// A request the generator wants us to answer.
    ServerRequest(JsonRpcServerRequest),
    /// A one-way notification.
    Notification(JsonRpcNotification),
}

/// Reasons a line is not a usable JSON-RPC message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// The line is JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,
    /// The `jsonrpc` marker is missing or not "2.0".
    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(Option<String>),
    /// `method` is present but not a string.
    #[error("method must be a string")]
    InvalidMethod,
    /// A response id is neither an integer nor null.
    #[error("response id must be an integer or null, got {0}")]
    InvalidId(String),
    /// A response carries neither result nor error.
    #[error("response carries neither result nor error")]
    MissingPayload,
    /// A response carries both result and error.
    #[error("response carries both result and error")]
    AmbiguousPayload,
    /// The error member is not a valid error object.
    #[error("invalid error object: {0}")]
    InvalidError(String),
    /// The object has neither a method nor an id.
    #[error("message has neither method nor id")]
    Unclassifiable,
}

impl JsonRpcMessage {
    /// Parses and classifies one line of generator output.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageParseError`] describing why the line is malformed.
    pub fn parse(line: &str) -> Result<Self, MessageParseError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|error| MessageParseError::InvalidJson(error.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(MessageParseError::NotAnObject);
        };
        check_version(&object)?;

        if let Some(method) = object.remove("method") {
            let Value::String(method) = method else {
                return Err(MessageParseError::InvalidMethod);
            };
            return Ok(match object.remove("id") {
                Some(id) => Self::ServerRequest(JsonRpcServerRequest { id, method }),
                None => Self::Notification(JsonRpcNotification {
                    method,
                    params: object.remove("params"),
                }),
            });
        }

        let id = object.remove("id").ok_or(MessageParseError::Unclassifiable)?;
        let id = parse_id(&id)?;
        let payload = match (object.remove("result"), object.remove("error")) {
            (Some(result), None) => ResponsePayload::Result(result),
            (None, Some(error)) => ResponsePayload::Error(
                serde_json::from_value(error)
                    .map_err(|e| MessageParseError::InvalidError(e.to_string()))?,
            ),
            (Some(_), Some(_)) => return Err(MessageParseError::AmbiguousPayload),
            (None, None) => return Err(MessageParseError::MissingPayload),
        };
        Ok(Self::Response(JsonRpcResponse { id, payload }))
    }
}

fn check_version(object: &Map<String, Value>) -> Result<(), MessageParseError> {
    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => Ok(()),
        Some(other) => Err(MessageParseError::UnsupportedVersion(Some(other.to_string()))),
        None => Err(MessageParseError::UnsupportedVersion(None)),
    }
}

fn parse_id(id: &Value) -> Result<Option<i64>, MessageParseError> {
    match id {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| MessageParseError::InvalidId(number.to_string())),
        other => Err(MessageParseError::InvalidId(other.to_string())),
    }
}
