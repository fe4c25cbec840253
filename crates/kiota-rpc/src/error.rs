//! Error types for the transport and the JSON-RPC client.
//!
//! I/O errors are wrapped in `Arc` so errors stay `Clone`: a single closure
//! is reported to every call that was pending when it happened.

use std::io;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::jsonrpc::JsonRpcError;

/// Failures of the process-backed transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The executable could not be found.
    #[error("generator executable not found: {command}")]
    ExecutableNotFound {
        /// The command that was not found.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The process could not be started.
    #[error("failed to launch generator process '{command}': {message}")]
    ProcessLaunch {
        /// The command that failed to start.
        command: String,
        /// Description of the launch failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Writing to the process input failed.
    #[error("failed to write to generator process: {source}")]
    Write {
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The process output ended or the transport was closed.
    #[error("transport closed: {reason}")]
    Closed {
        /// Why the transport closed.
        reason: String,
    },

    /// An operation needed a running process but none was started.
    #[error("transport has not been started")]
    NotStarted,
}

impl TransportError {
    /// Builds a [`TransportError::Closed`] with the given reason.
    #[must_use]
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }

    /// Wraps a write failure.
    #[must_use]
    pub fn write(source: io::Error) -> Self {
        Self::Write {
            source: Arc::new(source),
        }
    }

    /// Returns `true` for launch failures of either flavour.
    #[must_use]
    pub const fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::ExecutableNotFound { .. } | Self::ProcessLaunch { .. }
        )
    }
}

/// Failures surfaced to callers of the RPC client.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The generator answered with a JSON-RPC error object.
    #[error("generator returned error {code}: {message}")]
    Remote {
        /// The JSON-RPC error code.
        code: i64,
        /// The error message.
        message: String,
        /// Additional error data, if any.
        data: Option<Value>,
    },

    /// No response arrived before the configured deadline.
    #[error("request {id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Correlation id of the request.
        id: i64,
        /// The configured deadline in milliseconds.
        timeout_ms: u64,
    },

    /// A request builder or handle was misused.
    #[error("invalid request state: {message}")]
    InvalidRequestState {
        /// Description of the misuse.
        message: String,
    },

    /// Parameters could not be encoded or a result could not be decoded.
    #[error("JSON codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// The call was cancelled before it completed.
    #[error("request {id} was cancelled")]
    Cancelled {
        /// Correlation id of the request.
        id: i64,
    },
}

impl RpcError {
    /// Creates a remote error from a JSON-RPC error object.
    #[must_use]
    pub fn from_jsonrpc(error: JsonRpcError) -> Self {
        Self::Remote {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }

    /// Builds an [`RpcError::InvalidRequestState`].
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidRequestState {
            message: message.into(),
        }
    }

    /// Returns `true` when the call failed because the transport closed.
    #[must_use]
    pub const fn is_transport_closed(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Closed { .. }))
    }

    /// Returns the remote error code, if this is a remote error.
    #[must_use]
    pub const fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec {
            message: error.to_string(),
        }
    }
}

impl From<kiota_serialization::SerializationError> for RpcError {
    fn from(error: kiota_serialization::SerializationError) -> Self {
        Self::Codec {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn remote_error_keeps_code_message_and_data() {
        let error = RpcError::from_jsonrpc(JsonRpcError {
            code: -32601,
            message: String::from("Method not found"),
            data: Some(json!({"method": "Generate"})),
        });

        assert_eq!(error.remote_code(), Some(-32601));
        assert_eq!(
            error.to_string(),
            "generator returned error -32601: Method not found"
        );
        assert!(matches!(error, RpcError::Remote { data: Some(_), .. }));
    }

    #[rstest]
    fn closed_transport_is_detected() {
        let error = RpcError::from(TransportError::closed("process exited"));

        assert!(error.is_transport_closed());
        assert_eq!(error.to_string(), "transport closed: process exited");
        assert_eq!(error.remote_code(), None);
    }

    #[rstest]
    fn launch_failures_are_classified() {
        let missing = TransportError::ExecutableNotFound {
            command: String::from("kiota"),
            source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
        };

        assert!(missing.is_launch_failure());
        assert!(!TransportError::NotStarted.is_launch_failure());
    }
}
