//! Error types for the embedded engine adapter.

use serde::{Deserialize, Serialize};

use super::codec::CodecError;

/// Adapter-level error type.
///
/// Failures local to one RPC never surface here; they are returned as
/// [`RpcError`](super::wire::RpcError) data. This type covers the whole-connection
/// failures and the boundary errors that feed into them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AdapterError {
    // Connection Errors
    /// No engine handle is present (never connected, or already disconnected)
    #[error("There is no connection available at this moment")]
    ConnectionUnavailable,

    /// Engine construction failed during connect
    #[error("An unexpected error occurred while connecting: {message}")]
    UnexpectedConnection { message: String },

    /// The endpoint string could not be parsed
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    // Boundary Errors
    /// Encoding or decoding failed at the codec boundary
    #[error("Codec error: {message}")]
    Codec { message: String },

    /// The engine collaborator reported a failure
    #[error("Engine error: {message}")]
    Engine { message: String },

    /// Adapter bookkeeping failed (e.g. the setup task panicked)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AdapterError {
    /// Normalize any failure into the error reported when connecting fails.
    ///
    /// An error that is already `UnexpectedConnection` is kept as-is.
    pub fn into_connection_error(self) -> AdapterError {
        match self {
            e @ AdapterError::UnexpectedConnection { .. } => e,
            AdapterError::Engine { message } | AdapterError::Internal { message } => {
                AdapterError::UnexpectedConnection { message }
            }
            other => AdapterError::UnexpectedConnection {
                message: other.to_string(),
            },
        }
    }
}

/// Error reported by the engine collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine could not be created for the endpoint
    #[error("{0}")]
    Construct(String),

    /// A single request failed inside the engine
    #[error("{0}")]
    Execute(String),

    /// The notification stream is unavailable or failed mid-read
    #[error("{0}")]
    Notifications(String),

    /// The handle was already released
    #[error("The engine has been released")]
    Released,
}

impl EngineError {
    /// The bare message, without any variant prefix.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

// Conversions from boundary error types
impl From<EngineError> for AdapterError {
    fn from(e: EngineError) -> Self {
        AdapterError::Engine {
            message: e.message(),
        }
    }
}

impl From<CodecError> for AdapterError {
    fn from(e: CodecError) -> Self {
        AdapterError::Codec {
            message: e.to_string(),
        }
    }
}

impl From<CodecError> for EngineError {
    fn from(e: CodecError) -> Self {
        EngineError::Execute(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AdapterError {
    fn from(e: tokio::task::JoinError) -> Self {
        AdapterError::Internal {
            message: format!("setup task failed: {e}"),
        }
    }
}
