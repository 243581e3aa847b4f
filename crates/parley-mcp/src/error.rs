//! Capability bridge error types.

use parley_tools::ToolError;
use thiserror::Error;

/// Errors that can occur while talking to a tool server.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Capability not offered by the server.
    #[error("capability not found on {server}: {name}")]
    CapabilityNotFound { server: String, name: String },

    /// The server could not be reached or answered garbage.
    #[error("server {server} unavailable: {message}")]
    Unavailable { server: String, message: String },

    /// Invocation failed on the server side.
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<BridgeError> for ToolError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(secs) => ToolError::Timeout(secs),
            BridgeError::CapabilityNotFound { name, .. } => ToolError::NotFound(name),
            BridgeError::Json(e) => ToolError::Json(e),
            other => ToolError::Execution(other.to_string()),
        }
    }
}

impl From<BridgeError> for parley_core::Error {
    fn from(err: BridgeError) -> Self {
        parley_core::Error::Capability(err.to_string())
    }
}
