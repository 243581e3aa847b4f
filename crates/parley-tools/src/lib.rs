//! # parley-tools
//!
//! Tool abstraction for Parley.
//!
//! This crate provides:
//! - The [`Tool`] trait and the [`ToolRegistry`]
//! - [`ToolContext`], through which tools read and write session state
//! - The `save_userinfo` / `retrieve_userinfo` state tools
//!
//! ## Architecture
//!
//! Tools never touch a session directly. A turn hands each tool a
//! [`ToolContext`] holding a snapshot of the session state plus a pending
//! delta; writes land in the delta, and the runner commits it with the tool
//! result event when the turn completes.
//!
//! ## Example
//!
//! ```ignore
//! use parley_tools::{ToolRegistry, ToolContext, SaveUserInfoTool};
//! use std::sync::Arc;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(SaveUserInfoTool::default()));
//!
//! let mut ctx = ToolContext::new(session_key, "inv-1", snapshot);
//! let call = ToolCall::new("call_1", "save_userinfo", json!({"user_name": "Sam", "country": "Poland"}));
//! let result = registry.execute(&call, &mut ctx).await?;
//! ```

use thiserror::Error;

pub mod context;
pub mod registry;
pub mod userinfo;

pub use context::ToolContext;
pub use registry::{Tool, ToolRegistry};
pub use userinfo::{RetrieveUserInfoTool, SaveUserInfoTool};

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool was not found in the registry.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Invalid arguments provided to the tool.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Required parameter is missing.
    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    /// Parameter has wrong type.
    #[error("parameter '{0}' has wrong type: expected {1}")]
    WrongType(String, String),

    /// Operation timed out.
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic execution error.
    #[error("execution error: {0}")]
    Execution(String),
}

impl ToolError {
    /// Create an invalid arguments error.
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a missing parameter error.
    pub fn missing_param(name: impl Into<String>) -> Self {
        Self::MissingParameter(name.into())
    }

    /// Create a wrong type error.
    pub fn wrong_type(param: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::WrongType(param.into(), expected.into())
    }

    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }
}

impl From<ToolError> for parley_core::Error {
    fn from(err: ToolError) -> Self {
        parley_core::Error::Tool(err.to_string())
    }
}

/// Read a required string argument.
pub fn required_str<'a>(args: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    match args.get(name) {
        None | Some(serde_json::Value::Null) => Err(ToolError::missing_param(name)),
        Some(value) => value
            .as_str()
            .ok_or_else(|| ToolError::wrong_type(name, "string")),
    }
}
