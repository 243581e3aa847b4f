//! Error types for Parley.
//!
//! This module provides the shared error hierarchy, with structured
//! upstream-generation errors that carry enough detail for retry decisions.

use thiserror::Error;

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Parley.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream generation error with structured details
    #[error("{0}")]
    Generation(#[from] GenerationError),

    /// Session error
    #[error("Session error: {0}")]
    Session(String),

    /// Tool execution error
    #[error("Tool error: {0}")]
    Tool(String),

    /// External capability bridge error
    #[error("Capability error: {0}")]
    Capability(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check your config file at ~/.config/parley/config.toml"),
            Error::Generation(e) => e.recovery_suggestion(),
            Error::Session(_) => Some("Try starting a new session with 'parley chat --session <id>'"),
            Error::NotFound(_) => Some("Use 'parley session list' to see available sessions"),
            Error::Database(_) => Some("Check that the session database path is writable"),
            _ => None,
        }
    }
}

/// Failures of an upstream generation call (model, summarizer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Upstream answered with an error status
    #[error("Request to {provider} failed: {status} - {message}")]
    Status {
        provider: String,
        status: u16,
        message: String,
    },

    /// Connection-level failure
    #[error("Network error connecting to {provider}: {message}")]
    Network { provider: String, message: String },

    /// Upstream did not answer in time
    #[error("Request to {provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    /// Upstream answered with something unusable
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Retry policy gave up
    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    /// Create a status error.
    pub fn status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        GenerationError::Status {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// HTTP-style status code of the underlying failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GenerationError::Status { status, .. } => Some(*status),
            GenerationError::Exhausted { last, .. } => last.status_code(),
            _ => None,
        }
    }

    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            GenerationError::Status { status: 429, .. } => {
                Some("You've hit rate limits. Wait a moment and try again")
            }
            GenerationError::Status {
                status: 500..=599, ..
            } => Some("The upstream service is having issues. Try again later"),
            GenerationError::Network { .. } => Some("Check your network connection"),
            GenerationError::Timeout { .. } => Some("Try a simpler request or raise the timeout"),
            GenerationError::Exhausted { last, .. } => last.recovery_suggestion(),
            _ => None,
        }
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    let mut output = error.to_string();
    if let Some(suggestion) = error.recovery_suggestion() {
        output.push_str(&format!("\n  Suggestion: {}", suggestion));
    }
    output
}
