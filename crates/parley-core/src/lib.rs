//! # parley-core
//!
//! Core types and abstractions for Parley - conversational session state
//! and compaction for LLM agents.
//!
//! This crate provides:
//! - Event and content primitives for the session event log
//! - Scoped state keys (`app:`, `user:`, `temp:`, session-local)
//! - Session identity
//! - Tool definitions and execution types
//! - Retry policy for upstream generation calls
//! - Configuration system
//! - Common error types

pub mod config;
pub mod error;
pub mod event;
pub mod retry;
pub mod session;
pub mod state;
pub mod tool;

pub use config::{CompactionConfig, Config};
pub use error::{Error, GenerationError, Result};
pub use event::{
    Content, Event, EventActions, EventCompaction, EventError, Part, Role, SYSTEM_AUTHOR, USER_AUTHOR,
};
pub use retry::RetryPolicy;
pub use session::{SessionKey, SessionSummary};
pub use state::{Scope, StateKey, StateMap};
pub use tool::{ToolCall, ToolDefinition, ToolResult, ToolSource};
