//! # parley-agent
//!
//! Turn orchestration for Parley.
//!
//! A [`Runner`] drives one conversational turn at a time:
//! - resolves (or creates) the session through the [`SessionManager`]
//! - calls the generator under the retry policy
//! - executes requested tools against a [`ToolContext`]
//! - commits the turn's events, then checks for compaction
//!
//! [`SessionManager`]: parley_session::SessionManager
//! [`ToolContext`]: parley_tools::ToolContext

pub mod runner;

pub use runner::{
    NoOpEventHandler, Runner, RunnerBuilder, RunnerError, RunnerEventHandler, RunnerResult,
    TurnOutcome,
};
