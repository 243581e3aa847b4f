//! # parley-providers
//!
//! Generator abstraction layer for Parley.
//!
//! This crate provides:
//! - The [`Generator`] trait every model backend implements
//! - Retry with exponential backoff driven by a [`RetryPolicy`]
//! - A scripted generator for tests and a rule-based one for demos
//!
//! Model inference itself is out of scope; real backends plug in by
//! implementing [`Generator`].
//!
//! [`RetryPolicy`]: parley_core::RetryPolicy

pub mod retry;
pub mod rules;
pub mod scripted;
pub mod traits;

pub use retry::{retry_with_policy, RetryingGenerator};
pub use rules::RuleBasedGenerator;
pub use scripted::ScriptedGenerator;
pub use traits::{FinishReason, GenerateRequest, GenerateResponse, Generator, Usage};
