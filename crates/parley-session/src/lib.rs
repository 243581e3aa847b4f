//! # parley-session
//!
//! Session state, event log and compaction for Parley.
//!
//! This crate provides:
//! - [`SessionManager`] for creating and resolving sessions by
//!   `(app_name, user_id, session_id)`
//! - Scoped state (`app:`, `user:`, session-local, `temp:`)
//! - An append-only [`EventLog`] per session
//! - The [`Compactor`], which periodically folds old turns into one summary
//! - SQLite persistence through [`SqliteSessionStore`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley_session::{Compactor, SessionManager};
//! use parley_core::{CompactionConfig, Event};
//!
//! let manager = SessionManager::new();
//! let compactor = Compactor::extractive(CompactionConfig::new(3, 1)?);
//!
//! let handle = manager.create_or_get("research_app", "default", "demo").await?;
//! let mut session = handle.lock().await;
//! session.append(Event::user("turn-1", "What is a transformer?"));
//! compactor.compact_if_due(&mut session).await;
//! ```

pub mod compaction;
pub mod log;
pub mod manager;
pub mod session;
pub mod state;
pub mod store;

pub use compaction::{
    CompactionOutcome, CompactionPlan, CompactionReport, Compactor, ExtractiveSummarizer,
    ModelSummarizer, Summarizer,
};
pub use log::{EventLog, TurnSpan};
pub use manager::{SessionError, SessionHandle, SessionManager};
pub use session::{CompactionState, Session};
pub use state::StateStore;
pub use store::{SessionRecord, SessionStore, SqliteSessionStore, StoreError};
