//! Event and content primitives.
//!
//! An [`Event`] is one immutable entry in a session's event log. Events carry
//! structured [`Content`], the turn (`invocation_id`) they belong to, any state
//! changes they commit, and, for synthetic summary events, a compaction record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::StateMap;
use crate::tool::{ToolCall, ToolResult};

/// Author tag for events written by the end user.
pub const USER_AUTHOR: &str = "user";

/// Author tag for events synthesized by the service itself (compaction).
pub const SYSTEM_AUTHOR: &str = "system";

/// Role of a piece of content in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions or summaries
    System,
    /// End-user input
    User,
    /// Model output
    Model,
    /// Tool results fed back to the model
    Tool,
}

/// A single part of a content payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text { text: String },
    /// Tool invocation requested by the model
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Result of a tool invocation
    ToolResult {
        call_id: String,
        name: String,
        response: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }
}

impl From<&ToolCall> for Part {
    fn from(call: &ToolCall) -> Self {
        Part::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }
    }
}

impl From<&ToolResult> for Part {
    fn from(result: &ToolResult) -> Self {
        let response = match &result.error {
            Some(error) => serde_json::json!({ "error": error }),
            None => result.output.clone(),
        };
        Part::ToolResult {
            call_id: result.call_id.clone(),
            name: result.name.clone(),
            response,
            is_error: !result.success,
        }
    }
}

/// Structured message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Who produced this content
    pub role: Role,
    /// Ordered parts
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Create content from a role and parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Create user text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Create model text content.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    /// Create system text content.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    /// Content with no parts.
    pub fn empty(role: Role) -> Self {
        Self::new(role, vec![])
    }

    /// Concatenated text of all text parts.
    pub fn as_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool calls requested in this content.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall {
                    id,
                    name,
                    arguments,
                } => Some(ToolCall::new(id.clone(), name.clone(), arguments.clone())),
                _ => None,
            })
            .collect()
    }

    /// Whether the content has no parts at all.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Record attached to a synthetic summary event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCompaction {
    /// Sequence of the first event folded into the summary
    pub start_sequence: u64,
    /// Sequence of the last event folded into the summary
    pub end_sequence: u64,
    /// Raw events summarized in this cycle
    pub events_compacted: usize,
    /// Turns summarized in this cycle
    pub turns_compacted: usize,
}

/// Side effects committed together with an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    /// State changes applied when the event is appended, keyed by prefixed key
    #[serde(default, skip_serializing_if = "StateMap::is_empty")]
    pub state_delta: StateMap,
    /// Present only on compaction summary events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<EventCompaction>,
}

/// Failure recorded in place of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    /// Upstream status code, if any
    pub code: Option<u16>,
    /// Human-readable message
    pub message: String,
}

/// An entry in a session's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: String,
    /// Turn this event belongs to
    pub invocation_id: String,
    /// Author tag ("user", agent name, "system")
    pub author: String,
    /// Message payload
    pub content: Content,
    /// Position in the log, assigned on append
    #[serde(default)]
    pub sequence: u64,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Committed side effects
    #[serde(default)]
    pub actions: EventActions,
    /// Set when the turn failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl Event {
    /// Create a new event. The sequence is assigned when it is appended.
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>, content: Content) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content,
            sequence: 0,
            timestamp: Utc::now(),
            actions: EventActions::default(),
            error: None,
        }
    }

    /// Create a user text event.
    pub fn user(invocation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(invocation_id, USER_AUTHOR, Content::user(text))
    }

    /// Create an event recording a failed turn.
    pub fn failure(invocation_id: impl Into<String>, author: impl Into<String>, error: EventError) -> Self {
        let mut event = Self::new(invocation_id, author, Content::empty(Role::Model));
        event.error = Some(error);
        event
    }

    /// Create a compaction summary event.
    pub fn compaction(summary: Content, record: EventCompaction) -> Self {
        let mut event = Self::new(
            format!("compaction-{}", Uuid::new_v4()),
            SYSTEM_AUTHOR,
            summary,
        );
        event.sequence = record.end_sequence;
        event.actions.compaction = Some(record);
        event
    }

    /// Attach a state delta to be applied on append.
    pub fn with_state_delta(mut self, delta: StateMap) -> Self {
        self.actions.state_delta = delta;
        self
    }

    /// Whether this is a synthetic summary event.
    pub fn is_compaction(&self) -> bool {
        self.actions.compaction.is_some()
    }

    /// Whether this event records a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text of the content.
    pub fn text(&self) -> String {
        self.content.as_text()
    }
}
