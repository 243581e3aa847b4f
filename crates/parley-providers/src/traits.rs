//! Generator trait definitions.

use async_trait::async_trait;
use parley_core::{Content, GenerationError, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};

/// Request for a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model to use
    pub model: String,
    /// Instruction (system prompt)
    pub instruction: Option<String>,
    /// Conversation so far, oldest first
    pub contents: Vec<Content>,
    /// Available tools
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

impl GenerateRequest {
    /// Create a request with no instruction and no tools.
    pub fn new(model: impl Into<String>, contents: Vec<Content>) -> Self {
        Self {
            model: model.into(),
            instruction: None,
            contents,
            tools: vec![],
        }
    }

    /// Set the instruction.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Set the tool definitions.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Text of the most recent user content, if any.
    pub fn last_user_text(&self) -> Option<String> {
        self.contents
            .iter()
            .rev()
            .find(|c| c.role == parley_core::Role::User)
            .map(|c| c.as_text())
    }
}

/// Response from a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated content (text and/or tool calls)
    pub content: Content,
    /// Finish reason
    pub finish_reason: FinishReason,
    /// Usage statistics
    #[serde(default)]
    pub usage: Usage,
}

impl GenerateResponse {
    /// A plain text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Content::model(text),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }

    /// A response requesting tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: Content::new(
                parley_core::Role::Model,
                calls.iter().map(Into::into).collect(),
            ),
            finish_reason: FinishReason::ToolUse,
            usage: Usage::default(),
        }
    }

    /// Tool calls requested by this response.
    pub fn requested_tool_calls(&self) -> Vec<ToolCall> {
        self.content.tool_calls()
    }
}

/// Reason the generation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Normal completion
    Stop,
    /// Hit max tokens limit
    MaxTokens,
    /// Tool use requested
    ToolUse,
    /// Content was filtered
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens used
    pub input_tokens: u32,
    /// Output tokens generated
    pub output_tokens: u32,
}

/// A model backend: `generate(context) -> content`.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generator identifier, used in logs and errors.
    fn id(&self) -> &str;

    /// Produce the next content for the conversation.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GenerationError>;
}
