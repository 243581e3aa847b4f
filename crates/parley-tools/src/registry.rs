//! Tool registry for managing available tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::{ToolCall, ToolDefinition, ToolResult, ToolSource};
use tracing::debug;

use crate::context::ToolContext;
use crate::ToolError;

/// Trait for implementing tools.
///
/// Each tool has a name, a definition (including the JSON schema for its
/// parameters) and an async execute method. State reads and writes go
/// through the [`ToolContext`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of this tool.
    fn name(&self) -> &str;

    /// Get the tool definition including parameter schema.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given call and context.
    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext) -> Result<ToolResult, ToolError>;

    /// Validate the arguments before execution.
    ///
    /// Default implementation does no validation.
    fn validate(&self, _arguments: &serde_json::Value) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "Replaced registered tool");
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Definitions of tools from one source.
    pub fn definitions_from(&self, source: &ToolSource) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| t.definition())
            .filter(|d| &d.source == source)
            .collect()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call.
    pub async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        tool.validate(&call.arguments)?;

        let start = std::time::Instant::now();
        let result = tool.execute(call, ctx).await?;
        Ok(result.with_duration(start.elapsed().as_millis() as u64))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
