//! Exposing bridge capabilities as Parley tools.
//!
//! [`CapabilityToolset`] lists a bridge's capabilities, keeps the ones named
//! in its filter, and wraps each in a [`CapabilityTool`] registered as
//! `mcp__<server>__<capability>` so it cannot collide with function tools.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parley_core::config::ToolServerConfig;
use parley_core::{ToolCall, ToolDefinition, ToolResult, ToolSource};
use parley_tools::{Tool, ToolContext, ToolError, ToolRegistry};
use serde_json::Value;
use tracing::{info, warn};

use crate::bridge::CapabilityBridge;
use crate::capability::{CapabilityDefinition, CapabilityResult};
use crate::error::BridgeError;

/// Prefix for capability tool names.
pub const MCP_TOOL_PREFIX: &str = "mcp__";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A filtered view of one bridge's capabilities.
pub struct CapabilityToolset {
    bridge: Arc<dyn CapabilityBridge>,
    tool_filter: Option<Vec<String>>,
    timeout: Duration,
}

impl CapabilityToolset {
    /// Expose every capability of `bridge`.
    pub fn new(bridge: Arc<dyn CapabilityBridge>) -> Self {
        Self {
            bridge,
            tool_filter: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Build from a configured server entry.
    pub fn from_config(bridge: Arc<dyn CapabilityBridge>, config: &ToolServerConfig) -> Self {
        let toolset = Self::new(bridge).with_timeout(Duration::from_secs(config.timeout_secs));
        if config.tool_filter.is_empty() {
            toolset
        } else {
            toolset.with_tool_filter(config.tool_filter.clone())
        }
    }

    /// Only expose capabilities with these names.
    pub fn with_tool_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server_name(&self) -> &str {
        self.bridge.server_name()
    }

    fn allows(&self, name: &str) -> bool {
        self.tool_filter
            .as_ref()
            .map_or(true, |filter| filter.iter().any(|f| f == name))
    }

    /// Wrap the allowed capabilities as tools.
    pub async fn tools(&self) -> Result<Vec<CapabilityTool>, BridgeError> {
        let capabilities = self.bridge.list_capabilities().await?;
        let tools: Vec<CapabilityTool> = capabilities
            .into_iter()
            .filter(|c| self.allows(&c.name))
            .map(|c| CapabilityTool::new(Arc::clone(&self.bridge), c, self.timeout))
            .collect();

        if let Some(filter) = &self.tool_filter {
            for wanted in filter {
                if !tools.iter().any(|t| &t.capability_name == wanted) {
                    warn!(server = %self.server_name(), capability = %wanted, "Filtered capability not offered by server");
                }
            }
        }
        Ok(tools)
    }

    /// Register the allowed capabilities. Returns how many were added.
    pub async fn register_into(&self, registry: &mut ToolRegistry) -> Result<usize, BridgeError> {
        let tools = self.tools().await?;
        let count = tools.len();
        for tool in tools {
            registry.register(Arc::new(tool));
        }
        info!(server = %self.server_name(), tools = count, "Registered capability tools");
        Ok(count)
    }
}

/// Register several toolsets, listing their servers concurrently.
///
/// A server that fails to list is skipped with a warning. Returns the total
/// number of tools registered.
pub async fn register_toolsets(toolsets: &[CapabilityToolset], registry: &mut ToolRegistry) -> usize {
    let listed = join_all(toolsets.iter().map(|t| t.tools())).await;
    let mut total = 0;
    for (toolset, tools) in toolsets.iter().zip(listed) {
        match tools {
            Ok(tools) => {
                total += tools.len();
                for tool in tools {
                    registry.register(Arc::new(tool));
                }
            }
            Err(e) => {
                warn!(server = %toolset.server_name(), error = %e, "Skipping tool server");
            }
        }
    }
    total
}

/// One bridge capability exposed as a [`Tool`].
pub struct CapabilityTool {
    full_name: String,
    capability_name: String,
    definition: CapabilityDefinition,
    bridge: Arc<dyn CapabilityBridge>,
    timeout: Duration,
}

impl CapabilityTool {
    pub fn new(bridge: Arc<dyn CapabilityBridge>, definition: CapabilityDefinition, timeout: Duration) -> Self {
        let capability_name = definition.name.clone();
        let full_name = format!(
            "{}{}__{}",
            MCP_TOOL_PREFIX,
            bridge.server_name(),
            capability_name
        );
        Self {
            full_name,
            capability_name,
            definition,
            bridge,
            timeout,
        }
    }

    pub fn server_name(&self) -> &str {
        self.bridge.server_name()
    }

    pub fn capability_name(&self) -> &str {
        &self.capability_name
    }

    /// Split `mcp__<server>__<capability>` into its parts.
    pub fn parse_tool_name(full_name: &str) -> Option<(String, String)> {
        let rest = full_name.strip_prefix(MCP_TOOL_PREFIX)?;
        let (server, tool) = rest.split_once("__")?;
        if server.is_empty() || tool.is_empty() {
            return None;
        }
        Some((server.to_string(), tool.to_string()))
    }
}

#[async_trait]
impl Tool for CapabilityTool {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn definition(&self) -> ToolDefinition {
        let description = self
            .definition
            .description
            .clone()
            .unwrap_or_else(|| format!("Capability from {}", self.server_name()));

        ToolDefinition::new(&self.full_name, description)
            .with_parameters(self.definition.input_schema.clone())
            .with_source(ToolSource::Capability(self.server_name().to_string()))
    }

    async fn execute(&self, call: &ToolCall, _ctx: &mut ToolContext) -> Result<ToolResult, ToolError> {
        let invocation = self
            .bridge
            .invoke(&self.capability_name, call.arguments.clone());

        let result = match tokio::time::timeout(self.timeout, invocation).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(tool = %self.full_name, timeout_secs = self.timeout.as_secs(), "Capability timed out");
                return Err(ToolError::Timeout(self.timeout.as_secs()));
            }
        };

        if result.is_error {
            return Ok(ToolResult::error(call, result.text()));
        }
        Ok(ToolResult::success(call, render_output(&result)?))
    }
}

fn render_output(result: &CapabilityResult) -> Result<Value, ToolError> {
    if result.is_text_only() {
        Ok(Value::String(result.text()))
    } else {
        Ok(serde_json::json!({ "content": serde_json::to_value(&result.content)? }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::InProcessBridge;
    use crate::capability::CapabilityContent;
    use parley_core::{SessionKey, StateMap};
    use serde_json::json;

    fn everything() -> Arc<dyn CapabilityBridge> {
        Arc::new(
            InProcessBridge::new("everything")
                .with_static(
                    CapabilityDefinition::new("getTinyImage").with_description("Returns a tiny image"),
                    CapabilityResult::success(vec![
                        CapabilityContent::text("This is a tiny image:"),
                        CapabilityContent::image("iVBORw0KGgo=", "image/png"),
                    ]),
                )
                .with_static(
                    CapabilityDefinition::new("add"),
                    CapabilityResult::success(vec![CapabilityContent::text("3")]),
                )
                .with_static(
                    CapabilityDefinition::new("fail"),
                    CapabilityResult::error("boom"),
                )
                .with_capability(CapabilityDefinition::new("slow"), |_| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, BridgeError>(CapabilityResult::success(vec![]))
                    })
                }),
        )
    }

    fn ctx() -> ToolContext {
        ToolContext::new(SessionKey::new("app", "u", "s"), "inv-1", StateMap::new())
    }

    #[tokio::test]
    async fn test_filter_limits_registered_tools() {
        let toolset = CapabilityToolset::new(everything()).with_tool_filter(["getTinyImage"]);
        let mut registry = ToolRegistry::new();
        let added = toolset.register_into(&mut registry).await.unwrap();

        assert_eq!(added, 1);
        assert_eq!(registry.list(), vec!["mcp__everything__getTinyImage"]);
        let def = &registry.definitions()[0];
        assert_eq!(def.source, ToolSource::Capability("everything".into()));
        assert_eq!(def.description, "Returns a tiny image");
    }

    #[tokio::test]
    async fn test_no_filter_exposes_everything() {
        let toolset = CapabilityToolset::new(everything());
        assert_eq!(toolset.tools().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_execute_mixed_and_text_output() {
        let toolset = CapabilityToolset::new(everything());
        let mut registry = ToolRegistry::new();
        toolset.register_into(&mut registry).await.unwrap();
        let mut ctx = ctx();

        let image = registry
            .execute(
                &ToolCall::new("c1", "mcp__everything__getTinyImage", json!({})),
                &mut ctx,
            )
            .await
            .unwrap();
        assert!(image.success);
        assert_eq!(image.output["content"][1]["type"], "image");

        let add = registry
            .execute(&ToolCall::new("c2", "mcp__everything__add", json!({"a": 1, "b": 2})), &mut ctx)
            .await
            .unwrap();
        assert_eq!(add.output, json!("3"));
    }

    #[tokio::test]
    async fn test_error_result_becomes_failed_tool_result() {
        let toolset = CapabilityToolset::new(everything());
        let mut registry = ToolRegistry::new();
        toolset.register_into(&mut registry).await.unwrap();

        let result = registry
            .execute(&ToolCall::new("c1", "mcp__everything__fail", json!({})), &mut ctx())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let toolset = CapabilityToolset::new(everything())
            .with_tool_filter(["slow"])
            .with_timeout(Duration::from_millis(10));
        let mut registry = ToolRegistry::new();
        toolset.register_into(&mut registry).await.unwrap();

        let err = registry
            .execute(&ToolCall::new("c1", "mcp__everything__slow", json!({})), &mut ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_from_config_applies_filter() {
        let config = ToolServerConfig {
            name: "everything".into(),
            tool_filter: vec!["add".into()],
            ..Default::default()
        };
        let toolset = CapabilityToolset::from_config(everything(), &config);
        let tools = toolset.tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].capability_name(), "add");
    }

    #[test]
    fn test_parse_tool_name() {
        assert_eq!(
            CapabilityTool::parse_tool_name("mcp__everything__getTinyImage"),
            Some(("everything".to_string(), "getTinyImage".to_string()))
        );
        assert_eq!(
            CapabilityTool::parse_tool_name("mcp__github__create__issue"),
            Some(("github".to_string(), "create__issue".to_string()))
        );
        assert_eq!(CapabilityTool::parse_tool_name("save_userinfo"), None);
        assert_eq!(CapabilityTool::parse_tool_name("mcp__only_server"), None);
    }
}
