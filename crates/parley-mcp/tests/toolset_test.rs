//! Integration tests for bridging several tool servers into one registry.

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::{SessionKey, StateMap, ToolCall, ToolSource};
use parley_mcp::{
    register_toolsets, BridgeError, CapabilityBridge, CapabilityContent, CapabilityDefinition,
    CapabilityResult, CapabilityToolset, InProcessBridge,
};
use parley_tools::{SaveUserInfoTool, ToolContext, ToolRegistry};
use serde_json::{json, Value};

/// A server that never comes up.
struct DownBridge;

#[async_trait]
impl CapabilityBridge for DownBridge {
    fn server_name(&self) -> &str {
        "kaggle"
    }

    async fn list_capabilities(&self) -> Result<Vec<CapabilityDefinition>, BridgeError> {
        Err(BridgeError::Unavailable {
            server: "kaggle".into(),
            message: "connection refused".into(),
        })
    }

    async fn invoke(&self, _tool_name: &str, _args: Value) -> Result<CapabilityResult, BridgeError> {
        Err(BridgeError::Unavailable {
            server: "kaggle".into(),
            message: "connection refused".into(),
        })
    }
}

fn everything() -> Arc<InProcessBridge> {
    Arc::new(
        InProcessBridge::new("everything")
            .with_static(
                CapabilityDefinition::new("getTinyImage"),
                CapabilityResult::success(vec![CapabilityContent::image("AA==", "image/png")]),
            )
            .with_static(
                CapabilityDefinition::new("printEnv"),
                CapabilityResult::success(vec![CapabilityContent::text("{}")]),
            ),
    )
}

#[tokio::test]
async fn test_unavailable_server_is_skipped() {
    let toolsets = vec![
        CapabilityToolset::new(everything()).with_tool_filter(["getTinyImage"]),
        CapabilityToolset::new(Arc::new(DownBridge)),
    ];
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SaveUserInfoTool::default()));

    let added = register_toolsets(&toolsets, &mut registry).await;

    assert_eq!(added, 1);
    assert_eq!(
        registry.list(),
        vec!["mcp__everything__getTinyImage", "save_userinfo"]
    );
    assert_eq!(
        registry
            .definitions_from(&ToolSource::Capability("everything".into()))
            .len(),
        1
    );
    assert_eq!(registry.definitions_from(&ToolSource::Function).len(), 1);
}

#[tokio::test]
async fn test_capability_tools_leave_state_alone() {
    let mut registry = ToolRegistry::new();
    CapabilityToolset::new(everything())
        .register_into(&mut registry)
        .await
        .unwrap();
    let mut ctx = ToolContext::new(SessionKey::new("app", "u1", "s1"), "inv-1", StateMap::new());

    let result = registry
        .execute(
            &ToolCall::new("c1", "mcp__everything__printEnv", json!({})),
            &mut ctx,
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output, json!("{}"));
    assert!(ctx.take_delta().is_empty());
}
