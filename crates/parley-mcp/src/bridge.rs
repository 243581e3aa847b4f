//! The capability bridge contract.
//!
//! A bridge is anything that can list capabilities and invoke one by name
//! with JSON arguments. How it reaches the server (stdio child process,
//! HTTP, or plain function calls) is the bridge's business.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::capability::{CapabilityDefinition, CapabilityResult};
use crate::error::BridgeError;

/// Connection to one external tool server.
#[async_trait]
pub trait CapabilityBridge: Send + Sync {
    /// Server name, used to namespace tool names.
    fn server_name(&self) -> &str;

    /// Capabilities the server offers.
    async fn list_capabilities(&self) -> Result<Vec<CapabilityDefinition>, BridgeError>;

    /// Invoke a capability by its server-side name.
    async fn invoke(&self, tool_name: &str, args: Value) -> Result<CapabilityResult, BridgeError>;
}

/// Async handler backing an in-process capability.
pub type CapabilityHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<CapabilityResult, BridgeError>> + Send + Sync>;

struct Registered {
    definition: CapabilityDefinition,
    handler: CapabilityHandler,
}

/// A bridge whose capabilities are Rust closures.
///
/// Stands in for an external server in demos and tests.
pub struct InProcessBridge {
    name: String,
    capabilities: BTreeMap<String, Registered>,
}

impl InProcessBridge {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: BTreeMap::new(),
        }
    }

    /// Add a capability backed by an async handler.
    pub fn with_capability<F>(mut self, definition: CapabilityDefinition, handler: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<CapabilityResult, BridgeError>> + Send + Sync + 'static,
    {
        self.capabilities.insert(
            definition.name.clone(),
            Registered {
                definition,
                handler: Arc::new(handler),
            },
        );
        self
    }

    /// Add a capability that always answers with the same result.
    pub fn with_static(self, definition: CapabilityDefinition, result: CapabilityResult) -> Self {
        self.with_capability(definition, move |_| {
            let result = result.clone();
            Box::pin(async move { Ok::<_, BridgeError>(result) })
        })
    }
}

#[async_trait]
impl CapabilityBridge for InProcessBridge {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_capabilities(&self) -> Result<Vec<CapabilityDefinition>, BridgeError> {
        Ok(self
            .capabilities
            .values()
            .map(|r| r.definition.clone())
            .collect())
    }

    async fn invoke(&self, tool_name: &str, args: Value) -> Result<CapabilityResult, BridgeError> {
        let registered = self
            .capabilities
            .get(tool_name)
            .ok_or_else(|| BridgeError::CapabilityNotFound {
                server: self.name.clone(),
                name: tool_name.to_string(),
            })?;
        debug!(server = %self.name, capability = tool_name, "Invoking in-process capability");
        (registered.handler)(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityContent;
    use serde_json::json;

    fn echo_bridge() -> InProcessBridge {
        InProcessBridge::new("everything").with_capability(
            CapabilityDefinition::new("echo").with_description("Echo the message back"),
            |args| {
                Box::pin(async move {
                    match args.get("message").and_then(Value::as_str) {
                        Some(message) => Ok(CapabilityResult::success(vec![
                            CapabilityContent::text(format!("Echo: {message}")),
                        ])),
                        None => Err(BridgeError::Invocation("message is required".into())),
                    }
                })
            },
        )
    }

    #[tokio::test]
    async fn test_list_and_invoke() {
        let bridge = echo_bridge();
        let caps = bridge.list_capabilities().await.unwrap();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].name, "echo");

        let result = bridge.invoke("echo", json!({"message": "hi"})).await.unwrap();
        assert_eq!(result.text(), "Echo: hi");
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let bridge = echo_bridge();
        let err = bridge.invoke("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::CapabilityNotFound { .. }));
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let bridge = echo_bridge();
        let err = bridge.invoke("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::Invocation(_)));
    }
}
