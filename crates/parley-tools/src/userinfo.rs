//! Tools that remember who the user is.
//!
//! `save_userinfo` records a name and a country; `retrieve_userinfo` reads
//! them back. Both default to `user:` scope so the values follow the user
//! into new sessions. Constructing them with [`Scope::Session`] keeps the
//! values inside the session that saved them.

use async_trait::async_trait;
use parley_core::{Scope, StateKey, ToolCall, ToolDefinition, ToolResult};
use serde_json::json;
use tracing::debug;

use crate::context::ToolContext;
use crate::registry::Tool;
use crate::{required_str, ToolError};

/// Fallback when no name has been saved.
pub const USERNAME_NOT_FOUND: &str = "Username not found";
/// Fallback when no country has been saved.
pub const COUNTRY_NOT_FOUND: &str = "Country not found";

fn name_key(scope: Scope) -> StateKey {
    StateKey::new(scope, "name")
}

fn country_key(scope: Scope) -> StateKey {
    StateKey::new(scope, "country")
}

/// Records the user's name and country in state.
#[derive(Debug, Clone)]
pub struct SaveUserInfoTool {
    scope: Scope,
}

impl Default for SaveUserInfoTool {
    fn default() -> Self {
        Self { scope: Scope::User }
    }
}

impl SaveUserInfoTool {
    pub fn with_scope(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Tool for SaveUserInfoTool {
    fn name(&self) -> &str {
        "save_userinfo"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name(),
            "Record and save the user's name and country in session state.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "user_name": {
                    "type": "string",
                    "description": "The username to store"
                },
                "country": {
                    "type": "string",
                    "description": "The name of the user's country"
                }
            },
            "required": ["user_name", "country"]
        }))
    }

    fn validate(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        required_str(arguments, "user_name")?;
        required_str(arguments, "country")?;
        Ok(())
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext) -> Result<ToolResult, ToolError> {
        let user_name = required_str(&call.arguments, "user_name")?;
        let country = required_str(&call.arguments, "country")?;

        ctx.set(&name_key(self.scope), user_name);
        ctx.set(&country_key(self.scope), country);
        debug!(session = %ctx.session_key(), scope = %self.scope, "Saved user info");

        Ok(ToolResult::success(call, json!({ "status": "success" })))
    }
}

/// Reads the user's name and country from state.
#[derive(Debug, Clone)]
pub struct RetrieveUserInfoTool {
    scope: Scope,
}

impl Default for RetrieveUserInfoTool {
    fn default() -> Self {
        Self { scope: Scope::User }
    }
}

impl RetrieveUserInfoTool {
    pub fn with_scope(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Tool for RetrieveUserInfoTool {
    fn name(&self) -> &str {
        "retrieve_userinfo"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name(),
            "Retrieve the user's name and country from session state.",
        )
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext) -> Result<ToolResult, ToolError> {
        let user_name = ctx.get_or(&name_key(self.scope), USERNAME_NOT_FOUND);
        let country = ctx.get_or(&country_key(self.scope), COUNTRY_NOT_FOUND);

        Ok(ToolResult::success(
            call,
            json!({
                "status": "success",
                "user_name": user_name,
                "country": country,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolRegistry;
    use parley_core::{SessionKey, StateMap};
    use std::sync::Arc;

    fn registry(scope: Scope) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SaveUserInfoTool::with_scope(scope)));
        registry.register(Arc::new(RetrieveUserInfoTool::with_scope(scope)));
        registry
    }

    fn ctx(snapshot: StateMap) -> ToolContext {
        ToolContext::new(SessionKey::new("default", "default", "s"), "inv-1", snapshot)
    }

    #[tokio::test]
    async fn test_save_writes_user_scoped_keys() {
        let registry = registry(Scope::User);
        let mut ctx = ctx(StateMap::new());
        let call = ToolCall::new(
            "c1",
            "save_userinfo",
            json!({"user_name": "Sam", "country": "Poland"}),
        );

        let result = registry.execute(&call, &mut ctx).await.unwrap();
        assert_eq!(result.output, json!({"status": "success"}));

        let delta = ctx.take_delta();
        assert_eq!(delta.get("user:name"), Some(&json!("Sam")));
        assert_eq!(delta.get("user:country"), Some(&json!("Poland")));
    }

    #[tokio::test]
    async fn test_retrieve_reads_snapshot() {
        let registry = registry(Scope::User);
        let mut snapshot = StateMap::new();
        snapshot.insert("user:name".into(), json!("Sam"));
        snapshot.insert("user:country".into(), json!("Poland"));
        let mut ctx = ctx(snapshot);

        let call = ToolCall::new("c1", "retrieve_userinfo", json!({}));
        let result = registry.execute(&call, &mut ctx).await.unwrap();
        assert_eq!(
            result.output,
            json!({"status": "success", "user_name": "Sam", "country": "Poland"})
        );
    }

    #[tokio::test]
    async fn test_retrieve_defaults_when_missing() {
        let registry = registry(Scope::Session);
        let mut snapshot = StateMap::new();
        snapshot.insert("user:name".into(), json!("Sam"));
        let mut ctx = ctx(snapshot);

        let call = ToolCall::new("c1", "retrieve_userinfo", json!({}));
        let result = registry.execute(&call, &mut ctx).await.unwrap();
        assert_eq!(result.output["user_name"], json!(USERNAME_NOT_FOUND));
        assert_eq!(result.output["country"], json!(COUNTRY_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_session_scope_writes_unprefixed_keys() {
        let registry = registry(Scope::Session);
        let mut ctx = ctx(StateMap::new());
        let call = ToolCall::new(
            "c1",
            "save_userinfo",
            json!({"user_name": "Sam", "country": "Poland"}),
        );
        registry.execute(&call, &mut ctx).await.unwrap();
        assert_eq!(ctx.pending().get("name"), Some(&json!("Sam")));
        assert!(ctx.pending().get("user:name").is_none());
    }

    #[tokio::test]
    async fn test_save_requires_both_fields() {
        let registry = registry(Scope::User);
        let mut ctx = ctx(StateMap::new());
        let call = ToolCall::new("c1", "save_userinfo", json!({"user_name": "Sam"}));
        assert!(matches!(
            registry.execute(&call, &mut ctx).await,
            Err(ToolError::MissingParameter(_))
        ));
    }
}
