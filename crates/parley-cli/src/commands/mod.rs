//! CLI command implementations.

pub mod chat;
pub mod config;
pub mod demo;
pub mod session;

use std::sync::Arc;

use anyhow::Context;
use parley_agent::{Runner, RunnerBuilder};
use parley_core::config::{Config, StorageBackend};
use parley_core::Scope;
use parley_mcp::{
    register_toolsets, BridgeError, CapabilityContent, CapabilityDefinition, CapabilityResult,
    CapabilityToolset, InProcessBridge,
};
use parley_providers::RuleBasedGenerator;
use parley_session::{SessionManager, SqliteSessionStore};
use parley_tools::{RetrieveUserInfoTool, SaveUserInfoTool, ToolRegistry};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::output::ConsoleEventHandler;

/// Name of the bundled in-process tool server.
pub const BUILTIN_SERVER: &str = "everything";

/// Session manager for the configured storage backend.
pub fn session_manager(config: &Config) -> anyhow::Result<Arc<SessionManager>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(SessionManager::new())),
        StorageBackend::Sqlite => {
            let path = config.storage.database_path();
            let store = SqliteSessionStore::new(&path)
                .with_context(|| format!("Failed to open session store at {}", path.display()))?;
            info!(path = %path.display(), "Using SQLite session store");
            Ok(Arc::new(SessionManager::with_store(Arc::new(store))))
        }
    }
}

/// `save_userinfo` and `retrieve_userinfo` writing to `scope`.
pub fn userinfo_tools(scope: Scope) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(SaveUserInfoTool::with_scope(scope)));
    tools.register(Arc::new(RetrieveUserInfoTool::with_scope(scope)));
    tools
}

/// In-process stand-in for the "everything" reference server.
pub fn builtin_bridge() -> Arc<InProcessBridge> {
    Arc::new(
        InProcessBridge::new(BUILTIN_SERVER)
            .with_static(
                CapabilityDefinition::new("getTinyImage")
                    .with_description("Returns a tiny MCP logo image"),
                CapabilityResult::success(vec![
                    CapabilityContent::text("This is a tiny image:"),
                    CapabilityContent::image(TINY_PNG, "image/png"),
                    CapabilityContent::text("The image above is the MCP tiny image."),
                ]),
            )
            .with_capability(
                CapabilityDefinition::new("echo")
                    .with_description("Echoes back the input")
                    .with_input_schema(json!({
                        "type": "object",
                        "properties": {"message": {"type": "string"}},
                        "required": ["message"]
                    })),
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
            .with_capability(
                CapabilityDefinition::new("add")
                    .with_description("Adds two numbers")
                    .with_input_schema(json!({
                        "type": "object",
                        "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                        "required": ["a", "b"]
                    })),
                |args| {
                    Box::pin(async move {
                        let a = args.get("a").and_then(Value::as_f64);
                        let b = args.get("b").and_then(Value::as_f64);
                        match (a, b) {
                            (Some(a), Some(b)) => Ok(CapabilityResult::success(vec![
                                CapabilityContent::text(format!("The sum of {a} and {b} is {}.", a + b)),
                            ])),
                            _ => Err(BridgeError::Invocation("a and b must be numbers".into())),
                        }
                    })
                },
            ),
    )
}

/// Register the configured tool servers that have a bridge available.
pub async fn register_tool_servers(config: &Config, tools: &mut ToolRegistry) -> usize {
    let mut toolsets = Vec::new();
    for server in &config.tool_servers {
        if server.name == BUILTIN_SERVER {
            toolsets.push(CapabilityToolset::from_config(builtin_bridge(), server));
        } else {
            warn!(server = %server.name, command = %server.command, "No bridge available for tool server, skipping");
        }
    }
    register_toolsets(&toolsets, tools).await
}

/// Runner preconfigured from `config`, using the rule-based generator.
pub fn runner_builder(config: &Config, sessions: Arc<SessionManager>) -> anyhow::Result<RunnerBuilder> {
    let generator = RuleBasedGenerator::new().context("Failed to build rule-based generator")?;
    Ok(RunnerBuilder::from_config(config)?
        .generator(Arc::new(generator))
        .sessions(sessions)
        .event_handler(Arc::new(ConsoleEventHandler)))
}

/// Run queries in order against one session, printing each exchange.
pub async fn run_queries(
    runner: &Runner,
    user_id: &str,
    session_id: &str,
    queries: &[&str],
) -> anyhow::Result<()> {
    println!("\n ### Session: {session_id}");
    for query in queries {
        println!("\nUser > {query}");
        let outcome = runner.run_turn(user_id, session_id, query).await?;
        println!("{} > {}", runner.agent_name(), outcome.response);
    }
    Ok(())
}

// 1x1 transparent PNG
const TINY_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
