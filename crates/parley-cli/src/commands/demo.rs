//! Bundled scenarios.
//!
//! Each demo drives the rule-based generator through the runner so the
//! session machinery can be watched end to end without a model.

use std::sync::Arc;

use anyhow::Context;
use parley_core::{CompactionConfig, Scope, SessionKey};
use parley_mcp::CapabilityToolset;
use parley_providers::RuleBasedGenerator;
use parley_session::{Compactor, ModelSummarizer};
use parley_tools::ToolRegistry;

use super::{builtin_bridge, run_queries, runner_builder, session_manager, userinfo_tools};
use crate::output::{format_event, print_state};
use crate::AppContext;

const COMPACTION_APP: &str = "research_app_compacting";
const COMPACTION_SESSION: &str = "compaction_demo";

/// Four turns against interval 3 / overlap 1, then look for the summary.
pub async fn compaction(ctx: &AppContext, model_summarizer: bool) -> anyhow::Result<()> {
    let compaction = CompactionConfig::new(3, 1)?;
    let compactor = if model_summarizer {
        let generator = RuleBasedGenerator::new()
            .context("Failed to build rule-based generator")?
            .with_id("rules-summarizer");
        let summarizer = ModelSummarizer::new(Arc::new(generator), &ctx.config.agent.model)
            .with_policy(ctx.config.retry.clone());
        Compactor::new(compaction, Arc::new(summarizer))
    } else {
        Compactor::extractive(compaction)
    };

    let sessions = session_manager(&ctx.config)?;
    let runner = runner_builder(&ctx.config, Arc::clone(&sessions))?
        .app_name(COMPACTION_APP)
        .compactor(compactor)
        .build()?;

    let turns = [
        "What is the latest news about AI in healthcare?",
        "Are there any new developments in drug discovery?",
        "Tell me more about the second development you found.",
        "Who are the main companies involved in that?",
    ];
    for turn in turns {
        run_queries(&runner, &ctx.user_id, COMPACTION_SESSION, &[turn]).await?;
    }

    let key = SessionKey::new(COMPACTION_APP, &ctx.user_id, COMPACTION_SESSION);
    let handle = sessions.get_session(&key).await?;
    let session = handle.lock().await;

    println!("\n--- Searching for Compaction Summary Event ---");
    match session.events().iter().find(|e| e.is_compaction()) {
        Some(summary) => {
            println!("\nFound the compaction event:");
            println!("  Author: {}", summary.author);
            if let Some(record) = &summary.actions.compaction {
                println!(
                    "  Covers sequences {}..={} ({} events, {} turns)",
                    record.start_sequence,
                    record.end_sequence,
                    record.events_compacted,
                    record.turns_compacted
                );
            }
            println!("\n  Compacted information:\n{}", summary.text());
        }
        None => {
            println!("\nNo compaction event found. Try increasing the number of turns in the demo.");
        }
    }

    println!("\n--- Final event log ---");
    for event in session.events() {
        println!("{}", format_event(event));
    }
    Ok(())
}

/// Save user info in one session, then ask for it in a fresh one.
pub async fn state(ctx: &AppContext, scope: Scope) -> anyhow::Result<()> {
    let app_name = &ctx.config.app.name;
    let sessions = session_manager(&ctx.config)?;
    let runner = runner_builder(&ctx.config, Arc::clone(&sessions))?
        .tools(userinfo_tools(scope))
        .build()?;
    println!("User info tools write to {scope} scope");

    run_queries(
        &runner,
        &ctx.user_id,
        "state-demo-session",
        &[
            "Hi there, how are you doing today? What is my name?",
            "My name is Sam. I'm from Poland.",
            "What is my name? Which country am I from?",
        ],
    )
    .await?;

    let key = SessionKey::new(app_name, &ctx.user_id, "state-demo-session");
    println!("\nSession State Contents:");
    print_state(&sessions.get_state_snapshot(&key).await?);

    run_queries(
        &runner,
        &ctx.user_id,
        "new-isolated-session",
        &["Hi there, how are you doing today? What is my name?"],
    )
    .await?;

    let key = SessionKey::new(app_name, &ctx.user_id, "new-isolated-session");
    println!("\nNew Session State:");
    print_state(&sessions.get_state_snapshot(&key).await?);
    Ok(())
}

/// Ask for an image served by a filtered capability.
pub async fn capabilities(ctx: &AppContext) -> anyhow::Result<()> {
    let mut tools = ToolRegistry::new();
    let added = CapabilityToolset::new(builtin_bridge())
        .with_tool_filter(["getTinyImage"])
        .register_into(&mut tools)
        .await?;
    println!("Registered {added} capability tool(s): {}", tools.list().join(", "));

    let sessions = session_manager(&ctx.config)?;
    let runner = runner_builder(&ctx.config, sessions)?
        .app_name("image_app")
        .agent_name("image_agent")
        .instruction("Use the MCP Tool to generate images for user queries")
        .tools(tools)
        .build()?;

    run_queries(
        &runner,
        &ctx.user_id,
        "image-demo-session",
        &["Provide a sample tiny image"],
    )
    .await
}
