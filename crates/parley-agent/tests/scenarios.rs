//! End-to-end turn scenarios: compaction, scoped state, capabilities and
//! persistence, driven through the runner with scripted generators.

use std::sync::Arc;
use std::time::Duration;

use parley_agent::{Runner, RunnerError};
use parley_core::{CompactionConfig, GenerationError, RetryPolicy, Scope, SessionKey, StateKey, ToolCall};
use parley_mcp::{
    CapabilityContent, CapabilityDefinition, CapabilityResult, CapabilityToolset, InProcessBridge,
};
use parley_providers::{GenerateResponse, ScriptedGenerator};
use parley_session::{SessionManager, SqliteSessionStore};
use parley_tools::{RetrieveUserInfoTool, SaveUserInfoTool, ToolRegistry};
use serde_json::json;
use tempfile::TempDir;

fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_exp_base(2.0)
}

fn userinfo_tools(scope: Scope) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(SaveUserInfoTool::with_scope(scope)));
    tools.register(Arc::new(RetrieveUserInfoTool::with_scope(scope)));
    tools
}

fn save_reply() -> GenerateResponse {
    GenerateResponse::tool_calls(vec![ToolCall::new(
        "call-save",
        "save_userinfo",
        json!({"user_name": "Sam", "country": "Canada"}),
    )])
}

fn retrieve_reply() -> GenerateResponse {
    GenerateResponse::tool_calls(vec![ToolCall::new("call-get", "retrieve_userinfo", json!({}))])
}

fn tool_output(outcome: &parley_agent::TurnOutcome) -> serde_json::Value {
    outcome
        .events
        .iter()
        .find_map(|e| match e.content.parts.first() {
            Some(parley_core::Part::ToolResult { response, .. }) => Some(response.clone()),
            _ => None,
        })
        .unwrap_or(serde_json::Value::Null)
}

#[tokio::test]
async fn test_compaction_keeps_overlap_turn_verbatim() {
    let generator = Arc::new(ScriptedGenerator::texts(["r1", "r2", "r3", "r4"]));
    let runner = Runner::builder("compaction_app")
        .generator(generator)
        .compaction(CompactionConfig::new(3, 1).unwrap())
        .build()
        .unwrap();

    let outcomes = runner
        .run_session("u1", "s1", ["q1", "q2", "q3", "q4"])
        .await
        .unwrap();
    assert!(!outcomes[1].compaction.is_compacted());
    assert!(outcomes[2].compaction.is_compacted());
    assert!(!outcomes[3].compaction.is_compacted());

    let key = SessionKey::new("compaction_app", "u1", "s1");
    let handle = runner.sessions().get_session(&key).await.unwrap();
    let session = handle.lock().await;
    let texts: Vec<String> = session.events().iter().map(|e| e.text()).collect();

    assert!(session.events()[0].is_compaction());
    assert_eq!(&texts[1..], &["q3", "r3", "q4", "r4"]);
    let record = session.events()[0].actions.compaction.clone().unwrap();
    assert_eq!(record.turns_compacted, 2);
    assert_eq!(record.events_compacted, 4);
    assert!(texts[0].contains("q1") && texts[0].contains("r2"));
}

#[tokio::test]
async fn test_no_compaction_below_interval() {
    let generator = Arc::new(ScriptedGenerator::texts(["a", "b", "c", "d"]));
    let runner = Runner::builder("app")
        .generator(generator)
        .compaction(CompactionConfig::new(5, 1).unwrap())
        .build()
        .unwrap();

    runner
        .run_session("u1", "s1", ["1", "2", "3", "4"])
        .await
        .unwrap();

    let key = SessionKey::new("app", "u1", "s1");
    let handle = runner.sessions().get_session(&key).await.unwrap();
    let session = handle.lock().await;
    assert_eq!(session.events().len(), 8);
    assert!(session.events().iter().all(|e| !e.is_compaction()));
}

#[tokio::test]
async fn test_at_most_one_summary_over_many_turns() {
    let replies: Vec<String> = (0..20).map(|i| format!("reply {i}")).collect();
    let generator = Arc::new(ScriptedGenerator::texts(replies));
    let runner = Runner::builder("app")
        .generator(generator)
        .compaction(CompactionConfig::new(3, 1).unwrap())
        .build()
        .unwrap();
    let key = SessionKey::new("app", "u1", "s1");

    let mut compactions = 0;
    for i in 0..20 {
        let outcome = runner.run_turn("u1", "s1", &format!("query {i}")).await.unwrap();
        if outcome.compaction.is_compacted() {
            compactions += 1;
        }

        let handle = runner.sessions().get_session(&key).await.unwrap();
        let session = handle.lock().await;
        let summaries = session.events().iter().filter(|e| e.is_compaction()).count();
        assert!(summaries <= 1);
        if summaries == 1 {
            assert!(session.events()[0].is_compaction());
        }
        let sequences: Vec<u64> = session.events().iter().map(|e| e.sequence).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }
    assert_eq!(compactions, 6);

    let handle = runner.sessions().get_session(&key).await.unwrap();
    let session = handle.lock().await;
    assert_eq!(session.compaction_state().compaction_count, 6);
}

#[tokio::test]
async fn test_user_state_follows_user_into_new_session() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(save_reply()),
        Ok(GenerateResponse::text("Nice to meet you, Sam.")),
        Ok(retrieve_reply()),
        Ok(GenerateResponse::text("You are Sam from Canada.")),
        Ok(retrieve_reply()),
        Ok(GenerateResponse::text("You are Sam from Canada.")),
    ]));
    let runner = Runner::builder("state_app")
        .generator(generator)
        .tools(userinfo_tools(Scope::User))
        .build()
        .unwrap();

    runner
        .run_turn("user1", "session1", "My name is Sam, I live in Canada")
        .await
        .unwrap();

    let same = runner.run_turn("user1", "session1", "Who am I?").await.unwrap();
    assert_eq!(tool_output(&same)["user_name"], "Sam");

    let other = runner.run_turn("user1", "session2", "Who am I?").await.unwrap();
    let output = tool_output(&other);
    assert_eq!(output["status"], "success");
    assert_eq!(output["user_name"], "Sam");
    assert_eq!(output["country"], "Canada");
}

#[tokio::test]
async fn test_session_scoped_state_stays_in_its_session() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(save_reply()),
        Ok(GenerateResponse::text("Saved.")),
        Ok(retrieve_reply()),
        Ok(GenerateResponse::text("I don't know you yet.")),
    ]));
    let runner = Runner::builder("state_app")
        .generator(generator)
        .tools(userinfo_tools(Scope::Session))
        .build()
        .unwrap();

    runner
        .run_turn("user1", "session1", "My name is Sam, I live in Canada")
        .await
        .unwrap();
    let other = runner.run_turn("user1", "session2", "Who am I?").await.unwrap();

    let output = tool_output(&other);
    assert_eq!(output["user_name"], "Username not found");
    assert_eq!(output["country"], "Country not found");
}

#[tokio::test]
async fn test_state_survives_compaction() {
    let mut replies = vec![Ok(save_reply()), Ok(GenerateResponse::text("Saved."))];
    for i in 0..4 {
        replies.push(Ok(GenerateResponse::text(format!("ok {i}"))));
    }
    let generator = Arc::new(ScriptedGenerator::new(replies));
    let runner = Runner::builder("app")
        .generator(generator)
        .tools(userinfo_tools(Scope::User))
        .compaction(CompactionConfig::new(2, 0).unwrap())
        .build()
        .unwrap();

    runner
        .run_session("u1", "s1", ["I am Sam", "a", "b", "c", "d"])
        .await
        .unwrap();

    let key = SessionKey::new("app", "u1", "s1");
    let handle = runner.sessions().get_session(&key).await.unwrap();
    let session = handle.lock().await;
    assert!(session.compaction_state().compaction_count >= 1);
    // the event that carried the delta has been summarized away
    assert!(session
        .events()
        .iter()
        .all(|e| e.actions.state_delta.is_empty()));
    assert_eq!(session.lookup(&StateKey::user("name")), Some(json!("Sam")));
}

#[tokio::test]
async fn test_exhausted_retries_leave_failure_marker() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerationError::status("mock", 503, "unavailable")),
        Err(GenerationError::status("mock", 503, "unavailable")),
        Err(GenerationError::status("mock", 503, "unavailable")),
    ]));
    let runner = Runner::builder("app")
        .generator(generator.clone())
        .retry_policy(fast_policy(3))
        .build()
        .unwrap();

    let err = runner.run_turn("u1", "s1", "hello").await.unwrap_err();
    match err {
        RunnerError::Generation(GenerationError::Exhausted { attempts, .. }) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(generator.call_count(), 3);

    let key = SessionKey::new("app", "u1", "s1");
    let handle = runner.sessions().get_session(&key).await.unwrap();
    let session = handle.lock().await;
    let failure = session.events().last().unwrap();
    assert!(failure.is_error());
    assert_eq!(failure.error.as_ref().unwrap().code, Some(503));
}

#[tokio::test]
async fn test_filtered_capability_reaches_generator() {
    let bridge = Arc::new(
        InProcessBridge::new("everything")
            .with_static(
                CapabilityDefinition::new("getTinyImage"),
                CapabilityResult::success(vec![
                    CapabilityContent::text("This is a tiny image:"),
                    CapabilityContent::image("iVBORw0KGgo=", "image/png"),
                ]),
            )
            .with_static(
                CapabilityDefinition::new("echo"),
                CapabilityResult::success(vec![CapabilityContent::text("echo")]),
            ),
    );
    let mut tools = ToolRegistry::new();
    CapabilityToolset::new(bridge)
        .with_tool_filter(["getTinyImage"])
        .register_into(&mut tools)
        .await
        .unwrap();

    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(GenerateResponse::tool_calls(vec![ToolCall::new(
            "call-1",
            "mcp__everything__getTinyImage",
            json!({}),
        )])),
        Ok(GenerateResponse::text("Here is the image.")),
    ]));
    let runner = Runner::builder("mcp_app")
        .generator(generator.clone())
        .tools(tools)
        .build()
        .unwrap();

    let outcome = runner.run_turn("u1", "s1", "Show me a tiny image").await.unwrap();

    let offered: Vec<String> = generator.requests()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(offered, vec!["mcp__everything__getTinyImage"]);
    assert_eq!(tool_output(&outcome)["content"][1]["mimeType"], "image/png");
    assert_eq!(outcome.response, "Here is the image.");
}

#[tokio::test]
async fn test_sessions_resume_from_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("sessions.db");

    {
        let store = Arc::new(SqliteSessionStore::new(&db_path).unwrap());
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(save_reply()),
            Ok(GenerateResponse::text("Saved.")),
        ]));
        let runner = Runner::builder("app")
            .generator(generator)
            .tools(userinfo_tools(Scope::User))
            .sessions(Arc::new(SessionManager::with_store(store)))
            .build()
            .unwrap();
        runner.run_turn("u1", "s1", "I am Sam").await.unwrap();
    }

    let store = Arc::new(SqliteSessionStore::new(&db_path).unwrap());
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok(retrieve_reply()),
        Ok(GenerateResponse::text("You are Sam.")),
        Ok(GenerateResponse::text("Still here.")),
    ]));
    let runner = Runner::builder("app")
        .generator(generator.clone())
        .tools(userinfo_tools(Scope::User))
        .sessions(Arc::new(SessionManager::with_store(store)))
        .build()
        .unwrap();

    let fresh = runner.run_turn("u1", "s2", "Who am I?").await.unwrap();
    assert_eq!(tool_output(&fresh)["user_name"], "Sam");

    let resumed = runner.run_turn("u1", "s1", "Still there?").await.unwrap();
    // four events from the first process plus this turn's two
    assert_eq!(resumed.events[0].sequence, 4);
    assert_eq!(generator.requests()[2].contents.len(), 5);
}
