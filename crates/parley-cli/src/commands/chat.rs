//! Interactive chat.

use std::sync::Arc;

use parley_core::{Scope, SessionKey};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use super::{register_tool_servers, runner_builder, session_manager, userinfo_tools};
use crate::output::{format_event, print_state};
use crate::AppContext;

const HELP: &str = "Commands: /state, /events, /help, /quit";

pub async fn run(ctx: &AppContext, session: Option<String>) -> anyhow::Result<()> {
    let sessions = session_manager(&ctx.config)?;
    let mut tools = userinfo_tools(Scope::User);
    register_tool_servers(&ctx.config, &mut tools).await;

    let runner = runner_builder(&ctx.config, Arc::clone(&sessions))?
        .tools(tools)
        .build()?;

    let session_id = session
        .unwrap_or_else(|| SessionKey::generate(runner.app_name(), &ctx.user_id).session_id);
    let key = SessionKey::new(runner.app_name(), &ctx.user_id, &session_id);
    println!("Session {key}");
    println!("{HELP}");

    let mut lines = BufReader::new(stdin()).lines();
    loop {
        print_prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/state" => match sessions.get_state_snapshot(&key).await {
                Ok(state) => print_state(&state),
                Err(_) => println!("  (no session yet)"),
            },
            "/events" => match sessions.get_session(&key).await {
                Ok(handle) => {
                    let session = handle.lock().await;
                    for event in session.events() {
                        println!("  {}", format_event(event));
                    }
                }
                Err(_) => println!("  (no session yet)"),
            },
            text => match runner.run_turn(&ctx.user_id, &session_id, text).await {
                Ok(outcome) => println!("{} > {}", runner.agent_name(), outcome.response),
                Err(e) => eprintln!("Error: {e}"),
            },
        }
    }
    Ok(())
}

fn print_prompt() {
    use std::io::Write;
    print!("you > ");
    // A failed flush only delays the prompt
    let _ = std::io::stdout().flush();
}
