//! Session management commands.

use parley_core::config::StorageBackend;
use parley_core::{SessionKey, SessionSummary};
use parley_session::SessionError;

use super::session_manager;
use crate::output::{format_event, format_time, print_state};
use crate::{AppContext, SessionAction};

/// Format a session summary for display.
fn format_session_summary(s: &SessionSummary) -> String {
    format!(
        "{} [{}] {} events, {} compactions",
        s.key.session_id,
        format_time(&s.updated_at),
        s.event_count,
        s.compaction_count
    )
}

pub async fn handle(action: SessionAction, ctx: &AppContext) -> anyhow::Result<()> {
    if ctx.config.storage.backend == StorageBackend::Memory {
        println!("Sessions are kept in memory and end with the process.");
        println!("Set storage.backend = \"sqlite\" to keep them between runs.");
        return Ok(());
    }

    let sessions = session_manager(&ctx.config)?;
    let app_name = &ctx.config.app.name;

    match action {
        SessionAction::List { limit } => {
            let list = sessions.list_sessions(app_name, &ctx.user_id).await?;
            if list.is_empty() {
                println!("No sessions found.");
                return Ok(());
            }
            println!("Sessions for {}/{} ({}):", app_name, ctx.user_id, list.len());
            println!();
            for summary in list.iter().take(limit) {
                println!("  {}", format_session_summary(summary));
            }
        }
        SessionAction::Show { id } => {
            let key = SessionKey::new(app_name, &ctx.user_id, &id);
            let handle = match sessions.get_session(&key).await {
                Ok(handle) => handle,
                Err(SessionError::NotFound(_)) => {
                    println!("Session not found: {key}");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            let session = handle.lock().await;
            let compaction = session.compaction_state();

            println!("Session {key}");
            println!("  Created:     {}", format_time(&session.created_at()));
            println!("  Updated:     {}", format_time(&session.updated_at()));
            println!("  Events:      {}", session.events().len());
            println!("  Compactions: {}", compaction.compaction_count);
            println!(
                "  Turns since last compaction: {}",
                compaction.turns_since_compaction
            );
            println!("\nState:");
            print_state(&session.state_snapshot());
            println!("\nEvents:");
            for event in session.events() {
                println!("  {}", format_event(event));
            }
        }
        SessionAction::Delete { id } => {
            let key = SessionKey::new(app_name, &ctx.user_id, &id);
            if sessions.delete_session(&key).await? {
                println!("Deleted session {key}");
            } else {
                println!("Session not found: {key}");
            }
        }
    }

    Ok(())
}
