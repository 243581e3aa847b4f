//! Console rendering of events and state.

use chrono::{DateTime, Local, Utc};
use parley_agent::RunnerEventHandler;
use parley_core::{Event, Part, StateMap, ToolCall, ToolResult};
use parley_session::CompactionOutcome;

/// Format a datetime for display.
pub fn format_time(dt: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = dt.with_timezone(&Local);
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One-line rendering of an event.
pub fn format_event(event: &Event) -> String {
    if let Some(error) = &event.error {
        let code = error
            .code
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        return format!("#{} {} !! failed{}: {}", event.sequence, event.author, code, error.message);
    }

    let body: Vec<String> = event
        .content
        .parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => text.clone(),
            Part::ToolCall { name, arguments, .. } => format!("-> {name}({arguments})"),
            Part::ToolResult {
                name,
                response,
                is_error,
                ..
            } => {
                let marker = if *is_error { "x" } else { "<-" };
                format!("{marker} {name}: {response}")
            }
        })
        .collect();

    let tag = if event.is_compaction() { " [summary]" } else { "" };
    format!("#{} {}{} > {}", event.sequence, event.author, tag, body.join(" "))
}

/// Print state entries sorted by key.
pub fn print_state(state: &StateMap) {
    if state.is_empty() {
        println!("  (empty)");
        return;
    }
    for (key, value) in state {
        println!("  {key} = {value}");
    }
}

/// Prints tool activity and compactions as they happen.
pub struct ConsoleEventHandler;

impl RunnerEventHandler for ConsoleEventHandler {
    fn on_tool_start(&self, call: &ToolCall) {
        println!("  [tool] {}({})", call.name, call.arguments);
    }

    fn on_tool_complete(&self, call: &ToolCall, result: &ToolResult) {
        match &result.error {
            Some(error) => println!("  [tool] {} failed: {}", call.name, error),
            None => println!("  [tool] {} -> {}", call.name, result.output),
        }
    }

    fn on_compacted(&self, outcome: &CompactionOutcome) {
        if let CompactionOutcome::Compacted(report) = outcome {
            println!(
                "  [compaction] {} events over {} turns summarized (sequences {}..={}), log now {} events",
                report.record.events_compacted,
                report.record.turns_compacted,
                report.record.start_sequence,
                report.record.end_sequence,
                report.events_after
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{Content, EventCompaction, EventError};
    use serde_json::json;

    #[test]
    fn test_format_text_event() {
        let mut event = Event::user("inv-1", "hello");
        event.sequence = 3;
        assert_eq!(format_event(&event), "#3 user > hello");
    }

    #[test]
    fn test_format_failure_event() {
        let event = Event::failure(
            "inv-1",
            "text_chat_bot",
            EventError {
                code: Some(503),
                message: "unavailable".into(),
            },
        );
        assert_eq!(
            format_event(&event),
            "#0 text_chat_bot !! failed (503): unavailable"
        );
    }

    #[test]
    fn test_format_summary_and_tool_parts() {
        let summary = Event::compaction(
            Content::system("earlier"),
            EventCompaction {
                start_sequence: 0,
                end_sequence: 3,
                events_compacted: 4,
                turns_compacted: 2,
            },
        );
        assert_eq!(format_event(&summary), "#3 system [summary] > earlier");

        let call = ToolCall::new("c1", "retrieve_userinfo", json!({}));
        let event = Event::new(
            "inv-1",
            "bot",
            Content::new(parley_core::Role::Model, vec![Part::from(&call)]),
        );
        assert_eq!(format_event(&event), "#0 bot > -> retrieve_userinfo({})");
    }
}
