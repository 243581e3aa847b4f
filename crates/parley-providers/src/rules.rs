//! A deterministic, rule-based generator.
//!
//! Stands in for a model in demos: it pattern-matches the latest user text,
//! requests the tools the request offers when a rule fits, and phrases a
//! reply from tool results once they come back. It also answers summarization
//! prompts so it can back a model summarizer.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parley_core::{GenerationError, Part, Role, ToolCall};
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::traits::{GenerateRequest, GenerateResponse, Generator};

const SAVE_TOOL: &str = "save_userinfo";
const RETRIEVE_TOOL: &str = "retrieve_userinfo";
const IMAGE_TOOL_SUFFIX: &str = "__getTinyImage";

/// Rule-based stand-in for a model.
pub struct RuleBasedGenerator {
    id: String,
    name: Regex,
    country: Regex,
    recall: Regex,
    image: Regex,
    summary_line: Regex,
    calls: AtomicUsize,
}

impl RuleBasedGenerator {
    /// Compile the built-in rules.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            id: "rules".to_string(),
            name: Regex::new(r"(?i)\bmy name is ([\p{L}'-]+)")?,
            country: Regex::new(r"(?i)\b(?:i'm|i am|i live) (?:from|in) ([\p{L} ]+?)(?:[.!,?]|$)")?,
            recall: Regex::new(r"(?i)\b(?:what is my name|who am i|which country|where am i from)")?,
            image: Regex::new(r"(?i)\bimage\b")?,
            summary_line: Regex::new(r"(?m)^\*\*user\*\*: (.+)$")?,
            calls: AtomicUsize::new(0),
        })
    }

    /// Override the generator id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn next_call_id(&self) -> String {
        format!("call-{}", self.calls.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn offers(request: &GenerateRequest, name: &str) -> bool {
        request.tools.iter().any(|t| t.name == name)
    }

    /// Pick a tool call for the latest user text, if a rule fits.
    fn plan_tool_call(&self, request: &GenerateRequest, text: &str) -> Option<ToolCall> {
        if let Some(name) = self.name.captures(text).and_then(|c| c.get(1)) {
            if Self::offers(request, SAVE_TOOL) {
                let country = self
                    .country
                    .captures(text)
                    .and_then(|c| c.get(1))
                    .map_or("Unknown", |m| m.as_str().trim());
                return Some(ToolCall::new(
                    self.next_call_id(),
                    SAVE_TOOL,
                    json!({"user_name": name.as_str(), "country": country}),
                ));
            }
        }

        if self.recall.is_match(text) && Self::offers(request, RETRIEVE_TOOL) {
            return Some(ToolCall::new(self.next_call_id(), RETRIEVE_TOOL, json!({})));
        }

        if self.image.is_match(text) {
            if let Some(tool) = request.tools.iter().find(|t| t.name.ends_with(IMAGE_TOOL_SUFFIX)) {
                return Some(ToolCall::new(self.next_call_id(), tool.name.clone(), json!({})));
            }
        }
        None
    }

    fn summarize(&self, prompt: &str) -> String {
        let asked: Vec<&str> = self
            .summary_line
            .captures_iter(prompt)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
            .collect();
        let carried = prompt.contains("## Previous Summary");

        let mut summary = String::from("Summary:");
        if carried {
            summary.push_str(" continues an earlier summary;");
        }
        if asked.is_empty() {
            summary.push_str(" no user requests.");
        } else {
            summary.push_str(&format!(" the user asked: {}.", asked.join("; ")));
        }
        summary
    }

    fn conversational_reply(request: &GenerateRequest, text: &str) -> String {
        let earlier = request.contents.len().saturating_sub(1);
        let summarized = request.contents.iter().any(|c| c.role == Role::System);
        let note = if summarized {
            " (including a summary of earlier turns)"
        } else {
            ""
        };
        format!("I have {earlier} earlier messages in context{note}. You said: \"{text}\"")
    }
}

/// Phrase a reply from a tool result.
fn reply_to_tool_result(name: &str, response: &Value, is_error: bool) -> String {
    if is_error {
        let error = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return format!("The {name} tool failed: {error}");
    }
    match name {
        SAVE_TOOL => "Got it, I've saved your details.".to_string(),
        RETRIEVE_TOOL => {
            let user_name = response["user_name"].as_str().unwrap_or_default();
            let country = response["country"].as_str().unwrap_or_default();
            if user_name == "Username not found" {
                "I don't know your name yet. Tell me and I'll remember it.".to_string()
            } else {
                format!("Your name is {user_name} and you're from {country}.")
            }
        }
        _ => format!("Here is what {name} returned: {response}"),
    }
}

#[async_trait]
impl Generator for RuleBasedGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GenerationError> {
        let Some(last) = request.contents.last() else {
            return Err(GenerationError::InvalidResponse {
                provider: self.id.clone(),
                message: "request has no contents".to_string(),
            });
        };

        if last.role == Role::Tool {
            let replies: Vec<String> = last
                .parts
                .iter()
                .filter_map(|p| match p {
                    Part::ToolResult {
                        name,
                        response,
                        is_error,
                        ..
                    } => Some(reply_to_tool_result(name, response, *is_error)),
                    _ => None,
                })
                .collect();
            return Ok(GenerateResponse::text(replies.join("\n")));
        }

        let text = last.as_text();
        let summarizing = request
            .instruction
            .as_deref()
            .is_some_and(|i| i.to_lowercase().contains("summar"));
        if summarizing {
            return Ok(GenerateResponse::text(self.summarize(&text)));
        }

        if let Some(call) = self.plan_tool_call(&request, &text) {
            debug!(tool = %call.name, "Rule matched, requesting tool");
            return Ok(GenerateResponse::tool_calls(vec![call]));
        }

        Ok(GenerateResponse::text(Self::conversational_reply(&request, &text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{Content, ToolDefinition, ToolResult};

    fn generator() -> RuleBasedGenerator {
        RuleBasedGenerator::new().unwrap()
    }

    fn tools() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(SAVE_TOOL, "save"),
            ToolDefinition::new(RETRIEVE_TOOL, "retrieve"),
            ToolDefinition::new("mcp__everything__getTinyImage", "image"),
        ]
    }

    fn ask(text: &str) -> GenerateRequest {
        GenerateRequest::new("m", vec![Content::user(text)]).with_tools(tools())
    }

    #[tokio::test]
    async fn test_name_and_country_request_save() {
        let generator = generator();
        let response = generator
            .generate(ask("My name is Sam. I'm from Poland."))
            .await
            .unwrap();

        let calls = response.requested_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, SAVE_TOOL);
        assert_eq!(calls[0].arguments["user_name"], "Sam");
        assert_eq!(calls[0].arguments["country"], "Poland");
    }

    #[tokio::test]
    async fn test_question_requests_retrieve() {
        let generator = generator();
        let response = generator
            .generate(ask("What is my name? Which country am I from?"))
            .await
            .unwrap();
        assert_eq!(response.requested_tool_calls()[0].name, RETRIEVE_TOOL);
    }

    #[tokio::test]
    async fn test_image_request_uses_capability_tool() {
        let generator = generator();
        let response = generator
            .generate(ask("Provide a sample tiny image"))
            .await
            .unwrap();
        assert_eq!(
            response.requested_tool_calls()[0].name,
            "mcp__everything__getTinyImage"
        );
    }

    #[tokio::test]
    async fn test_rules_need_offered_tools() {
        let generator = generator();
        let request = GenerateRequest::new("m", vec![Content::user("My name is Sam")]);
        let response = generator.generate(request).await.unwrap();
        assert!(response.requested_tool_calls().is_empty());
        assert!(response.content.as_text().contains("My name is Sam"));
    }

    #[tokio::test]
    async fn test_replies_from_tool_result() {
        let generator = generator();
        let call = ToolCall::new("c1", RETRIEVE_TOOL, json!({}));
        let result = ToolResult::success(
            &call,
            json!({"status": "success", "user_name": "Sam", "country": "Poland"}),
        );
        let request = GenerateRequest::new(
            "m",
            vec![
                Content::user("Who am I?"),
                Content::new(Role::Model, vec![Part::from(&call)]),
                Content::new(Role::Tool, vec![Part::from(&result)]),
            ],
        );

        let response = generator.generate(request).await.unwrap();
        assert_eq!(
            response.content.as_text(),
            "Your name is Sam and you're from Poland."
        );
    }

    #[tokio::test]
    async fn test_unknown_user_reply() {
        let text = reply_to_tool_result(
            RETRIEVE_TOOL,
            &json!({"status": "success", "user_name": "Username not found", "country": "Country not found"}),
            false,
        );
        assert!(text.starts_with("I don't know your name yet"));
    }

    #[tokio::test]
    async fn test_summarization_prompt() {
        let generator = generator();
        let prompt = "## Previous Summary\nold\n\n## Conversation to Summarize\n\n**user**: first question\n\n**bot**: answer\n\n**user**: second question";
        let request = GenerateRequest::new("m", vec![Content::user(prompt)])
            .with_instruction("Summarize the conversation");

        let response = generator.generate(request).await.unwrap();
        assert_eq!(
            response.content.as_text(),
            "Summary: continues an earlier summary; the user asked: first question; second question."
        );
    }

    #[tokio::test]
    async fn test_conversational_reply_mentions_summary() {
        let generator = generator();
        let request = GenerateRequest::new(
            "m",
            vec![Content::system("Summary: ..."), Content::user("Tell me more")],
        );
        let response = generator.generate(request).await.unwrap();
        assert_eq!(
            response.content.as_text(),
            "I have 1 earlier messages in context (including a summary of earlier turns). You said: \"Tell me more\""
        );
    }

    #[tokio::test]
    async fn test_empty_request_is_invalid() {
        let generator = generator();
        let err = generator
            .generate(GenerateRequest::new("m", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse { .. }));
    }
}
