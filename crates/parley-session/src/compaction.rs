//! Event compaction.
//!
//! Every `interval` turns the log is partitioned as
//! `[summarizable prefix][overlap window][new tail]` and the prefix,
//! including any earlier summary, is replaced by a single summary event.
//! The overlap window keeps the last `overlap` turns verbatim so the model
//! still sees recent exchanges word for word.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::{
    CompactionConfig, Content, Event, EventCompaction, Part, RetryPolicy, Role, SYSTEM_AUTHOR,
};
use parley_providers::{retry_with_policy, GenerateRequest, Generator};
use tracing::{debug, info, warn};

use crate::session::Session;

/// Produces the summary that replaces a compacted prefix.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `events`, folding in the `previous` summary if there is one.
    async fn summarize(&self, previous: Option<&Content>, events: &[Event]) -> anyhow::Result<Content>;
}

/// What a compaction would do, computed without touching the session.
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    /// Log index where the overlap window starts
    pub prefix_end: usize,
    /// Content of the summary currently heading the log
    pub previous_summary: Option<Content>,
    /// Raw events not yet summarized
    pub events: Vec<Event>,
    /// Turns inside the prefix
    pub turns_compacted: usize,
    /// Record to attach to the new summary
    pub record: EventCompaction,
}

/// Details of a successful compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub record: EventCompaction,
    /// Log length after compaction
    pub events_after: usize,
}

/// Result of a compaction check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Not enough turns since the last compaction
    NotDue,
    /// The prefix was replaced by a summary
    Compacted(CompactionReport),
    /// Due, but nothing changed; the next trigger tries again
    Skipped { reason: String },
}

impl CompactionOutcome {
    pub fn is_compacted(&self) -> bool {
        matches!(self, CompactionOutcome::Compacted(_))
    }
}

/// Applies a [`CompactionConfig`] to sessions using a [`Summarizer`].
pub struct Compactor {
    config: CompactionConfig,
    summarizer: Arc<dyn Summarizer>,
}

impl Compactor {
    pub fn new(config: CompactionConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        Self { config, summarizer }
    }

    /// Compactor using the [`ExtractiveSummarizer`].
    pub fn extractive(config: CompactionConfig) -> Self {
        Self::new(config, Arc::new(ExtractiveSummarizer::default()))
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Whether enough turns have been committed since the last compaction.
    pub fn is_due(&self, session: &Session) -> bool {
        session.compaction_state().turns_since_compaction >= self.config.interval()
    }

    /// Work out the partition for `session`, or `None` if nothing outside
    /// the overlap window is left to summarize.
    pub fn plan(&self, session: &Session) -> Option<CompactionPlan> {
        let log = session.log();
        let turns = log.turns();
        let overlap = self.config.overlap() as usize;
        if turns.len() <= overlap {
            return None;
        }

        let keep_from = turns.len() - overlap;
        let prefix_end = turns
            .get(keep_from)
            .map(|span| span.start)
            .unwrap_or_else(|| log.len());
        let prefix = &log.events()[..prefix_end];

        let watermark = session.compaction_state().last_compacted_sequence;
        let events: Vec<Event> = prefix
            .iter()
            .filter(|e| !e.is_compaction())
            .filter(|e| watermark.map_or(true, |w| e.sequence > w))
            .cloned()
            .collect();
        let (first, last) = match (events.first(), events.last()) {
            (Some(first), Some(last)) => (first.sequence, last.sequence),
            _ => return None,
        };

        let previous = prefix.iter().find(|e| e.is_compaction());
        let start_sequence = previous
            .and_then(|e| e.actions.compaction.as_ref())
            .map(|r| r.start_sequence)
            .unwrap_or(first);

        Some(CompactionPlan {
            prefix_end,
            previous_summary: previous.map(|e| e.content.clone()),
            turns_compacted: keep_from,
            record: EventCompaction {
                start_sequence,
                end_sequence: last,
                events_compacted: events.len(),
                turns_compacted: keep_from,
            },
            events,
        })
    }

    /// Compact if due. Call after a turn has been committed.
    pub async fn compact_if_due(&self, session: &mut Session) -> CompactionOutcome {
        if !self.is_due(session) {
            return CompactionOutcome::NotDue;
        }
        self.compact(session).await
    }

    /// Compact now, regardless of the turn counter.
    pub async fn compact(&self, session: &mut Session) -> CompactionOutcome {
        let Some(plan) = self.plan(session) else {
            debug!(session = %session.key(), "Nothing to compact");
            return CompactionOutcome::Skipped {
                reason: "nothing outside the overlap window".to_string(),
            };
        };

        let summary = match self
            .summarizer
            .summarize(plan.previous_summary.as_ref(), &plan.events)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    session = %session.key(),
                    error = %e,
                    "Summarization failed, compaction skipped until next trigger"
                );
                return CompactionOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let mut event = Event::compaction(summary, plan.record.clone());
        if let Some(last) = plan.events.last() {
            event.timestamp = last.timestamp;
        }

        session.log_mut().replace_prefix(plan.prefix_end, event);
        let state = session.compaction_state_mut();
        state.turns_since_compaction = 0;
        state.compaction_count += 1;
        state.last_compacted_sequence = Some(plan.record.end_sequence);

        let events_after = session.events().len();
        info!(
            session = %session.key(),
            events_compacted = plan.record.events_compacted,
            turns_compacted = plan.turns_compacted,
            events_after,
            "Compacted event log"
        );

        CompactionOutcome::Compacted(CompactionReport {
            record: plan.record,
            events_after,
        })
    }
}

/// Summarizer that stitches together truncated event texts.
///
/// Deterministic and offline; used when no model is configured.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_chars_per_event: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self {
            max_chars_per_event: 200,
        }
    }
}

impl ExtractiveSummarizer {
    pub fn new(max_chars_per_event: usize) -> Self {
        Self {
            max_chars_per_event,
        }
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, previous: Option<&Content>, events: &[Event]) -> anyhow::Result<Content> {
        let mut lines = Vec::new();
        if let Some(prev) = previous {
            lines.push(format!("Previously: {}", prev.as_text()));
        }
        for event in events {
            let line = describe_event(event);
            if line.is_empty() {
                continue;
            }
            lines.push(format!(
                "- {}: {}",
                event.author,
                truncate(&line, self.max_chars_per_event)
            ));
        }
        Ok(Content::system(lines.join("\n")))
    }
}

/// Summarizer backed by a [`Generator`], retried under a [`RetryPolicy`].
///
/// Compaction runs while the session lock is held, so every retry delay
/// stalls the next turn on that session. The default policy therefore
/// sleeps at most [`ModelSummarizer::default_policy`]'s total delay (1.5s);
/// a longer policy such as [`RetryPolicy::default`] (up to 117s) has to be
/// opted into with [`ModelSummarizer::with_policy`].
pub struct ModelSummarizer {
    generator: Arc<dyn Generator>,
    policy: RetryPolicy,
    model: String,
    instruction: String,
}

impl ModelSummarizer {
    pub fn new(generator: Arc<dyn Generator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            policy: Self::default_policy(),
            model: model.into(),
            instruction: "You are a precise summarizer. Summarize the conversation below in a \
                          few sentences: what the user asked for, what was answered, and any \
                          facts worth remembering. If a previous summary is given, merge it \
                          into the new one."
                .to_string(),
        }
    }

    /// Three attempts, 500ms then 1s apart.
    pub fn default_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(500))
            .with_exp_base(2.0)
            .with_max_delay(Duration::from_secs(2))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Prompt handed to the generator.
    pub fn build_prompt(&self, previous: Option<&Content>, events: &[Event]) -> String {
        let mut parts = Vec::new();
        if let Some(prev) = previous {
            parts.push(format!("## Previous Summary\n{}", prev.as_text()));
        }
        parts.push("## Conversation to Summarize".to_string());
        for event in events {
            parts.push(format!("**{}**: {}", event.author, describe_event(event)));
        }
        parts.join("\n\n")
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, previous: Option<&Content>, events: &[Event]) -> anyhow::Result<Content> {
        let request = GenerateRequest::new(
            self.model.clone(),
            vec![Content::user(self.build_prompt(previous, events))],
        )
        .with_instruction(self.instruction.clone());

        let generator = Arc::clone(&self.generator);
        let response = retry_with_policy(&self.policy, "summarize", || {
            let generator = Arc::clone(&generator);
            let request = request.clone();
            async move { generator.generate(request).await }
        })
        .await?;

        let text = response.content.as_text();
        if text.trim().is_empty() {
            anyhow::bail!("summarizer returned no text");
        }
        Ok(Content::new(Role::System, vec![Part::text(text)]))
    }
}

fn describe_event(event: &Event) -> String {
    if let Some(err) = &event.error {
        return format!("[failed: {}]", err.message);
    }
    let mut pieces = Vec::new();
    for part in &event.content.parts {
        match part {
            Part::Text { text } if !text.trim().is_empty() => pieces.push(text.trim().to_string()),
            Part::Text { .. } => {}
            Part::ToolCall { name, .. } => pieces.push(format!("[called {name}]")),
            Part::ToolResult { name, is_error, .. } => {
                let status = if *is_error { "failed" } else { "ok" };
                pieces.push(format!("[{name} {status}]"));
            }
        }
    }
    pieces.join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Whether `event` was written by the compactor.
pub fn is_summary_event(event: &Event) -> bool {
    event.is_compaction() && event.author == SYSTEM_AUTHOR
}
