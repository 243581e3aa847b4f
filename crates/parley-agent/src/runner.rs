//! Turn runner.
//!
//! The [`Runner`] is the orchestration layer that connects:
//! - a [`Generator`] (called under a [`RetryPolicy`])
//! - the [`ToolRegistry`] (tools read and write state through a [`ToolContext`])
//! - the [`SessionManager`] (event log, scoped state, persistence)
//! - an optional [`Compactor`]
//!
//! ## Turn lifecycle
//!
//! ```text
//! run_turn(user, session, text)
//! ├── create_or_get session, lock it
//! ├── loop: generate -> execute tool calls -> feed results back
//! ├── commit buffered events (state deltas apply on append)
//! ├── clear temp: state
//! ├── compact if due
//! └── persist
//! ```
//!
//! Events of a turn are buffered and committed only once the turn has an
//! outcome. A failed generation commits the user event and an error event;
//! tool state deltas from that turn are dropped.

use std::sync::Arc;

use parley_core::config::Config;
use parley_core::{
    CompactionConfig, Content, Event, EventError, GenerationError, Part, RetryPolicy, Role,
    ToolCall, ToolDefinition, ToolResult,
};
use parley_providers::{retry_with_policy, GenerateRequest, Generator};
use parley_session::{CompactionOutcome, Compactor, Session, SessionError, SessionManager};
use parley_tools::{ToolContext, ToolRegistry};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while running a turn.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Generation failed, after retries where the policy allowed them.
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Session lookup or persistence failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The generator kept requesting tools past the step budget.
    #[error("Maximum steps exceeded: {0}")]
    MaxStepsExceeded(usize),

    /// Runner not properly configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<RunnerError> for parley_core::Error {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Generation(e) => parley_core::Error::Generation(e),
            RunnerError::Session(e) => e.into(),
            RunnerError::NotConfigured(msg) => parley_core::Error::Config(msg),
            other => parley_core::Error::Internal(other.to_string()),
        }
    }
}

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

// ============================================================================
// Outcome
// ============================================================================

/// What a completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Invocation id shared by every event of the turn
    pub invocation_id: String,
    /// Final text from the agent
    pub response: String,
    /// Events committed to the log, in order, with sequences assigned
    pub events: Vec<Event>,
    /// Compaction check performed after the commit
    pub compaction: CompactionOutcome,
}

// ============================================================================
// Event Handler
// ============================================================================

/// Callbacks during a turn.
///
/// Implement this to surface progress in a UI. Every method has a no-op
/// default.
pub trait RunnerEventHandler: Send + Sync {
    /// Called before each generate call.
    fn on_thinking(&self) {}

    /// Called when a tool execution starts.
    fn on_tool_start(&self, _call: &ToolCall) {}

    /// Called when a tool execution completes.
    fn on_tool_complete(&self, _call: &ToolCall, _result: &ToolResult) {}

    /// Called after a turn's events are committed.
    fn on_commit(&self, _events: &[Event]) {}

    /// Called when a compaction replaced part of the log.
    fn on_compacted(&self, _outcome: &CompactionOutcome) {}
}

/// Event handler that does nothing.
pub struct NoOpEventHandler;

impl RunnerEventHandler for NoOpEventHandler {}

// ============================================================================
// Runner
// ============================================================================

/// Drives conversational turns against sessions of one app.
pub struct Runner {
    app_name: String,
    agent_name: String,
    model: String,
    instruction: Option<String>,
    generator: Arc<dyn Generator>,
    retry_policy: RetryPolicy,
    tools: Arc<ToolRegistry>,
    compactor: Option<Compactor>,
    sessions: Arc<SessionManager>,
    max_steps: usize,
    event_handler: Arc<dyn RunnerEventHandler>,
}

impl Runner {
    /// Start building a runner for `app_name`.
    pub fn builder(app_name: impl Into<String>) -> RunnerBuilder {
        RunnerBuilder::new(app_name)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn compactor(&self) -> Option<&Compactor> {
        self.compactor.as_ref()
    }

    /// Run one turn of user input against a session, creating it on first use.
    pub async fn run_turn(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
    ) -> RunnerResult<TurnOutcome> {
        let handle = self
            .sessions
            .create_or_get(&self.app_name, user_id, session_id)
            .await?;
        let mut session = handle.lock().await;

        let invocation_id = Uuid::new_v4().to_string();
        info!(session = %handle.key(), invocation = %invocation_id, "Starting turn");

        let mut turn = vec![Event::user(&invocation_id, text)];
        let mut ctx = ToolContext::new(
            session.key().clone(),
            &invocation_id,
            session.state_snapshot(),
        );

        let result = self.drive(&session, &mut turn, &mut ctx).await;

        let (committed, result) = match result {
            Ok(response) => (self.commit(&mut session, turn), Ok(response)),
            Err(err) => {
                warn!(session = %handle.key(), invocation = %invocation_id, error = %err, "Turn failed");
                turn.truncate(1);
                turn.push(Event::failure(
                    &invocation_id,
                    &self.agent_name,
                    failure_of(&err),
                ));
                (self.commit(&mut session, turn), Err(err))
            }
        };
        self.event_handler.on_commit(&committed);

        let compaction = match &self.compactor {
            Some(compactor) => compactor.compact_if_due(&mut session).await,
            None => CompactionOutcome::NotDue,
        };
        if compaction.is_compacted() {
            self.event_handler.on_compacted(&compaction);
        }

        self.sessions.persist(&session).await?;

        let response = result?;
        debug!(
            session = %handle.key(),
            events = committed.len(),
            log_len = session.events().len(),
            "Turn committed"
        );
        Ok(TurnOutcome {
            invocation_id,
            response,
            events: committed,
            compaction,
        })
    }

    /// Run several queries in order against one session.
    ///
    /// Stops at the first failed turn.
    pub async fn run_session<I, S>(
        &self,
        user_id: &str,
        session_id: &str,
        queries: I,
    ) -> RunnerResult<Vec<TurnOutcome>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcomes = Vec::new();
        for query in queries {
            outcomes.push(self.run_turn(user_id, session_id, query.as_ref()).await?);
        }
        Ok(outcomes)
    }

    /// Generate until the model stops requesting tools.
    async fn drive(
        &self,
        session: &Session,
        turn: &mut Vec<Event>,
        ctx: &mut ToolContext,
    ) -> RunnerResult<String> {
        let definitions = self.tools.definitions();

        for step in 0..self.max_steps {
            self.event_handler.on_thinking();
            let request = self.build_request(session, turn, &definitions);
            debug!(step, contents = request.contents.len(), "Generating");

            let generator = Arc::clone(&self.generator);
            let response = retry_with_policy(&self.retry_policy, generator.id(), || {
                let generator = Arc::clone(&generator);
                let request = request.clone();
                async move { generator.generate(request).await }
            })
            .await?;

            let calls = response.requested_tool_calls();
            let text = response.content.as_text();
            turn.push(Event::new(
                ctx.invocation_id(),
                &self.agent_name,
                response.content,
            ));

            if calls.is_empty() {
                return Ok(text);
            }

            for call in &calls {
                turn.push(self.execute_tool(call, ctx).await);
            }
        }

        warn!(max_steps = self.max_steps, "Max steps exceeded");
        Err(RunnerError::MaxStepsExceeded(self.max_steps))
    }

    /// Execute one tool call and wrap its result as an event.
    ///
    /// A successful tool's pending state changes ride on the event as its
    /// state delta; a failed tool's changes are discarded.
    async fn execute_tool(&self, call: &ToolCall, ctx: &mut ToolContext) -> Event {
        self.event_handler.on_tool_start(call);

        let result = match self.tools.execute(call, ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                ToolResult::error(call, e.to_string())
            }
        };
        let delta = if result.success {
            ctx.take_delta()
        } else {
            ctx.discard_pending();
            Default::default()
        };

        self.event_handler.on_tool_complete(call, &result);
        debug!(tool = %call.name, success = result.success, delta = delta.len(), "Tool executed");

        let content = Content::new(Role::Tool, vec![Part::from(&result)]);
        Event::new(ctx.invocation_id(), &self.agent_name, content).with_state_delta(delta)
    }

    fn build_request(
        &self,
        session: &Session,
        turn: &[Event],
        definitions: &[ToolDefinition],
    ) -> GenerateRequest {
        let contents = session
            .events()
            .iter()
            .chain(turn.iter())
            .filter(|e| !e.is_error() && !e.content.is_empty())
            .map(|e| e.content.clone())
            .collect();

        let request =
            GenerateRequest::new(&self.model, contents).with_tools(definitions.to_vec());
        match &self.instruction {
            Some(instruction) => request.with_instruction(instruction),
            None => request,
        }
    }

    fn commit(&self, session: &mut Session, turn: Vec<Event>) -> Vec<Event> {
        let committed = turn
            .into_iter()
            .map(|event| session.append(event).clone())
            .collect();
        session.clear_temp();
        committed
    }
}

fn failure_of(err: &RunnerError) -> EventError {
    let code = match err {
        RunnerError::Generation(e) => e.status_code(),
        _ => None,
    };
    EventError {
        code,
        message: err.to_string(),
    }
}

// ============================================================================
// Runner Builder
// ============================================================================

/// Builder for constructing a [`Runner`].
pub struct RunnerBuilder {
    app_name: String,
    agent_name: String,
    model: String,
    instruction: Option<String>,
    generator: Option<Arc<dyn Generator>>,
    retry_policy: RetryPolicy,
    tools: ToolRegistry,
    compactor: Option<Compactor>,
    sessions: Option<Arc<SessionManager>>,
    max_steps: usize,
    event_handler: Option<Arc<dyn RunnerEventHandler>>,
}

impl RunnerBuilder {
    /// Create a builder with agent defaults from [`Config`].
    pub fn new(app_name: impl Into<String>) -> Self {
        let defaults = parley_core::config::AgentConfig::default();
        Self {
            app_name: app_name.into(),
            agent_name: defaults.name,
            model: defaults.model,
            instruction: defaults.instruction,
            generator: None,
            retry_policy: RetryPolicy::default(),
            tools: ToolRegistry::new(),
            compactor: None,
            sessions: None,
            max_steps: defaults.max_steps,
            event_handler: None,
        }
    }

    /// Apply the app, agent, retry and compaction sections of a config.
    ///
    /// Compaction uses the extractive summarizer; call [`Self::compactor`]
    /// afterwards to swap it.
    pub fn from_config(config: &Config) -> RunnerResult<Self> {
        let compaction = config
            .compaction
            .resolve()
            .map_err(|e| RunnerError::NotConfigured(e.to_string()))?;

        let mut builder = Self::new(&config.app.name)
            .agent_name(&config.agent.name)
            .model(&config.agent.model)
            .max_steps(config.agent.max_steps)
            .retry_policy(config.retry.clone());
        builder.instruction = config.agent.instruction.clone();
        builder.compactor = compaction.map(Compactor::extractive);
        Ok(builder)
    }

    /// Set the app whose sessions this runner serves.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the generator (required).
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the retry policy for generate calls.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the agent name, used as the author of its events.
    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Set the tools available to the generator.
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Compact with the extractive summarizer.
    pub fn compaction(mut self, config: CompactionConfig) -> Self {
        self.compactor = Some(Compactor::extractive(config));
        self
    }

    /// Compact with a custom compactor.
    pub fn compactor(mut self, compactor: Compactor) -> Self {
        self.compactor = Some(compactor);
        self
    }

    /// Share a session manager. Defaults to a fresh in-memory one.
    pub fn sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Maximum generate rounds per turn.
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn RunnerEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the runner.
    pub fn build(self) -> RunnerResult<Runner> {
        let generator = self
            .generator
            .ok_or_else(|| RunnerError::NotConfigured("generator is required".into()))?;
        if self.max_steps == 0 {
            return Err(RunnerError::NotConfigured(
                "max_steps must be greater than 0".into(),
            ));
        }

        Ok(Runner {
            app_name: self.app_name,
            agent_name: self.agent_name,
            model: self.model,
            instruction: self.instruction,
            generator,
            retry_policy: self.retry_policy,
            tools: Arc::new(self.tools),
            compactor: self.compactor,
            sessions: self
                .sessions
                .unwrap_or_else(|| Arc::new(SessionManager::new())),
            max_steps: self.max_steps,
            event_handler: self
                .event_handler
                .unwrap_or_else(|| Arc::new(NoOpEventHandler)),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
