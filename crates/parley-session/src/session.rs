//! A single conversational session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_core::{Event, Scope, SessionKey, SessionSummary, StateKey, StateMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::log::EventLog;
use crate::state::StateStore;

/// Compaction bookkeeping carried by a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionState {
    /// Turns begun since the last successful compaction
    pub turns_since_compaction: u32,
    /// Successful compactions so far
    pub compaction_count: u32,
    /// Sequence of the newest raw event folded into the summary
    pub last_compacted_sequence: Option<u64>,
    /// Invocation id of the most recent turn
    pub last_invocation_id: Option<String>,
}

/// Session state and event log.
///
/// Session-local and `temp:` entries are owned here; `app:` and `user:`
/// entries are routed to the shared [`StateStore`].
#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    log: EventLog,
    local: StateMap,
    temp: StateMap,
    compaction: CompactionState,
    scoped: Arc<StateStore>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session.
    pub fn new(key: SessionKey, scoped: Arc<StateStore>) -> Self {
        let now = Utc::now();
        Self {
            key,
            log: EventLog::new(),
            local: StateMap::new(),
            temp: StateMap::new(),
            compaction: CompactionState::default(),
            scoped,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a session from persisted parts.
    pub fn restore(
        key: SessionKey,
        scoped: Arc<StateStore>,
        log: EventLog,
        local: StateMap,
        compaction: CompactionState,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            log,
            local,
            temp: StateMap::new(),
            compaction,
            scoped,
            created_at,
            updated_at,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub(crate) fn log_mut(&mut self) -> &mut EventLog {
        &mut self.log
    }

    /// Events in order.
    pub fn events(&self) -> &[Event] {
        self.log.events()
    }

    pub fn compaction_state(&self) -> &CompactionState {
        &self.compaction
    }

    pub(crate) fn compaction_state_mut(&mut self) -> &mut CompactionState {
        &mut self.compaction
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Session-local entries (bare names).
    pub fn local_state(&self) -> &StateMap {
        &self.local
    }

    /// Append an event: assign its sequence, apply its state delta, and
    /// count a new turn when its invocation id differs from the last one.
    pub fn append(&mut self, event: Event) -> &Event {
        if !event.actions.state_delta.is_empty() {
            self.apply_delta(&event.actions.state_delta);
        }
        if !event.is_compaction()
            && self.compaction.last_invocation_id.as_deref() != Some(event.invocation_id.as_str())
        {
            self.compaction.turns_since_compaction += 1;
            self.compaction.last_invocation_id = Some(event.invocation_id.clone());
        }
        self.updated_at = Utc::now();
        self.log.append(event)
    }

    /// Read a value, falling back to `default` when absent.
    pub fn get(&self, key: &StateKey, default: Value) -> Value {
        self.lookup(key).unwrap_or(default)
    }

    /// Read a value if present.
    pub fn lookup(&self, key: &StateKey) -> Option<Value> {
        match key.scope() {
            Scope::App | Scope::User => self.scoped.get(&self.key, key),
            Scope::Session => self.local.get(key.name()).cloned(),
            Scope::Temp => self.temp.get(key.name()).cloned(),
        }
    }

    /// Write a value into the scope the key names.
    pub fn set(&mut self, key: &StateKey, value: Value) {
        match key.scope() {
            Scope::App | Scope::User => {
                self.scoped.set(&self.key, key, value);
            }
            Scope::Session => {
                self.local.insert(key.name().to_string(), value);
            }
            Scope::Temp => {
                self.temp.insert(key.name().to_string(), value);
            }
        }
        self.updated_at = Utc::now();
    }

    /// Remove a value, returning it if it was present.
    pub fn remove(&mut self, key: &StateKey) -> Option<Value> {
        match key.scope() {
            Scope::App | Scope::User => self.scoped.remove(&self.key, key),
            Scope::Session => self.local.remove(key.name()),
            Scope::Temp => self.temp.remove(key.name()),
        }
    }

    /// Apply a delta keyed by prefixed key strings.
    pub fn apply_delta(&mut self, delta: &StateMap) {
        for (raw, value) in delta {
            self.set(&StateKey::parse(raw), value.clone());
        }
    }

    /// Drop `temp:` entries at the end of a turn.
    pub fn clear_temp(&mut self) {
        self.temp.clear();
    }

    /// Merged view with precedence app < user < session < temp, keyed by
    /// prefixed key strings.
    pub fn state_snapshot(&self) -> StateMap {
        let mut merged = StateMap::new();
        for scope in Scope::precedence() {
            let entries = match scope {
                Scope::App => self.scoped.app_state(&self.key.app_name),
                Scope::User => self.scoped.user_state(&self.key.app_name, &self.key.user_id),
                Scope::Session => self.local.clone(),
                Scope::Temp => self.temp.clone(),
            };
            merged.extend(
                entries
                    .into_iter()
                    .map(|(name, value)| (StateKey::new(scope, name).to_storage_key(), value)),
            );
        }
        merged
    }

    /// Listing summary.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            key: self.key.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            event_count: self.log.len(),
            compaction_count: self.compaction.compaction_count,
        }
    }
}
