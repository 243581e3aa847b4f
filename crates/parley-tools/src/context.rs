//! State access for tools.

use parley_core::{SessionKey, StateKey, StateMap};
use serde_json::Value;

/// Context handed to a tool for one call.
///
/// Reads see the session snapshot taken at the start of the turn, overlaid
/// with writes made earlier in the same turn. Writes go to a pending delta
/// that the runner attaches to the tool's result event.
#[derive(Debug, Clone)]
pub struct ToolContext {
    session: SessionKey,
    invocation_id: String,
    base: StateMap,
    pending: StateMap,
}

impl ToolContext {
    /// Create a context over a state snapshot keyed by prefixed key strings.
    pub fn new(session: SessionKey, invocation_id: impl Into<String>, snapshot: StateMap) -> Self {
        Self {
            session,
            invocation_id: invocation_id.into(),
            base: snapshot,
            pending: StateMap::new(),
        }
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Read a value if present.
    pub fn get(&self, key: &StateKey) -> Option<&Value> {
        let raw = key.to_storage_key();
        self.pending.get(&raw).or_else(|| self.base.get(&raw))
    }

    /// Read a value, falling back to `default`.
    pub fn get_or(&self, key: &StateKey, default: impl Into<Value>) -> Value {
        self.get(key).cloned().unwrap_or_else(|| default.into())
    }

    /// Record a write.
    pub fn set(&mut self, key: &StateKey, value: impl Into<Value>) {
        self.pending.insert(key.to_storage_key(), value.into());
    }

    /// Writes made by the current call.
    pub fn pending(&self) -> &StateMap {
        &self.pending
    }

    /// Take the current call's writes, folding them into what later calls
    /// in the same turn will read.
    pub fn take_delta(&mut self) -> StateMap {
        let delta = std::mem::take(&mut self.pending);
        self.base
            .extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
        delta
    }

    /// Drop the current call's writes, e.g. after the tool failed.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }
}
