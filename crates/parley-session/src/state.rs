//! Shared app and user scoped state.
//!
//! Session-local and `temp:` entries live on the [`Session`](crate::Session)
//! itself. Entries that outlive a session (`app:` and `user:`) are kept here,
//! keyed by app name and by `(app, user)`, so every session of the same user
//! reads the same values.

use std::collections::HashMap;

use parking_lot::RwLock;
use parley_core::{Scope, SessionKey, StateKey, StateMap};
use serde_json::Value;

/// App and user scoped state shared by all sessions of a manager.
#[derive(Debug, Default)]
pub struct StateStore {
    app: RwLock<HashMap<String, StateMap>>,
    user: RwLock<HashMap<(String, String), StateMap>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an `app:` or `user:` entry visible to `session`.
    ///
    /// Returns `None` for other scopes.
    pub fn get(&self, session: &SessionKey, key: &StateKey) -> Option<Value> {
        match key.scope() {
            Scope::App => self
                .app
                .read()
                .get(&session.app_name)
                .and_then(|m| m.get(key.name()).cloned()),
            Scope::User => self
                .user
                .read()
                .get(&user_slot(session))
                .and_then(|m| m.get(key.name()).cloned()),
            Scope::Session | Scope::Temp => None,
        }
    }

    /// Write an `app:` or `user:` entry. Returns `false` for other scopes.
    pub fn set(&self, session: &SessionKey, key: &StateKey, value: Value) -> bool {
        match key.scope() {
            Scope::App => {
                self.app
                    .write()
                    .entry(session.app_name.clone())
                    .or_default()
                    .insert(key.name().to_string(), value);
                true
            }
            Scope::User => {
                self.user
                    .write()
                    .entry(user_slot(session))
                    .or_default()
                    .insert(key.name().to_string(), value);
                true
            }
            Scope::Session | Scope::Temp => false,
        }
    }

    /// Remove an `app:` or `user:` entry.
    pub fn remove(&self, session: &SessionKey, key: &StateKey) -> Option<Value> {
        match key.scope() {
            Scope::App => self
                .app
                .write()
                .get_mut(&session.app_name)
                .and_then(|m| m.remove(key.name())),
            Scope::User => self
                .user
                .write()
                .get_mut(&user_slot(session))
                .and_then(|m| m.remove(key.name())),
            Scope::Session | Scope::Temp => None,
        }
    }

    /// All app-scoped entries (bare names).
    pub fn app_state(&self, app_name: &str) -> StateMap {
        self.app.read().get(app_name).cloned().unwrap_or_default()
    }

    /// All user-scoped entries for `(app, user)` (bare names).
    pub fn user_state(&self, app_name: &str, user_id: &str) -> StateMap {
        self.user
            .read()
            .get(&(app_name.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Seed app state loaded from persistence. Existing entries win.
    pub fn hydrate_app(&self, app_name: &str, state: StateMap) {
        let mut app = self.app.write();
        let slot = app.entry(app_name.to_string()).or_default();
        for (k, v) in state {
            slot.entry(k).or_insert(v);
        }
    }

    /// Seed user state loaded from persistence. Existing entries win.
    pub fn hydrate_user(&self, app_name: &str, user_id: &str, state: StateMap) {
        let mut user = self.user.write();
        let slot = user
            .entry((app_name.to_string(), user_id.to_string()))
            .or_default();
        for (k, v) in state {
            slot.entry(k).or_insert(v);
        }
    }

    /// Drop all app and user state.
    pub fn clear(&self) {
        self.app.write().clear();
        self.user.write().clear();
    }
}

fn user_slot(session: &SessionKey) -> (String, String) {
    (session.app_name.clone(), session.user_id.clone())
}
