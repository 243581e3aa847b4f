//! Scoped state keys.
//!
//! State keys encode their lifetime in a string prefix:
//!
//! | prefix  | scope     | visible to                              |
//! |---------|-----------|-----------------------------------------|
//! | `app:`  | [`Scope::App`]     | every session of every user of the app |
//! | `user:` | [`Scope::User`]    | every session of the same user         |
//! | (none)  | [`Scope::Session`] | the owning session                     |
//! | `temp:` | [`Scope::Temp`]    | the current turn only                  |
//!
//! [`StateKey`] keeps the scope and the bare name apart so call sites cannot
//! misspell a prefix, and renders back to the prefixed string for storage.
//!
//! A session-local name that itself starts with a reserved prefix (say
//! `user:name`) renders as `session:user:name`, so the string form always
//! parses back to the scope it was written in.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Explicit marker for session-local names that would otherwise read as
/// another scope.
const SESSION_ESCAPE: &str = "session:";

/// A state map keyed by prefixed key strings.
pub type StateMap = BTreeMap<String, serde_json::Value>;

/// Lifetime and visibility of a state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Shared by all users of the app
    App,
    /// Shared by all sessions of one user
    User,
    /// Owned by a single session
    Session,
    /// Discarded at the end of the turn
    Temp,
}

impl Scope {
    /// Key prefix for this scope.
    pub fn prefix(&self) -> &'static str {
        match self {
            Scope::App => "app:",
            Scope::User => "user:",
            Scope::Session => "",
            Scope::Temp => "temp:",
        }
    }

    /// Scopes in merge order, least specific first.
    pub fn precedence() -> [Scope; 4] {
        [Scope::App, Scope::User, Scope::Session, Scope::Temp]
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::App => "app",
            Scope::User => "user",
            Scope::Session => "session",
            Scope::Temp => "temp",
        };
        f.write_str(name)
    }
}

/// A typed state key: scope plus bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    scope: Scope,
    name: String,
}

impl StateKey {
    /// Create a key in the given scope.
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    /// App-scoped key.
    pub fn app(name: impl Into<String>) -> Self {
        Self::new(Scope::App, name)
    }

    /// User-scoped key.
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(Scope::User, name)
    }

    /// Session-local key.
    pub fn session(name: impl Into<String>) -> Self {
        Self::new(Scope::Session, name)
    }

    /// Turn-local key.
    pub fn temp(name: impl Into<String>) -> Self {
        Self::new(Scope::Temp, name)
    }

    /// Parse a prefixed key string. Unprefixed strings and `session:`
    /// strings are session-local.
    pub fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix(SESSION_ESCAPE) {
            return Self::new(Scope::Session, name);
        }
        for scope in [Scope::App, Scope::User, Scope::Temp] {
            if let Some(name) = raw.strip_prefix(scope.prefix()) {
                return Self::new(scope, name);
            }
        }
        Self::new(Scope::Session, raw)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefixed string form used at storage boundaries.
    pub fn to_storage_key(&self) -> String {
        self.to_string()
    }

    fn needs_escape(&self) -> bool {
        self.scope == Scope::Session
            && [Scope::App, Scope::User, Scope::Temp]
                .iter()
                .map(Scope::prefix)
                .chain([SESSION_ESCAPE])
                .any(|prefix| self.name.starts_with(prefix))
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.needs_escape() {
            write!(f, "{SESSION_ESCAPE}{}", self.name)
        } else {
            write!(f, "{}{}", self.scope.prefix(), self.name)
        }
    }
}

impl FromStr for StateKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
