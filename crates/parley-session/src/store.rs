//! Session storage implementation.
//!
//! Provides SQLite-backed storage for sessions, their event logs, and the
//! app and user scoped state shared between sessions.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use parley_core::{Event, SessionKey, SessionSummary, StateMap};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::log::EventLog;
use crate::session::{CompactionState, Session};

/// Errors that can occur during session storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage path error: {0}")]
    PathError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Everything persisted for one session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub key: SessionKey,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: StateMap,
    pub compaction: CompactionState,
    pub next_sequence: u64,
    pub events: Vec<Event>,
}

impl SessionRecord {
    /// Capture a live session.
    pub fn from_session(session: &Session) -> Self {
        Self {
            key: session.key().clone(),
            created_at: session.created_at(),
            updated_at: session.updated_at(),
            state: session.local_state().clone(),
            compaction: session.compaction_state().clone(),
            next_sequence: session.log().next_sequence(),
            events: session.events().to_vec(),
        }
    }

    /// Rebuild the live session, attaching shared scoped state.
    pub fn into_session(self, scoped: std::sync::Arc<crate::state::StateStore>) -> Session {
        Session::restore(
            self.key,
            scoped,
            EventLog::from_parts(self.events, self.next_sequence),
            self.state,
            self.compaction,
            self.created_at,
            self.updated_at,
        )
    }
}

/// Session storage trait for abstraction over storage backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session and its full event log.
    async fn save(&self, record: &SessionRecord) -> Result<()>;

    /// Load a session, if it exists.
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionRecord>>;

    /// Delete a session and its events. Returns whether it existed.
    async fn delete(&self, key: &SessionKey) -> Result<bool>;

    /// Sessions of one user, most recently updated first.
    async fn list(&self, app_name: &str, user_id: &str) -> Result<Vec<SessionSummary>>;

    /// Replace app state (`user_id = None`) or user state.
    async fn save_scoped_state(&self, app_name: &str, user_id: Option<&str>, state: &StateMap) -> Result<()>;

    /// Load app state (`user_id = None`) or user state.
    async fn load_scoped_state(&self, app_name: &str, user_id: Option<&str>) -> Result<StateMap>;
}

/// SQLite-backed session storage.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL for concurrent readers
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Database file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            let migration = include_str!("../migrations/001_initial.sql");
            conn.execute_batch(migration)?;
        }

        Ok(())
    }

    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let key = &record.key;

        tx.execute(
            r#"
            INSERT INTO sessions (
                app_name, user_id, session_id, created_at, updated_at,
                state, compaction, next_sequence, event_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(app_name, user_id, session_id) DO UPDATE SET
                updated_at = excluded.updated_at,
                state = excluded.state,
                compaction = excluded.compaction,
                next_sequence = excluded.next_sequence,
                event_count = excluded.event_count
            "#,
            params![
                key.app_name,
                key.user_id,
                key.session_id,
                Self::format_datetime(&record.created_at),
                Self::format_datetime(&record.updated_at),
                serde_json::to_string(&record.state)?,
                serde_json::to_string(&record.compaction)?,
                record.next_sequence as i64,
                record.events.len() as i64,
            ],
        )?;

        // Compaction rewrites the prefix, so the log is replaced wholesale
        tx.execute(
            "DELETE FROM events WHERE app_name = ?1 AND user_id = ?2 AND session_id = ?3",
            params![key.app_name, key.user_id, key.session_id],
        )?;
        {
            let mut insert = tx.prepare(
                r#"
                INSERT INTO events (
                    app_name, user_id, session_id, sequence, event_id,
                    invocation_id, author, is_compaction, timestamp, payload
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;
            for event in &record.events {
                insert.execute(params![
                    key.app_name,
                    key.user_id,
                    key.session_id,
                    event.sequence as i64,
                    event.id,
                    event.invocation_id,
                    event.author,
                    event.is_compaction(),
                    Self::format_datetime(&event.timestamp),
                    serde_json::to_string(event)?,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn load(&self, key: &SessionKey) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                r#"
                SELECT created_at, updated_at, state, compaction, next_sequence
                FROM sessions
                WHERE app_name = ?1 AND user_id = ?2 AND session_id = ?3
                "#,
                params![key.app_name, key.user_id, key.session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((created_at, updated_at, state, compaction, next_sequence)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT payload FROM events
            WHERE app_name = ?1 AND user_id = ?2 AND session_id = ?3
            ORDER BY sequence ASC
            "#,
        )?;
        let payloads = stmt
            .query_map(params![key.app_name, key.user_id, key.session_id], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let events = payloads
            .iter()
            .map(|p| serde_json::from_str::<Event>(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(SessionRecord {
            key: key.clone(),
            created_at: Self::parse_datetime(&created_at),
            updated_at: Self::parse_datetime(&updated_at),
            state: serde_json::from_str(&state)?,
            compaction: serde_json::from_str(&compaction)?,
            next_sequence: next_sequence.max(0) as u64,
            events,
        }))
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM events WHERE app_name = ?1 AND user_id = ?2 AND session_id = ?3",
            params![key.app_name, key.user_id, key.session_id],
        )?;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE app_name = ?1 AND user_id = ?2 AND session_id = ?3",
            params![key.app_name, key.user_id, key.session_id],
        )?;
        Ok(removed > 0)
    }

    async fn list(&self, app_name: &str, user_id: &str) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, created_at, updated_at, event_count, compaction
            FROM sessions
            WHERE app_name = ?1 AND user_id = ?2
            ORDER BY updated_at DESC
            "#,
        )?;

        let rows = stmt
            .query_map(params![app_name, user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(session_id, created_at, updated_at, event_count, compaction)| {
                let compaction: CompactionState = serde_json::from_str(&compaction)?;
                Ok(SessionSummary {
                    key: SessionKey::new(app_name, user_id, session_id),
                    created_at: Self::parse_datetime(&created_at),
                    updated_at: Self::parse_datetime(&updated_at),
                    event_count: event_count.max(0) as usize,
                    compaction_count: compaction.compaction_count,
                })
            })
            .collect()
    }

    async fn save_scoped_state(&self, app_name: &str, user_id: Option<&str>, state: &StateMap) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO scoped_state (app_name, user_id, state, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(app_name, user_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
            params![
                app_name,
                user_id.unwrap_or(""),
                serde_json::to_string(state)?,
                Self::format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    async fn load_scoped_state(&self, app_name: &str, user_id: Option<&str>) -> Result<StateMap> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT state FROM scoped_state WHERE app_name = ?1 AND user_id = ?2",
                params![app_name, user_id.unwrap_or("")],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(StateMap::new()),
        }
    }
}
