//! SQLite session store.
//!
//! Uses a single SQLite database file with two tables:
//! - `sessions` — one row per session (id, agent_id, created_at)
//! - `events` — append-only memory events, ordered by autoincrement id
//!
//! SQLite serializes writes, which gives the per-session append ordering
//! the pipeline relies on without any extra locking here.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use agentgate_core::error::SessionError;
use agentgate_core::event::{MemoryEvent, Role};
use agentgate_core::session::{SessionRecord, SessionStore};

/// A production SQLite session store.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and all tables are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, SessionError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| SessionError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // In-memory databases are per-connection; a pool of one keeps a
        // single shared database alive for tests.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, SessionError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations — creates the sessions and events tables.
    async fn run_migrations(&self) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                agent_id   TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                ts         TEXT,
                meta       TEXT,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(format!("events table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_session_id ON events (session_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(format!("events index: {e}")))?;

        debug!("SQLite session migrations complete");
        Ok(())
    }

    /// Parse a `MemoryEvent` from an events row.
    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryEvent, SessionError> {
        let role: String = row
            .try_get("role")
            .map_err(|e| SessionError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| SessionError::QueryFailed(format!("content column: {e}")))?;
        let ts: Option<String> = row
            .try_get("ts")
            .map_err(|e| SessionError::QueryFailed(format!("ts column: {e}")))?;
        let meta_json: Option<String> = row
            .try_get("meta")
            .map_err(|e| SessionError::QueryFailed(format!("meta column: {e}")))?;

        // Unparseable stored metadata is dropped rather than failing the read.
        let meta = meta_json.and_then(|raw| serde_json::from_str(&raw).ok());
        let ts = ts.and_then(|raw| {
            chrono::DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });

        Ok(MemoryEvent {
            role: Role::parse(&role),
            content,
            ts,
            meta,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_session(&self, agent_id: &str) -> Result<String, SessionError> {
        let session_id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        sqlx::query("INSERT INTO sessions (id, agent_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(&session_id)
            .bind(agent_id)
            .bind(&created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(format!("INSERT session failed: {e}")))?;

        debug!("Created session {session_id} for agent {agent_id}");
        Ok(session_id)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let row = sqlx::query("SELECT id, agent_id, created_at FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SessionError::QueryFailed(format!("SELECT session: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let agent_id: String = row
            .try_get("agent_id")
            .map_err(|e| SessionError::QueryFailed(format!("agent_id column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| SessionError::QueryFailed(format!("created_at column: {e}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let event_rows = sqlx::query(
            "SELECT role, content, ts, meta FROM events WHERE session_id = ?1 ORDER BY id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SessionError::QueryFailed(format!("SELECT events: {e}")))?;

        let events = event_rows
            .iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(SessionRecord {
            session_id: session_id.to_string(),
            agent_id,
            created_at,
            events,
        }))
    }

    async fn append_events(
        &self,
        session_id: &str,
        events: Vec<MemoryEvent>,
    ) -> Result<usize, SessionError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SessionError::Storage(format!("BEGIN failed: {e}")))?;

        let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| SessionError::QueryFailed(format!("SELECT session: {e}")))?;
        if exists.is_none() {
            return Ok(0);
        }

        let mut appended = 0usize;
        for event in &events {
            let ts = event
                .ts
                .unwrap_or_else(Utc::now)
                .to_rfc3339();
            let meta = match &event.meta {
                Some(meta) => Some(
                    serde_json::to_string(meta)
                        .map_err(|e| SessionError::Storage(format!("meta serialization: {e}")))?,
                ),
                None => None,
            };

            sqlx::query(
                "INSERT INTO events (session_id, role, content, ts, meta) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(session_id)
            .bind(event.role.as_str())
            .bind(&event.content)
            .bind(&ts)
            .bind(&meta)
            .execute(&mut *tx)
            .await
            .map_err(|e| SessionError::Storage(format!("INSERT event failed: {e}")))?;
            appended += 1;
        }

        tx.commit()
            .await
            .map_err(|e| SessionError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(appended)
    }
}
