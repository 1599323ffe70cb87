//! SessionStore trait — persisted conversational memory keyed by session id.
//!
//! A session is an append-only, insertion-ordered list of [`MemoryEvent`]s
//! plus a little bookkeeping. Stores must serialize appends per session id
//! so concurrent invocations against the same session keep a stable order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::event::MemoryEvent;

/// A session with its full ordered event history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,

    /// The agent this session was created for
    pub agent_id: String,

    pub created_at: DateTime<Utc>,

    /// Events in insertion order (oldest first)
    pub events: Vec<MemoryEvent>,
}

/// The core SessionStore trait.
///
/// Implementations: SQLite (production), in-memory (tests, ephemeral runs).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The store name (e.g. "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create a new session for `agent_id`; returns the session id.
    async fn create_session(&self, agent_id: &str) -> Result<String, SessionError>;

    /// Fetch a session with its events, or `None` when the id is unknown.
    /// Unknown ids are not an error — callers decide how to treat them.
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Append events to a session, returning how many were written.
    /// Appending to an unknown session writes nothing and returns 0.
    async fn append_events(
        &self,
        session_id: &str,
        events: Vec<MemoryEvent>,
    ) -> Result<usize, SessionError>;
}
