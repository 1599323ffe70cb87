//! In-memory session store — useful for testing and ephemeral runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use agentgate_core::error::SessionError;
use agentgate_core::event::MemoryEvent;
use agentgate_core::session::{SessionRecord, SessionStore};

/// A session store that keeps everything in a HashMap.
///
/// Appends go through the write lock, which serializes them per store and
/// therefore per session — the ordering guarantee the pipeline relies on.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_session(&self, agent_id: &str) -> Result<String, SessionError> {
        let session_id = Uuid::new_v4().to_string();
        let record = SessionRecord {
            session_id: session_id.clone(),
            agent_id: agent_id.to_string(),
            created_at: Utc::now(),
            events: Vec::new(),
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), record);
        Ok(session_id)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn append_events(
        &self,
        session_id: &str,
        events: Vec<MemoryEvent>,
    ) -> Result<usize, SessionError> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(record) => {
                let appended = events.len();
                let now = Utc::now();
                record.events.extend(events.into_iter().map(|mut ev| {
                    ev.ts.get_or_insert(now);
                    ev
                }));
                Ok(appended)
            }
            // Unknown session appends nothing; callers decide how to react.
            None => Ok(0),
        }
    }
}
