//! Conversation memory events and per-request invocation context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a memory event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

impl Role {
    /// Parse a role string defensively; unknown values fold to `User`.
    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event in conversation memory (stored in a session or supplied
/// inline via the request context). Ordered by insertion; never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub role: Role,

    pub content: String,

    /// When the event was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,

    /// Opaque caller/pipeline metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl MemoryEvent {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ts: None,
            meta: None,
        }
    }

    /// Read an event out of an untyped JSON value.
    ///
    /// Caller-supplied memory is trusted-but-untyped: a non-object yields
    /// `None`, missing `role` defaults to user, missing `content` to "".
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let role = obj
            .get("role")
            .and_then(Value::as_str)
            .map(Role::parse)
            .unwrap_or_default();
        let content = obj
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            role,
            content,
            ts: None,
            meta: obj.get("meta").cloned(),
        })
    }
}

/// An optional retrieval-augmented context fragment supplied inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl KnowledgeItem {
    /// Read a knowledge item out of an untyped JSON value; non-objects and
    /// entries without string `content` are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            id: obj.get("id").and_then(Value::as_str).map(String::from),
            content: obj.get("content").and_then(Value::as_str)?.to_string(),
            meta: obj.get("meta").cloned(),
        })
    }
}

/// Optional per-request context for an invocation.
///
/// Parsed defensively from the request body: unrecognized or mis-typed
/// subfields are dropped, never rejected. This is a backward-compatibility
/// invariant — old clients sending odd context shapes must keep working.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub session_id: Option<String>,
    pub memory: Option<Vec<MemoryEvent>>,
    pub knowledge: Option<Vec<KnowledgeItem>>,
}

impl InvocationContext {
    /// Read a `context` value from a request body. Returns `None` when the
    /// value is not an object (invalid shapes are ignored, not errors).
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let session_id = obj
            .get("session_id")
            .and_then(Value::as_str)
            .map(String::from);
        let memory = obj.get("memory").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(MemoryEvent::from_value)
                .collect::<Vec<_>>()
        });
        let knowledge = obj.get("knowledge").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(KnowledgeItem::from_value)
                .collect::<Vec<_>>()
        });
        Some(Self {
            session_id,
            memory,
            knowledge,
        })
    }

    /// Whether any memory source is in play for this request.
    pub fn wants_memory(&self) -> bool {
        self.session_id.is_some() || self.memory.as_ref().is_some_and(|m| !m.is_empty())
    }
}
