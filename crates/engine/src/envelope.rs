//! The uniform success/error response envelope.
//!
//! Every invocation — and every registry/session endpoint that fails —
//! answers with one of two shapes:
//!
//! ```json
//! {"output": {...}, "meta": {...}}
//! {"error": {"code": "...", "message": "...", "details": ...}, "meta": {...}}
//! ```
//!
//! `meta` always carries a fresh request id plus the agent identity
//! ("unknown" when the definition could not be resolved).

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use agentgate_core::agent::AgentDefinition;

use crate::fault::{ErrorCode, Fault};

/// Generate a fresh request identifier.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request metadata attached to every envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub request_id: String,
    pub agent: String,
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_count: Option<usize>,
}

/// The error payload of an error envelope. `details` is always present in
/// the wire shape (null when there is nothing to say).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

/// The uniform response envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success { output: Value, meta: Meta },
    Error { error: ErrorBody, meta: Meta },
}

impl Envelope {
    /// Build the success envelope for a completed invocation.
    ///
    /// `session_id` and `memory_used_count` appear only when a session was
    /// actually used for this request.
    pub fn success(
        output: Value,
        request_id: impl Into<String>,
        agent: &AgentDefinition,
        latency_ms: f64,
        session_id: Option<String>,
        memory_used_count: Option<usize>,
    ) -> Self {
        Envelope::Success {
            output,
            meta: Meta {
                request_id: request_id.into(),
                agent: agent.id.clone(),
                version: agent.version.clone(),
                latency_ms: Some(latency_ms),
                session_id,
                memory_used_count,
            },
        }
    }

    /// Collapse a [`Fault`] into its HTTP status and error envelope.
    ///
    /// `agent` is `None` only when the definition itself could not be
    /// resolved; the meta then carries "unknown" for agent and version.
    pub fn from_fault(
        request_id: impl Into<String>,
        agent: Option<&AgentDefinition>,
        fault: Fault,
    ) -> (u16, Self) {
        let envelope = Envelope::Error {
            error: ErrorBody {
                code: fault.code,
                message: fault.message,
                details: fault.details,
            },
            meta: Meta {
                request_id: request_id.into(),
                agent: agent.map_or_else(|| "unknown".into(), |a| a.id.clone()),
                version: agent.map_or_else(|| "unknown".into(), |a| a.version.clone()),
                latency_ms: None,
                session_id: None,
                memory_used_count: None,
            },
        };
        (fault.status, envelope)
    }

    /// The meta block, whichever arm this is.
    pub fn meta(&self) -> &Meta {
        match self {
            Envelope::Success { meta, .. } | Envelope::Error { meta, .. } => meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent() -> AgentDefinition {
        AgentDefinition {
            id: "summarizer".into(),
            version: "0.1.0".into(),
            name: "Summarizer".into(),
            description: String::new(),
            primitive: "transform".into(),
            input_schema: json!({"type": "object"}),
            output_schema: json!({"type": "object"}),
            prompt: "Summarize.".into(),
            supports_memory: false,
            memory_policy: None,
            tags: None,
            credits: None,
        }
    }

    #[test]
    fn success_envelope_shape() {
        let envelope = Envelope::success(
            json!({"summary": "hi"}),
            "req-1",
            &agent(),
            12.5,
            Some("sess-1".into()),
            Some(3),
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["output"]["summary"], "hi");
        assert_eq!(value["meta"]["request_id"], "req-1");
        assert_eq!(value["meta"]["agent"], "summarizer");
        assert_eq!(value["meta"]["latency_ms"], 12.5);
        assert_eq!(value["meta"]["session_id"], "sess-1");
        assert_eq!(value["meta"]["memory_used_count"], 3);
    }

    #[test]
    fn success_without_session_omits_memory_meta() {
        let envelope = Envelope::success(json!({}), "req-1", &agent(), 1.0, None, None);
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value["meta"].get("session_id").is_none());
        assert!(value["meta"].get("memory_used_count").is_none());
    }

    #[test]
    fn fault_envelope_shape() {
        let (status, envelope) = Envelope::from_fault(
            "req-2",
            Some(&agent()),
            Fault::input_validation("bad input", json!([{"path": [], "message": "nope"}])),
        );
        assert_eq!(status, 422);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["error"]["code"], "INPUT_VALIDATION_ERROR");
        assert_eq!(value["error"]["details"][0]["message"], "nope");
        assert_eq!(value["meta"]["agent"], "summarizer");
    }

    #[test]
    fn unresolved_agent_reports_unknown() {
        let (status, envelope) =
            Envelope::from_fault("req-3", None, Fault::internal("preset failed to load", None));
        assert_eq!(status, 500);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["meta"]["agent"], "unknown");
        assert_eq!(value["meta"]["version"], "unknown");
        // details key is present and null
        assert!(value["error"]["details"].is_null());
    }
}
