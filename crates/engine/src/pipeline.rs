//! The invocation pipeline.
//!
//! Orchestrates auth → body decoding → JSON parsing → envelope shape check →
//! context resolution → input validation → generation (with bounded repair)
//! → best-effort memory persistence → envelope construction → logging.
//!
//! [`InvocationPipeline::invoke`] is a total function: every fault path is
//! converted to an error envelope before return. Collaborators are injected
//! as `Arc<dyn Trait>`; the pipeline itself holds no locks and no state
//! beyond them, so invocations are freely concurrent.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use agentgate_core::agent::AgentDefinition;
use agentgate_core::auth::AuthGate;
use agentgate_core::backend::CompletionBackend;
use agentgate_core::event::{InvocationContext, KnowledgeItem, MemoryEvent, Role};
use agentgate_core::session::SessionStore;

use crate::envelope::{new_request_id, Envelope};
use crate::fault::Fault;
use crate::merge::merge_events;
use crate::repair;

/// Character caps for persisted memory turns.
const USER_TURN_MAX_CHARS: usize = 500;
const ASSISTANT_TURN_MAX_CHARS: usize = 2000;

/// The final word of an invocation: HTTP status plus envelope.
#[derive(Debug)]
pub struct InvokeOutcome {
    pub status: u16,
    pub envelope: Envelope,
}

/// The orchestrating pipeline. One instance serves all requests.
pub struct InvocationPipeline {
    auth: Arc<dyn AuthGate>,
    sessions: Arc<dyn SessionStore>,
    backend: Arc<dyn CompletionBackend>,
}

/// What the happy path produces before envelope construction.
struct PipelineSuccess {
    output: serde_json::Map<String, Value>,
    session_id: Option<String>,
    memory_used_count: usize,
}

impl InvocationPipeline {
    pub fn new(
        auth: Arc<dyn AuthGate>,
        sessions: Arc<dyn SessionStore>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            auth,
            sessions,
            backend,
        }
    }

    /// The backend identity, for metadata surfaces.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run one invocation against `agent`.
    ///
    /// `authorization` is the raw Authorization header value; `body` is the
    /// undecoded request body. Never fails — faults become error envelopes.
    pub async fn invoke(
        &self,
        agent: &AgentDefinition,
        authorization: Option<&str>,
        body: &[u8],
    ) -> InvokeOutcome {
        let request_id = new_request_id();
        let start = Instant::now();

        let (status, envelope) = match self.run(agent, authorization, body).await {
            Ok(success) => {
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                let memory_used_count = success
                    .session_id
                    .is_some()
                    .then_some(success.memory_used_count);
                let envelope = Envelope::success(
                    Value::Object(success.output),
                    &request_id,
                    agent,
                    latency_ms,
                    success.session_id,
                    memory_used_count,
                );
                (200, envelope)
            }
            Err(fault) => Envelope::from_fault(&request_id, Some(agent), fault),
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            request_id = %request_id,
            agent = %agent.id,
            backend = %self.backend.name(),
            status,
            latency_ms,
            "invoke"
        );

        InvokeOutcome { status, envelope }
    }

    /// The fallible spine of the pipeline. Each step is a possible exit.
    async fn run(
        &self,
        agent: &AgentDefinition,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<PipelineSuccess, Fault> {
        // 1) Authorization — before any parsing, so unauthenticated callers
        //    learn nothing about schemas or validation.
        self.auth
            .enforce(authorization)
            .map_err(|e| Fault::unauthorized(e.to_string()))?;

        // 2) Body must decode as UTF-8.
        let raw_text = std::str::from_utf8(body)
            .map_err(|_| Fault::malformed("Request body must be valid UTF-8", None))?;

        // 3) Body must parse as JSON.
        let payload: Value = serde_json::from_str(raw_text).map_err(|e| {
            Fault::malformed(
                "Request body must be valid JSON",
                Some(serde_json::json!({"message": e.to_string()})),
            )
        })?;

        // 4) Envelope shape: an object with a top-level `input`.
        let input = payload
            .as_object()
            .and_then(|obj| obj.get("input"))
            .ok_or_else(|| {
                Fault::input_validation(
                    "Request body must have top-level 'input' object",
                    serde_json::json!([{"path": [], "message": "Missing 'input' field"}]),
                )
            })?
            .clone();

        // 5) Context resolution — defensive; mis-shaped context is ignored.
        let context = payload
            .get("context")
            .and_then(InvocationContext::from_value)
            .unwrap_or_default();

        let (merged_memory, session_id_used) = self.resolve_memory(agent, &context).await;
        let memory_used_count = merged_memory.len();
        let knowledge: Option<&[KnowledgeItem]> = context.knowledge.as_deref();

        // 6) Input validation against the agent's input schema.
        let input_errors = agentgate_schema::validate(&input, &agent.input_schema);
        if !input_errors.is_empty() {
            return Err(Fault::input_validation(
                "Input failed validation against agent input_schema",
                serde_json::to_value(&input_errors).unwrap_or(Value::Null),
            ));
        }

        // 7) Generation with bounded repair.
        let generated = repair::resolve(
            agent,
            self.backend.as_ref(),
            &input,
            &merged_memory,
            knowledge,
        )
        .await?;

        // 8) Best-effort memory persistence — never downgrades the response.
        if let Some(session_id) = &session_id_used {
            if agent.supports_memory {
                self.persist_turn(agent, session_id, &input, &generated)
                    .await;
            }
        }

        Ok(PipelineSuccess {
            output: generated.output,
            session_id: session_id_used,
            memory_used_count,
        })
    }

    /// Resolve stored + inline memory into the merged, truncated list.
    ///
    /// A session id referencing an unknown session is treated as empty
    /// history (logged, not failed); a store read failure likewise — losing
    /// context is recoverable, failing the invocation is not.
    async fn resolve_memory(
        &self,
        agent: &AgentDefinition,
        context: &InvocationContext,
    ) -> (Vec<MemoryEvent>, Option<String>) {
        if !context.wants_memory() {
            return (Vec::new(), None);
        }

        let mut stored: Vec<MemoryEvent> = Vec::new();
        let mut session_id_used = None;

        if let Some(session_id) = &context.session_id {
            session_id_used = Some(session_id.clone());
            match self.sessions.get_session(session_id).await {
                Ok(Some(session)) => stored = session.events,
                Ok(None) => {
                    warn!(session_id = %session_id, "Session not found; using empty history");
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Session lookup failed; using empty history");
                }
            }
        }

        let inline = context.memory.as_deref().unwrap_or_default();
        let policy = agent.effective_memory_policy();
        (merge_events(&stored, inline, &policy), session_id_used)
    }

    /// Append the user and assistant turns for this invocation.
    /// Failures are logged and swallowed.
    async fn persist_turn(
        &self,
        agent: &AgentDefinition,
        session_id: &str,
        input: &Value,
        generated: &repair::GeneratedOutput,
    ) {
        let input_is_empty = input.is_null() || input.as_object().is_some_and(|o| o.is_empty());
        let user_content = if input_is_empty {
            "invoke".to_string()
        } else {
            truncate_chars(
                &serde_json::to_string(input).unwrap_or_default(),
                USER_TURN_MAX_CHARS,
            )
        };
        let assistant_content = if generated.raw_text.is_empty() {
            truncate_chars(
                &serde_json::to_string(&generated.output).unwrap_or_default(),
                ASSISTANT_TURN_MAX_CHARS,
            )
        } else {
            truncate_chars(&generated.raw_text, ASSISTANT_TURN_MAX_CHARS)
        };

        let events = vec![
            MemoryEvent {
                role: Role::User,
                content: user_content,
                ts: None,
                meta: Some(serde_json::json!({"input": input, "agent": agent.id})),
            },
            MemoryEvent {
                role: Role::Assistant,
                content: assistant_content,
                ts: None,
                meta: Some(serde_json::json!({"output": generated.output})),
            },
        ];

        if let Err(e) = self.sessions.append_events(session_id, events).await {
            warn!(session_id = %session_id, error = %e, "append_events failed");
        }
    }
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
