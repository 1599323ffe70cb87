//! Session memory API.
//!
//! - `POST /sessions`               — create a session for the active agent (201)
//! - `POST /sessions/{id}/events`   — append events
//! - `GET  /sessions/{id}`          — fetch a session with its events

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};

use agentgate_core::event::MemoryEvent;
use agentgate_core::session::SessionRecord;
use agentgate_engine::Fault;
use agentgate_engine::fault::ErrorCode;

use crate::{EnvelopeResponse, SharedState, fault_response, resolve_active};

/// Build the /sessions routes; merged into the main router.
pub fn sessions_router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_handler))
        .route("/sessions/{id}", get(get_handler))
        .route("/sessions/{id}/events", post(append_handler))
}

fn session_not_found(session_id: &str) -> Fault {
    Fault::new(
        404,
        ErrorCode::NotFound,
        format!("Session not found: {session_id}"),
        None,
    )
}

/// Create a new session bound to the active agent.
pub(crate) async fn create_handler(
    State(state): State<SharedState>,
) -> Result<(StatusCode, Json<Value>), EnvelopeResponse> {
    let agent = resolve_active(&state).await?;
    let session_id = state
        .sessions
        .create_session(&agent.id)
        .await
        .map_err(|e| fault_response(Some(&agent), Fault::internal(e.to_string(), None)))?;
    Ok((StatusCode::CREATED, Json(json!({"session_id": session_id}))))
}

/// Append events. Body: `{"events": [{"role", "content", ...}, ...]}`.
async fn append_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, EnvelopeResponse> {
    let payload: Value = serde_json::from_slice(&body).map_err(|_| {
        fault_response(None, Fault::malformed("Request body must be valid JSON", None))
    })?;

    let events_value = payload.as_object().and_then(|obj| obj.get("events")).ok_or_else(|| {
        fault_response(
            None,
            Fault::malformed(
                "Request body must include 'events' array",
                Some(json!([{"message": "Missing 'events' field"}])),
            ),
        )
    })?;
    let events = events_value.as_array().ok_or_else(|| {
        fault_response(None, Fault::malformed("'events' must be an array", None))
    })?;

    let exists = state
        .sessions
        .get_session(&session_id)
        .await
        .map_err(|e| fault_response(None, Fault::internal(e.to_string(), None)))?
        .is_some();
    if !exists {
        return Err(fault_response(None, session_not_found(&session_id)));
    }

    // Caller-supplied events are trusted-but-untyped; non-object entries
    // are dropped rather than rejected.
    let events: Vec<MemoryEvent> = events.iter().filter_map(MemoryEvent::from_value).collect();
    let appended = state
        .sessions
        .append_events(&session_id, events)
        .await
        .map_err(|e| fault_response(None, Fault::internal(e.to_string(), None)))?;

    Ok(Json(json!({
        "ok": true,
        "session_id": session_id,
        "appended": appended,
    })))
}

async fn get_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, EnvelopeResponse> {
    let session = state
        .sessions
        .get_session(&session_id)
        .await
        .map_err(|e| fault_response(None, Fault::internal(e.to_string(), None)))?;
    match session {
        Some(session) => Ok(Json(session)),
        None => Err(fault_response(None, session_not_found(&session_id))),
    }
}
