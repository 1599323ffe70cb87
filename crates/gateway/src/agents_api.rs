//! Agent registry API.
//!
//! Registry-backed discovery, registration, and invocation of agents:
//!
//! - `POST /agents/register`        — register a spec (JSON object or TOML string)
//! - `GET  /agents`                 — list with filters
//! - `GET  /agents/updates/stream`  — SSE registry change notifications
//! - `GET  /agents/{id}`            — full definition
//! - `GET  /agents/{id}/schema`     — schemas only
//! - `POST /agents/{id}/invoke`     — run the pipeline against this agent
//! - `POST /agents/{id}/stream`     — 501
//! - `POST /agents/{id}/archive`, `/unarchive`

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::error;

use agentgate_core::agent::AgentDefinition;
use agentgate_engine::fault::ErrorCode;
use agentgate_engine::Fault;
use agentgate_registry::{ListFilter, RegistryError};

use crate::{
    EnvelopeResponse, SharedState, authorization, envelope_response, fault_response,
};

/// Build the /agents routes; merged into the main router.
pub fn agents_router() -> Router<SharedState> {
    Router::new()
        .route("/agents", get(list_handler))
        .route("/agents/register", post(register_handler))
        .route("/agents/updates/stream", get(updates_stream_handler))
        .route("/agents/{id}", get(get_handler))
        .route("/agents/{id}/schema", get(schema_handler))
        .route("/agents/{id}/invoke", post(invoke_handler))
        .route("/agents/{id}/stream", post(stream_handler))
        .route("/agents/{id}/archive", post(archive_handler))
        .route("/agents/{id}/unarchive", post(unarchive_handler))
}

#[derive(Deserialize, Default)]
struct VersionQuery {
    version: Option<String>,
}

#[derive(Deserialize, Default)]
struct ListQuery {
    q: Option<String>,
    primitive: Option<String>,
    supports_memory: Option<String>,
    latest_only: Option<String>,
    include_archived: Option<String>,
}

/// Lenient bool parsing for query params: true/1/yes, false/0/no.
fn parse_bool(value: Option<&str>) -> Option<bool> {
    match value?.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Map registry errors onto the envelope taxonomy.
fn registry_fault(err: RegistryError) -> Fault {
    match err {
        RegistryError::SpecInvalid { message, details } => {
            Fault::new(400, ErrorCode::AgentSpecInvalid, message, details)
        }
        RegistryError::VersionExists { id, version } => Fault::new(
            409,
            ErrorCode::AgentVersionExists,
            format!("Agent version already exists: {id}@{version}"),
            None,
        ),
        RegistryError::NotFound(id) => Fault::agent_not_found(&id),
        RegistryError::NotOwner => Fault::new(
            403,
            ErrorCode::Forbidden,
            "Agent is owned by another user",
            None,
        ),
        RegistryError::Storage(message) => {
            error!(error = %message, "Registry storage failure");
            Fault::internal("Registry failure", Some(json!({"message": message})))
        }
    }
}

async fn resolve_or_404(
    state: &SharedState,
    id: &str,
    version: Option<&str>,
) -> Result<AgentDefinition, EnvelopeResponse> {
    match state.registry.resolve(id, version).await {
        Ok(Some(agent)) => Ok(agent),
        Ok(None) => Err(fault_response(None, Fault::agent_not_found(id))),
        Err(e) => Err(fault_response(None, registry_fault(e))),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn register_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, EnvelopeResponse> {
    let principal = state
        .auth
        .enforce(authorization(&headers))
        .map_err(|e| fault_response(None, Fault::unauthorized(e.to_string())))?;

    let payload: Value = serde_json::from_slice(&body).map_err(|_| {
        fault_response(None, Fault::malformed("Request body must be valid JSON", None))
    })?;

    let raw_spec = payload.as_object().and_then(|obj| obj.get("spec")).ok_or_else(|| {
        fault_response(
            None,
            Fault::new(400, ErrorCode::AgentSpecInvalid, "Missing 'spec' field", None),
        )
    })?;

    // A string spec is a TOML document; anything object-shaped passes through.
    let spec_value: Value = match raw_spec {
        Value::String(raw) => toml::from_str(raw).map_err(|e| {
            fault_response(
                None,
                Fault::new(
                    400,
                    ErrorCode::AgentSpecInvalid,
                    "Spec must be valid TOML",
                    Some(json!({"message": e.to_string()})),
                ),
            )
        })?,
        Value::Object(_) => raw_spec.clone(),
        _ => {
            return Err(fault_response(
                None,
                Fault::new(
                    400,
                    ErrorCode::AgentSpecInvalid,
                    "Spec must be a TOML string or JSON object",
                    None,
                ),
            ));
        }
    };

    let (agent_id, version) = state
        .registry
        .register(&spec_value, principal.subject.as_deref())
        .await
        .map_err(|e| fault_response(None, registry_fault(e)))?;

    Ok(Json(json!({
        "ok": true,
        "agent_id": agent_id,
        "version": version,
        "status": "registered",
    })))
}

pub(crate) async fn list_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, EnvelopeResponse> {
    let filter = ListFilter {
        q: query.q.clone(),
        primitive: query.primitive.clone(),
        supports_memory: parse_bool(query.supports_memory.as_deref()),
        latest_only: parse_bool(query.latest_only.as_deref()).unwrap_or(true),
        include_archived: parse_bool(query.include_archived.as_deref()).unwrap_or(false),
    };

    let agents = state
        .registry
        .list(&filter)
        .await
        .map_err(|e| fault_response(None, registry_fault(e)))?;

    Ok(Json(json!({"agents": agents})))
}

async fn get_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<AgentDefinition>, EnvelopeResponse> {
    let agent = resolve_or_404(&state, &id, query.version.as_deref()).await?;
    Ok(Json(agent))
}

async fn schema_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<Value>, EnvelopeResponse> {
    let agent = resolve_or_404(&state, &id, query.version.as_deref()).await?;
    Ok(Json(json!({
        "agent": agent.id,
        "version": agent.version,
        "primitive": agent.primitive,
        "input_schema": agent.input_schema,
        "output_schema": agent.output_schema,
    })))
}

async fn invoke_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> EnvelopeResponse {
    let agent = match resolve_or_404(&state, &id, query.version.as_deref()).await {
        Ok(agent) => agent,
        Err(response) => return response,
    };
    let outcome = state
        .pipeline
        .invoke(&agent, authorization(&headers), &body)
        .await;
    envelope_response(outcome.status, outcome.envelope)
}

async fn stream_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
    headers: HeaderMap,
) -> EnvelopeResponse {
    let agent = match resolve_or_404(&state, &id, query.version.as_deref()).await {
        Ok(agent) => agent,
        Err(response) => return response,
    };

    if let Err(e) = state.auth.enforce(authorization(&headers)) {
        return fault_response(Some(&agent), Fault::unauthorized(e.to_string()));
    }

    fault_response(
        Some(&agent),
        Fault::not_implemented("Streaming endpoint is not implemented"),
    )
}

async fn archive_handler(
    state: State<SharedState>,
    path: Path<String>,
    query: Query<VersionQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, EnvelopeResponse> {
    set_archived(state, path, query, headers, true).await
}

async fn unarchive_handler(
    state: State<SharedState>,
    path: Path<String>,
    query: Query<VersionQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, EnvelopeResponse> {
    set_archived(state, path, query, headers, false).await
}

async fn set_archived(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
    headers: HeaderMap,
    archived: bool,
) -> Result<Json<Value>, EnvelopeResponse> {
    let principal = state
        .auth
        .enforce(authorization(&headers))
        .map_err(|e| fault_response(None, Fault::unauthorized(e.to_string())))?;

    let changed = state
        .registry
        .set_archived(
            &id,
            query.version.as_deref(),
            archived,
            principal.subject.as_deref(),
        )
        .await
        .map_err(|e| fault_response(None, registry_fault(e)))?;

    if !changed {
        return Err(fault_response(None, Fault::agent_not_found(&id)));
    }

    Ok(Json(json!({"ok": true, "agent_id": id, "archived": archived})))
}

/// SSE stream of registry versions. Emits the current version immediately,
/// then one event per registry mutation.
async fn updates_stream_handler(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = WatchStream::new(state.registry.subscribe()).map(|version| {
        Ok::<_, Infallible>(
            SseEvent::default()
                .event("registry")
                .data(version.to_string()),
        )
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use crate::tests::{send, summarizer_spec, test_state, test_state_with_auth};
    use axum::http::StatusCode;

    fn extractor_spec() -> Value {
        json!({
            "id": "extractor",
            "version": "1.0.0",
            "name": "Extractor",
            "description": "Extracts declared fields",
            "primitive": "extract",
            "prompt": "Extract the requested fields from the text.",
            "input_schema": {
                "type": "object",
                "required": ["text", "schema"],
                "properties": {
                    "text": {"type": "string"},
                    "schema": {"type": "object"}
                }
            },
            "output_schema": {
                "type": "object",
                "required": ["data", "confidence"],
                "properties": {
                    "data": {"type": "object"},
                    "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                }
            }
        })
    }

    #[tokio::test]
    async fn register_then_invoke_roundtrip() {
        let state = test_state().await;

        let body = json!({"spec": extractor_spec()}).to_string();
        let (status, response) = send(
            build_router(state.clone()),
            "POST",
            "/agents/register",
            Some(&body),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["ok"], true);
        assert_eq!(response["agent_id"], "extractor");

        let invoke_body =
            r#"{"input": {"text": "Invoice 77", "schema": {"invoice_no": "string"}}}"#;
        let (status, response) = send(
            build_router(state),
            "POST",
            "/agents/extractor/invoke",
            Some(invoke_body),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["meta"]["agent"], "extractor");
        // The extraction contract guarantees every declared field is present.
        assert!(response["output"]["data"]["invoice_no"].is_string());
    }

    #[tokio::test]
    async fn register_duplicate_version_is_409() {
        let state = test_state().await;
        let body = json!({"spec": summarizer_spec()}).to_string();
        let (status, response) = send(
            build_router(state),
            "POST",
            "/agents/register",
            Some(&body),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(response["error"]["code"], "AGENT_VERSION_EXISTS");
    }

    #[tokio::test]
    async fn register_invalid_spec_is_400() {
        let state = test_state().await;
        let body = json!({"spec": {"id": "broken"}}).to_string();
        let (status, response) = send(
            build_router(state.clone()),
            "POST",
            "/agents/register",
            Some(&body),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"]["code"], "AGENT_SPEC_INVALID");

        let (status, response) = send(
            build_router(state),
            "POST",
            "/agents/register",
            Some(r#"{"no_spec": true}"#),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"]["code"], "AGENT_SPEC_INVALID");
    }

    #[tokio::test]
    async fn register_accepts_toml_spec_strings() {
        let state = test_state().await;
        let toml_spec = r#"
id = "echoer"
version = "0.1.0"
name = "Echoer"
description = "Echoes structured input"
primitive = "transform"
prompt = "Echo the input."

[input_schema]
type = "object"

[output_schema]
type = "object"
"#;
        let body = json!({"spec": toml_spec}).to_string();
        let (status, response) = send(
            build_router(state),
            "POST",
            "/agents/register",
            Some(&body),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["agent_id"], "echoer");
    }

    #[tokio::test]
    async fn unknown_agent_invoke_is_404() {
        let state = test_state().await;
        let (status, response) = send(
            build_router(state),
            "POST",
            "/agents/ghost/invoke",
            Some(r#"{"input": {}}"#),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response["error"]["code"], "AGENT_NOT_FOUND");
        assert_eq!(response["meta"]["agent"], "unknown");
    }

    #[tokio::test]
    async fn list_and_get_and_schema() {
        let state = test_state().await;

        let (status, response) = send(build_router(state.clone()), "GET", "/agents", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["agents"].as_array().unwrap().len(), 1);
        assert_eq!(response["agents"][0]["id"], "summarizer");

        let (status, response) = send(
            build_router(state.clone()),
            "GET",
            "/agents/summarizer",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["id"], "summarizer");
        assert_eq!(response["prompt"], "Summarize the input text.");

        let (status, response) = send(
            build_router(state.clone()),
            "GET",
            "/agents/summarizer/schema",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(response["output_schema"]["properties"]["summary"].is_object());

        let (status, response) = send(
            build_router(state),
            "GET",
            "/agents/ghost",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response["error"]["code"], "AGENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn archive_hides_agent_from_unpinned_resolution() {
        let state = test_state().await;

        let (status, response) = send(
            build_router(state.clone()),
            "POST",
            "/agents/summarizer/archive",
            Some("{}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["archived"], true);

        let (status, response) = send(
            build_router(state.clone()),
            "GET",
            "/agents/summarizer",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response["error"]["code"], "AGENT_NOT_FOUND");

        let (status, _) = send(
            build_router(state),
            "POST",
            "/agents/summarizer/unarchive",
            Some("{}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn foreign_owner_registration_is_forbidden() {
        let auth_config = agentgate_config::AuthConfig {
            token: None,
            tokens: [
                ("tok-alice".to_string(), "alice".to_string()),
                ("tok-bob".to_string(), "bob".to_string()),
            ]
            .into_iter()
            .collect(),
        };
        let state = test_state_with_auth(auth_config).await;

        let mut spec = extractor_spec();
        spec["id"] = json!("owned-agent");
        let body = json!({"spec": spec}).to_string();
        let (status, _) = send(
            build_router(state.clone()),
            "POST",
            "/agents/register",
            Some(&body),
            Some("tok-alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let mut spec = extractor_spec();
        spec["id"] = json!("owned-agent");
        spec["version"] = json!("2.0.0");
        let body = json!({"spec": spec}).to_string();
        let (status, response) = send(
            build_router(state),
            "POST",
            "/agents/register",
            Some(&body),
            Some("tok-bob"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(response["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn updates_stream_responds_with_sse() {
        let state = test_state().await;
        let app = build_router(state);

        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/agents/updates/stream")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/event-stream"));
    }
}
