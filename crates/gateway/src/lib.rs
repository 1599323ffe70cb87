//! HTTP API gateway for AgentGate.
//!
//! Exposes the invocation surface (`/invoke`, `/stream`, `/schema`,
//! `/health`, `/`), the agent registry API (`/agents/...`), and the session
//! memory API (`/sessions/...`).
//!
//! Built on Axum. Every error response uses the uniform envelope from
//! `agentgate_engine`; handlers translate collaborator errors into faults
//! and collapse them at this boundary.

pub mod agents_api;
pub mod auth;
pub mod sessions_api;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Json,
    routing::{get, post},
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use agentgate_config::AppConfig;
use agentgate_core::agent::AgentDefinition;
use agentgate_core::auth::AuthGate;
use agentgate_core::session::SessionStore;
use agentgate_engine::{Envelope, Fault, InvocationPipeline, new_request_id};
use agentgate_memory::SqliteSessionStore;
use agentgate_registry::RegistryStore;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub registry: Arc<RegistryStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub auth: Arc<dyn AuthGate>,
    pub pipeline: InvocationPipeline,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - CORS per config
/// - Request body size limit (1 MB)
/// - In-memory rate limiting (60 req/min per client, /health exempt)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let rate_limiter = Arc::new(RateLimiter::new(60, std::time::Duration::from_secs(60)));
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/schema", get(schema_handler))
        .route("/invoke", post(invoke_handler))
        .route("/stream", post(stream_handler))
        .merge(agents_api::agents_router())
        .merge(sessions_api::sessions_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the registry, session store, backend, and auth gate once and
/// shares them via `Arc` — no global singletons.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    if let Some(parent) = std::path::Path::new(&config.storage.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let registry = Arc::new(RegistryStore::new(&config.storage.db_path).await?);
    let seeded = registry.seed_from_presets(&config.presets_dir).await?;
    if registry.count().await? == 0 {
        warn!("Registry is empty and no presets were seeded");
    } else if seeded > 0 {
        info!(seeded, "Presets seeded");
    }

    let sessions: Arc<dyn SessionStore> =
        Arc::new(SqliteSessionStore::new(&config.storage.db_path).await?);
    let backend = agentgate_providers::build_from_config(&config);
    let auth: Arc<dyn AuthGate> = Arc::new(auth::BearerTokenGate::from_config(&config.auth));

    let pipeline = InvocationPipeline::new(auth.clone(), sessions.clone(), backend);
    let state = Arc::new(GatewayState {
        config,
        registry,
        sessions,
        auth,
        pipeline,
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ── Shared handler plumbing ───────────────────────────────────────────────

/// An envelope plus status, ready for Axum.
pub(crate) type EnvelopeResponse = (StatusCode, Json<Envelope>);

pub(crate) fn envelope_response(status: u16, envelope: Envelope) -> EnvelopeResponse {
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(envelope),
    )
}

/// Collapse a fault into an envelope response with a fresh request id.
pub(crate) fn fault_response(agent: Option<&AgentDefinition>, fault: Fault) -> EnvelopeResponse {
    let (status, envelope) = Envelope::from_fault(new_request_id(), agent, fault);
    envelope_response(status, envelope)
}

/// The raw Authorization header value, if any.
pub(crate) fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Resolve the configured active agent, or a 500 envelope when it is
/// missing (mirrors a preset that fails to load).
pub(crate) async fn resolve_active(
    state: &GatewayState,
) -> Result<AgentDefinition, EnvelopeResponse> {
    match state.registry.resolve(&state.config.active_agent, None).await {
        Ok(Some(agent)) => Ok(agent),
        Ok(None) => Err(fault_response(
            None,
            Fault::internal(
                format!(
                    "Active agent '{}' not found in registry",
                    state.config.active_agent
                ),
                None,
            ),
        )),
        Err(e) => Err(fault_response(None, Fault::internal(e.to_string(), None))),
    }
}

// ── Root / health / schema ────────────────────────────────────────────────

async fn root_handler(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, EnvelopeResponse> {
    let agent = resolve_active(&state).await?;
    Ok(Json(json!({
        "service": "agentgate",
        "agent": agent.id,
        "version": agent.version,
        "schema": "/schema",
        "health": "/health",
    })))
}

async fn health_handler(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, EnvelopeResponse> {
    let agent = resolve_active(&state).await?;
    Ok(Json(json!({
        "status": "ok",
        "agent": agent.id,
        "version": agent.version,
    })))
}

async fn schema_handler(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, EnvelopeResponse> {
    let agent = resolve_active(&state).await?;
    Ok(Json(json!({
        "agent": agent.id,
        "version": agent.version,
        "primitive": agent.primitive,
        "input_schema": agent.input_schema,
        "output_schema": agent.output_schema,
    })))
}

// ── Invocation ────────────────────────────────────────────────────────────

async fn invoke_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> EnvelopeResponse {
    let agent = match resolve_active(&state).await {
        Ok(agent) => agent,
        Err(response) => return response,
    };
    let outcome = state
        .pipeline
        .invoke(&agent, authorization(&headers), &body)
        .await;
    envelope_response(outcome.status, outcome.envelope)
}

/// Streaming is explicitly unimplemented at this boundary. Auth is still
/// enforced first so the 501 leaks nothing to unauthenticated callers.
async fn stream_handler(State(state): State<SharedState>, headers: HeaderMap) -> EnvelopeResponse {
    let agent = state
        .registry
        .resolve(&state.config.active_agent, None)
        .await
        .ok()
        .flatten();

    if let Err(e) = state.auth.enforce(authorization(&headers)) {
        return fault_response(agent.as_ref(), Fault::unauthorized(e.to_string()));
    }

    fault_response(
        agent.as_ref(),
        Fault::not_implemented("Streaming endpoint is not implemented"),
    )
}

// ── Rate Limiter ──────────────────────────────────────────────────────────

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key (bearer token or "anonymous").
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: std::time::Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: std::time::Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Periodic cleanup: if the map grows too large, evict stale entries
        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Rate limiting middleware — keyed by Authorization header, falling back to
/// "anonymous". The /health endpoint is exempt so monitoring can poll it.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let client_key = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(20).collect::<String>(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// ── CORS ──────────────────────────────────────────────────────────────────

fn cors_layer(origins: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(std::time::Duration::from_secs(3600));

    if origins.trim() == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let list: Vec<axum::http::HeaderValue> = origins
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_memory::InMemorySessionStore;
    use agentgate_providers::StubBackend;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    pub(crate) fn summarizer_spec() -> serde_json::Value {
        json!({
            "id": "summarizer",
            "version": "0.1.0",
            "name": "Summarizer",
            "description": "Summarizes text",
            "primitive": "transform",
            "prompt": "Summarize the input text.",
            "supports_memory": true,
            "input_schema": {
                "type": "object",
                "required": ["text"],
                "properties": {"text": {"type": "string"}}
            },
            "output_schema": {
                "type": "object",
                "required": ["summary"],
                "properties": {"summary": {"type": "string", "title": "Summary"}}
            }
        })
    }

    pub(crate) async fn test_state_with_auth(
        auth_config: agentgate_config::AuthConfig,
    ) -> SharedState {
        let mut config = AppConfig::default();
        config.auth = auth_config;

        let registry = Arc::new(RegistryStore::new("sqlite::memory:").await.unwrap());
        registry.register(&summarizer_spec(), None).await.unwrap();

        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let auth: Arc<dyn AuthGate> = Arc::new(auth::BearerTokenGate::from_config(&config.auth));
        let backend = Arc::new(StubBackend::new());
        let pipeline = InvocationPipeline::new(auth.clone(), sessions.clone(), backend);

        Arc::new(GatewayState {
            config,
            registry,
            sessions,
            auth,
            pipeline,
        })
    }

    pub(crate) async fn test_state() -> SharedState {
        test_state_with_auth(agentgate_config::AuthConfig::default()).await
    }

    pub(crate) async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<&str>,
        bearer: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_active_agent() {
        let app = build_router(test_state().await);
        let (status, body) = send(app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["agent"], "summarizer");
    }

    #[tokio::test]
    async fn schema_exposes_active_definition() {
        let app = build_router(test_state().await);
        let (status, body) = send(app, "GET", "/schema", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent"], "summarizer");
        assert_eq!(body["input_schema"]["required"][0], "text");
    }

    #[tokio::test]
    async fn invoke_happy_path() {
        let app = build_router(test_state().await);
        let (status, body) = send(
            app,
            "POST",
            "/invoke",
            Some(r#"{"input": {"text": "hello"}}"#),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["output"]["summary"].is_string());
        assert_eq!(body["meta"]["agent"], "summarizer");
        assert!(body["meta"]["latency_ms"].is_number());
    }

    #[tokio::test]
    async fn invoke_malformed_json_is_400() {
        let app = build_router(test_state().await);
        let (status, body) = send(app, "POST", "/invoke", Some("{ invalid json"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MALFORMED_REQUEST");
        assert!(body["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn invoke_input_violation_is_422_with_details() {
        let app = build_router(test_state().await);
        let (status, body) = send(app, "POST", "/invoke", Some(r#"{"input": {}}"#), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INPUT_VALIDATION_ERROR");
        assert!(!body["error"]["details"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invoke_with_unknown_session_reports_zero_memory() {
        let app = build_router(test_state().await);
        let (status, body) = send(
            app,
            "POST",
            "/invoke",
            Some(r#"{"input": {"text": "hello"}, "context": {"session_id": "ghost"}}"#),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["memory_used_count"], 0);
        assert_eq!(body["meta"]["session_id"], "ghost");
    }

    #[tokio::test]
    async fn stream_is_not_implemented() {
        let app = build_router(test_state().await);
        let (status, body) = send(app, "POST", "/stream", Some("{}"), None).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["error"]["code"], "NOT_IMPLEMENTED");
        assert_eq!(body["meta"]["agent"], "summarizer");
    }

    #[tokio::test]
    async fn auth_token_gates_invoke_and_stream() {
        let auth_config = agentgate_config::AuthConfig {
            token: Some("secret-token".into()),
            tokens: HashMap::new(),
        };
        let state = test_state_with_auth(auth_config).await;

        let (status, body) = send(
            build_router(state.clone()),
            "POST",
            "/invoke",
            Some(r#"{"input": {"text": "hello"}}"#),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, body) = send(
            build_router(state.clone()),
            "POST",
            "/invoke",
            Some(r#"{"input": {"text": "hello"}}"#),
            Some("not-the-token"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = send(
            build_router(state),
            "POST",
            "/invoke",
            Some(r#"{"input": {"text": "hello"}}"#),
            Some("secret-token"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn root_lists_service_metadata() {
        let app = build_router(test_state().await);
        let (status, body) = send(app, "GET", "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "agentgate");
        assert_eq!(body["agent"], "summarizer");
    }

    #[tokio::test]
    async fn missing_active_agent_is_internal_error() {
        let state = test_state().await;
        let mut config = state.config.clone();
        config.active_agent = "nope".into();
        let state = Arc::new(GatewayState {
            config,
            registry: state.registry.clone(),
            sessions: state.sessions.clone(),
            auth: state.auth.clone(),
            pipeline: InvocationPipeline::new(
                state.auth.clone(),
                state.sessions.clone(),
                Arc::new(StubBackend::new()),
            ),
        });
        let (status, body) = send(build_router(state), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["meta"]["agent"], "unknown");
    }
}
