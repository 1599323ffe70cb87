//! OpenAI-compatible completion backend.
//!
//! Works with OpenAI, OpenRouter, and any endpoint exposing an
//! OpenAI-compatible `/chat/completions` route. The output schema is passed
//! through as a `json_schema` response format so compliant servers constrain
//! generation; the pipeline still validates the result regardless.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use agentgate_config::BackendConfig;
use agentgate_core::backend::{BackendResult, CompletionBackend, CompletionResult};
use agentgate_core::error::BackendError;

const SYSTEM_PROMPT: &str =
    "You are a JSON-only API. Respond with strictly valid JSON that matches the provided JSON Schema.";

/// An OpenAI-compatible completion backend.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Create an OpenRouter backend (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            api_key,
            "openai/gpt-4o-mini",
            60,
        )
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            "gpt-4o-mini",
            30,
        )
    }

    /// Apply overrides from a [`BackendConfig`] block.
    pub fn with_settings(mut self, settings: &BackendConfig) -> Self {
        if let Some(url) = &settings.api_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = &settings.model {
            self.model = model.clone();
        }
        self
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str, schema: &Value) -> Result<BackendResult, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "agent_output", "schema": schema},
            },
        });

        debug!(backend = %self.name, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(e.to_string())
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend returned error");
            return Err(BackendError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("No choices in response".into()))?;

        let raw_text = choice.message.content.unwrap_or_default();

        // Non-JSON completion text is not a transport failure; it surfaces
        // as an empty object and fails output validation downstream.
        let parsed: Map<String, Value> = serde_json::from_str(&raw_text).unwrap_or_default();

        Ok(BackendResult::Structured(CompletionResult::new(
            parsed, raw_text,
        )))
    }
}

// --- Wire types ---

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}
