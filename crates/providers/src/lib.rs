//! Completion backend implementations for AgentGate.
//!
//! All backends implement the `agentgate_core::CompletionBackend` trait.
//! [`build_from_config`] selects the concrete backend from configuration,
//! falling back to the deterministic stub when no API key is available.

pub mod openai_compat;
pub mod stub;

pub use openai_compat::OpenAiCompatBackend;
pub use stub::StubBackend;

use std::sync::Arc;

use agentgate_config::AppConfig;
use agentgate_core::CompletionBackend;

/// Build the configured completion backend.
///
/// "openai" and "openrouter" use the OpenAI-compatible HTTP backend with
/// their respective base URLs; anything else (including "stub") yields the
/// deterministic stub. A configured HTTP backend with no API key also falls
/// back to the stub so local runs work out of the box.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn CompletionBackend> {
    let settings = config
        .backend_config(&config.backend)
        .cloned()
        .unwrap_or_default();

    let api_key = settings
        .api_key
        .clone()
        .or_else(|| match config.backend.as_str() {
            "openrouter" => std::env::var("OPENROUTER_API_KEY").ok(),
            "openai" => std::env::var("OPENAI_API_KEY").ok(),
            _ => None,
        });

    match (config.backend.as_str(), api_key) {
        ("openrouter", Some(key)) => Arc::new(
            OpenAiCompatBackend::new(
                "openrouter",
                settings
                    .api_url
                    .as_deref()
                    .unwrap_or("https://openrouter.ai/api/v1"),
                key,
                settings.model.as_deref().unwrap_or("openai/gpt-4o-mini"),
                settings.timeout_secs,
            ),
        ),
        ("openai", Some(key)) => Arc::new(
            OpenAiCompatBackend::new(
                "openai",
                settings
                    .api_url
                    .as_deref()
                    .unwrap_or("https://api.openai.com/v1"),
                key,
                settings.model.as_deref().unwrap_or("gpt-4o-mini"),
                settings.timeout_secs,
            ),
        ),
        (name, None) if name == "openrouter" || name == "openai" => {
            tracing::warn!(backend = name, "No API key configured, using stub backend");
            Arc::new(StubBackend::new())
        }
        _ => Arc::new(StubBackend::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_stub() {
        let config = AppConfig::default();
        let backend = build_from_config(&config);
        assert_eq!(backend.name(), "stub");
    }

    #[test]
    fn configured_key_builds_http_backend() {
        let mut config = AppConfig::default();
        config.backend = "openrouter".into();
        config.backends.insert(
            "openrouter".into(),
            agentgate_config::BackendConfig {
                api_key: Some("sk-or-test".into()),
                ..Default::default()
            },
        );
        let backend = build_from_config(&config);
        assert_eq!(backend.name(), "openrouter");
    }
}
