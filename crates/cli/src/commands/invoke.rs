//! `agentgate invoke` — Invoke an agent locally, without the HTTP surface.
//!
//! Builds the same pipeline the gateway serves, seeded from the configured
//! preset directory, and prints the envelope. Useful for smoke-testing a
//! definition before deploying it.

use std::sync::Arc;

use anyhow::Context;

use agentgate_config::AppConfig;
use agentgate_core::auth::OpenGate;
use agentgate_core::session::SessionStore;
use agentgate_engine::InvocationPipeline;
use agentgate_memory::InMemorySessionStore;
use agentgate_registry::RegistryStore;

pub async fn run(
    agent_id: Option<String>,
    version: Option<String>,
    input: String,
) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let agent_id = agent_id.unwrap_or_else(|| config.active_agent.clone());

    // Validate the input JSON up front for a friendlier error than a 400 body.
    let input_value: serde_json::Value =
        serde_json::from_str(&input).context("--input must be valid JSON")?;

    let registry = RegistryStore::new("sqlite::memory:")
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    registry
        .seed_from_presets(&config.presets_dir)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let agent = registry
        .resolve(&agent_id, version.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?
        .with_context(|| format!("Agent not found: {agent_id}"))?;

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let backend = agentgate_providers::build_from_config(&config);
    let pipeline = InvocationPipeline::new(Arc::new(OpenGate), sessions, backend);

    let body = serde_json::json!({"input": input_value}).to_string();
    let outcome = pipeline.invoke(&agent, None, body.as_bytes()).await;

    println!("{}", serde_json::to_string_pretty(&outcome.envelope)?);
    if outcome.status != 200 {
        anyhow::bail!("invocation failed with status {}", outcome.status);
    }
    Ok(())
}
