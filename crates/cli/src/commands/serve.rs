//! `agentgate serve` — Start the HTTP API server.

use agentgate_config::AppConfig;
use anyhow::Context;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port_override {
        config.server.port = port;
    }

    println!("AgentGate");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Active agent: {}", config.active_agent);
    println!("   Backend: {}", config.backend);

    agentgate_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}
