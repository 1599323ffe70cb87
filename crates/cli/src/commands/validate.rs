//! `agentgate validate` — Validate a preset agent definition file.

use std::path::Path;

use anyhow::Context;

pub fn run(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match agentgate_registry::parse_preset_toml(&content) {
        Ok(agent) => {
            println!("OK  {}@{} ({})", agent.id, agent.version, agent.primitive);
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: {e}", path.display()),
    }
}
