//! AgentGate CLI — the main entry point.
//!
//! Commands:
//! - `serve`    — Start the HTTP gateway
//! - `validate` — Validate a preset agent definition file
//! - `invoke`   — Invoke an agent locally, without the HTTP surface

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentgate",
    about = "AgentGate — standardized agent invocation gateway",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate a preset agent definition file
    Validate {
        /// Path to a preset TOML file
        path: std::path::PathBuf,
    },

    /// Invoke an agent locally with the configured backend
    Invoke {
        /// Agent id (defaults to the configured active agent)
        agent: Option<String>,

        /// Pin a specific agent version
        #[arg(long)]
        version: Option<String>,

        /// Input payload as a JSON object
        #[arg(short, long, default_value = "{}")]
        input: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Validate { path } => commands::validate::run(&path)?,
        Commands::Invoke {
            agent,
            version,
            input,
        } => commands::invoke::run(agent, version, input).await?,
    }

    Ok(())
}
