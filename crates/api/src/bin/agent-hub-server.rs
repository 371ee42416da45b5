//! agent-hub binary entry point
//!
//! Serves the HTTP/WebSocket API by default; `submit` posts a task to a
//! running server.

use agent_hub_common::{AgentId, ExecutionMode, SystemConfig, Task};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "agent-hub-server")]
#[command(version)]
#[command(about = "Multi-agent task backend")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate configuration
    ValidateConfig,
    /// Submit a task to a running server (client mode)
    Submit {
        /// What the agents should work on
        description: String,

        /// Comma-separated agent ids, in run order
        #[arg(long, value_delimiter = ',', required = true)]
        agents: Vec<AgentId>,

        /// Run the agents concurrently instead of as a chain
        #[arg(long)]
        parallel: bool,

        /// agent-hub server URL
        #[arg(long, default_value = "http://localhost:8080")]
        server_url: String,

        /// Value for the X-API-Key header
        #[arg(long, env = "AGENT_HUB_API_KEY")]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Submit {
            description,
            agents,
            parallel,
            server_url,
            api_key,
        }) => {
            let log_level = cli.log_level.as_deref().unwrap_or("info");
            agent_hub_common::init_tracing_with_level(log_level)?;
            let mode = if parallel {
                ExecutionMode::parallel()
            } else {
                ExecutionMode::default()
            };
            submit_task(&server_url, api_key.as_deref(), &description, &agents, &mode).await
        }
        command => {
            // Loaded before tracing so `[logging] level` can seed the subscriber
            let config = SystemConfig::load(Some(&cli.config));
            let log_level = match &config {
                Ok(config) => config.log_level(cli.log_level.as_deref()).to_string(),
                Err(_) => cli.log_level.clone().unwrap_or_else(|| "info".to_string()),
            };
            agent_hub_common::init_tracing_with_level(&log_level)?;

            let config = config.map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })?;
            info!(path = %cli.config, "Configuration loaded successfully");
            info!("Available agents: {}", config.agents.len());
            for agent in &config.agents {
                info!("  - {} ({})", agent.id, agent.model);
            }

            match command {
                Some(Commands::ValidateConfig) => {
                    println!("Configuration is valid");
                    println!("  Agents: {}", config.agents.len());
                    println!("  LLM provider: {}", config.llm.provider);
                    Ok(())
                }
                Some(Commands::Serve { host, port }) => {
                    let mut config = config;
                    if let Some(h) = host {
                        config.server.host = h;
                    }
                    if let Some(p) = port {
                        config.server.port = p;
                    }
                    agent_hub_api::serve(config).await
                }
                _ => agent_hub_api::serve(config).await,
            }
        }
    }
}

/// POST the task and print what the server accepted
async fn submit_task(
    server_url: &str,
    api_key: Option<&str>,
    description: &str,
    agents: &[AgentId],
    mode: &ExecutionMode,
) -> Result<()> {
    info!("Submitting task to {}", server_url);

    let client = reqwest::Client::new();
    let mut request = client
        .post(format!("{}/api/tasks", server_url.trim_end_matches('/')))
        .json(&json!({
            "description": description,
            "agents": agents,
            "mode": mode,
        }));
    if let Some(key) = api_key {
        request = request.header("X-API-Key", key);
    }

    let response = request.send().await.context("failed to reach server")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("Server returned error status: {}", status);
        return Err(anyhow::anyhow!("Server error {}: {}", status, body));
    }

    let task: Task = response.json().await.context("invalid task response")?;
    println!("{}", task.id);
    println!("  status: {}", task.status);
    println!("  agents: {}", task.agents.len());
    Ok(())
}
