//! Agent wrapper entry point (§2, §4.6). One process per configured agent,
//! launched once per agent by an out-of-scope launcher script (§1, §6).
//! Reads the same `config.toml` the hub reads, resolves its own agent's
//! static config, and runs the supervisor until the process is asked to
//! stop.

use agentchat_hub::config::Config;
use agentchat_hub::wrapper::{Supervisor, SupervisorConfig};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "agentchat-wrapper")]
struct Cli {
    /// Path to the same `config.toml`-shaped configuration file the hub uses.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Name of the configured agent this process supervises.
    #[arg(long)]
    agent: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let Some(agent_config) = config.agents.get(&cli.agent).cloned() else {
        tracing::error!(agent = %cli.agent, "no agents.<name> section for this agent in config");
        return ExitCode::FAILURE;
    };

    let data_dir = PathBuf::from(&config.data_dir);
    let token = match agentchat_hub::auth::SessionToken::load_or_create(&data_dir) {
        Ok(t) => t.0,
        Err(e) => {
            tracing::error!(error = %e, "failed to load session token");
            return ExitCode::FAILURE;
        }
    };

    let supervisor = Arc::new(Supervisor::new(SupervisorConfig {
        agent: cli.agent.clone(),
        agent_config,
        data_dir,
        token,
        http_port: config.mcp.http_port,
        sse_port: config.mcp.sse_port,
        task_timeout_minutes: config.monitor.agent_task_timeout_minutes,
        http_kill_threshold: config.mcp.http_kill_threshold,
        sse_kill_threshold: config.mcp.sse_kill_threshold,
        activity_quiet_secs: config.monitor.activity_quiet_secs,
    }));

    tracing::info!(agent = %cli.agent, "agentchat-wrapper starting");

    match supervisor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(agent = %cli.agent, error = %e, "wrapper exited with an error");
            ExitCode::FAILURE
        }
    }
}
