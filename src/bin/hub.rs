//! Chat hub entry point (§6). Loads config, prepares the data directory,
//! and launches the three independently-bindable Rocket listeners named in
//! §2/§6 — the main chat surface, the MCP-over-HTTP tool bridge, and the
//! MCP-over-SSE reachability stream — side by side on one Tokio runtime.

use agentchat_hub::config::Config;
use agentchat_hub::db::Db;
use agentchat_hub::events::EventBus;
use agentchat_hub::presence::{spawn_offline_sweep, PresenceTracker};
use agentchat_hub::router::Router;
use agentchat_hub::routes::TypingTracker;
use agentchat_hub::store::Store;
use agentchat_hub::trigger_queue::TriggerWriter;
use agentchat_hub::{hub_rocket, mcp_http_rocket, mcp_sse_rocket, AppState};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// §6 CLI: the true command-line flags, layered over the `config.toml`
/// file and the `PORT`/`ACCESS_TOKEN` env overrides config.rs applies.
#[derive(Parser, Debug)]
#[command(name = "agentchat-hub")]
struct Cli {
    /// Path to the `config.toml`-shaped configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Permit binding to a non-loopback host (§1 Non-goals, §4.5 Network
    /// binding). Refused by default.
    #[arg(long, default_value_t = false)]
    allow_network: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    config.allow_network = cli.allow_network;

    if !config.is_loopback_host() && !config.allow_network {
        tracing::error!(
            host = %config.server.host,
            "refusing to bind a non-loopback host without --allow-network (§1 Non-goals)"
        );
        return ExitCode::FAILURE;
    }

    let data_dir = PathBuf::from(&config.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(error = %e, "failed to create data directory");
        return ExitCode::FAILURE;
    }

    let token = match agentchat_hub::auth::SessionToken::load_or_create(&data_dir) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "failed to load or create session token");
            return ExitCode::FAILURE;
        }
    };

    // §4.6 Server-restart watcher: wrappers tail this file to detect the
    // hub having restarted since their cached MCP session ids were issued.
    if let Err(e) = write_server_started_at(&data_dir) {
        tracing::error!(error = %e, "failed to write server_started_at");
        return ExitCode::FAILURE;
    }

    let db = Db::new(data_dir.join("chat_log").to_str().unwrap());
    let events = Arc::new(EventBus::new());
    let writer = TriggerWriter::new(data_dir.clone());
    let router = Arc::new(Router::new(config.clone(), events.clone(), writer));
    let store = Arc::new(Store::new(db, events.clone(), router));
    let presence = Arc::new(PresenceTracker::default());

    spawn_offline_sweep(presence.clone(), events.clone(), store.clone());

    let state = AppState {
        config: Arc::new(config),
        store,
        presence,
        events,
        token,
        typing: Arc::new(TypingTracker::default()),
    };

    tracing::info!(
        port = state.config.server.port,
        mcp_http_port = state.config.mcp.http_port,
        mcp_sse_port = state.config.mcp.sse_port,
        "agentchat-hub starting"
    );

    let hub = hub_rocket(&state).launch();
    let mcp_http = mcp_http_rocket(&state).launch();
    let mcp_sse = mcp_sse_rocket(&state).launch();

    let result = tokio::try_join!(hub, mcp_http, mcp_sse);
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "a hub listener exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn write_server_started_at(data_dir: &std::path::Path) -> std::io::Result<()> {
    let path = data_dir.join("server_started_at");
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, chrono::Utc::now().to_rfc3339())?;
    std::fs::rename(&tmp, &path)
}
