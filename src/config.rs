//! Typed configuration (§6). Loaded once from a `config.toml`-shaped file,
//! overridable by `PORT` / `ACCESS_TOKEN` environment variables. Grounded in
//! the teacher's pattern of a single config struct handed to the builder
//! (`lib.rs`), generalized from env-var-only config to a TOML file the way
//! `clap`'s `env` feature layers over a config file in other pack repos
//! (groblegark-coop's `crates/cli/src/profile.rs`).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

fn default_server_port() -> u16 {
    8300
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8200
}
fn default_sse_port() -> u16 {
    8201
}
fn default_sse_kill_threshold() -> u32 {
    5
}
fn default_http_kill_threshold() -> u32 {
    10
}
fn default_routing_default() -> String {
    "none".to_string()
}
fn default_max_agent_hops() -> u32 {
    4
}
fn default_agent_task_timeout_minutes() -> u64 {
    15
}
fn default_activity_quiet_secs() -> u64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_sse_port")]
    pub sse_port: u16,
    #[serde(default = "default_sse_kill_threshold")]
    pub sse_kill_threshold: u32,
    #[serde(default = "default_http_kill_threshold")]
    pub http_kill_threshold: u32,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            sse_port: default_sse_port(),
            sse_kill_threshold: default_sse_kill_threshold(),
            http_kill_threshold: default_http_kill_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_default")]
    pub default: String,
    #[serde(default = "default_max_agent_hops")]
    pub max_agent_hops: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default: default_routing_default(),
            max_agent_hops: default_max_agent_hops(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_agent_task_timeout_minutes")]
    pub agent_task_timeout_minutes: u64,
    /// §4.6 Activity watcher: how long the screen hash must stay unchanged
    /// before `busy` clears. Distinct from (and much longer than) the 1s
    /// sampling tick, so a single quiet sample between streamed lines
    /// doesn't flap busy/idle.
    #[serde(default = "default_activity_quiet_secs")]
    pub activity_quiet_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            agent_task_timeout_minutes: default_agent_task_timeout_minutes(),
            activity_quiet_secs: default_activity_quiet_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CleanupConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub resume_flag: Option<String>,
}

fn default_color() -> String {
    "#888888".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// Path of the data directory; not part of the TOML schema — set after load.
    #[serde(skip)]
    pub data_dir: String,
    /// `--allow-network`, set from the CLI, not the file.
    #[serde(skip)]
    pub allow_network: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, crate::error::AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| crate::error::AppError::Fatal(format!("reading {}: {e}", path.display())))?;
        let mut cfg: Config = toml::from_str(&raw)
            .map_err(|e| crate::error::AppError::Fatal(format!("parsing {}: {e}", path.display())))?;
        cfg.data_dir = "data".to_string();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
    }

    /// §4.5 Network binding: refuse non-loopback unless explicitly permitted.
    pub fn is_loopback_host(&self) -> bool {
        matches!(
            self.server.host.as_str(),
            "127.0.0.1" | "localhost" | "::1"
        )
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn resolve_agent(&self, token: &str) -> Option<String> {
        let lower = token.to_lowercase();
        if self.agents.contains_key(&lower) {
            return Some(lower);
        }
        // Prefix match: "gemini-cli" resolves to configured agent "gemini".
        self.agents
            .keys()
            .find(|name| lower.starts_with(name.as_str()))
            .cloned()
    }
}
