//! Wrapper supervisor (§4.6, §4.7, §5): one per agent, owning exactly one
//! terminal session and five cooperating watcher tasks. Grounded in
//! groblegark-coop's per-session actor loop (`crates/cli/src/pty/attach.rs`
//! `run()`), generalized from a single read/write loop into several
//! independently-scheduled `tokio::spawn` tasks since this spec calls for
//! concurrent trigger/heartbeat/activity/health/restart watchers rather than
//! one PTY forwarder.

use crate::config::AgentConfig;
use crate::error::AppError;
use crate::trigger_queue::TriggerReader;
use crate::wrapper::activity::screen_hash;
use crate::wrapper::session::{Session, TmuxSession};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Starting,
    Running,
    Restarting,
    Stopped,
}

/// Holds the exclusive per-agent lock file for the supervisor's lifetime
/// (§4.6 Startup step 1). Dropping it releases the lock, so a graceful
/// shutdown just needs to drop the supervisor.
struct AgentLock(std::fs::File);

impl AgentLock {
    fn acquire(data_dir: &Path, agent: &str) -> Result<Self, AppError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| AppError::Fatal(format!("creating data dir: {e}")))?;
        let path = data_dir.join(format!("{agent}.lock"));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| AppError::Fatal(format!("opening lock {}: {e}", path.display())))?;
        file.try_lock_exclusive().map_err(|_| {
            AppError::ResourceExhausted(format!("agent {agent} already has a running wrapper"))
        })?;
        Ok(Self(file))
    }
}

impl Drop for AgentLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

/// Appends one tagged line to `data/<agent>_stability.log` (§6 Persisted
/// files). Best-effort: a failure to write the stability log must never
/// take down the watcher that's reporting the event.
fn stability_log(data_dir: &Path, agent: &str, tag: &str, message: &str) {
    use std::io::Write;
    let path = data_dir.join(format!("{agent}_stability.log"));
    let ts = chrono::Utc::now().to_rfc3339();
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(file, "{ts} [{tag}] {message}");
    }
}

/// Thin client for the handful of MCP-HTTP tools the wrapper itself calls
/// (§4.6 steps 3-4, heartbeat, health watcher). Agents talk to the hub
/// through their own MCP client; this is the supervisor's own control-plane
/// traffic, so it goes over plain `reqwest` rather than the WS path used by
/// browser clients (§2).
struct HubClient {
    http: reqwest::Client,
    base: String,
    sse_base: String,
    token: String,
}

impl HubClient {
    fn new(http_port: u16, sse_port: u16, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://127.0.0.1:{http_port}"),
            sse_base: format!("http://127.0.0.1:{sse_port}"),
            token,
        }
    }

    async fn call(&self, tool: &str, body: serde_json::Value) -> Result<(), AppError> {
        let resp = self
            .http
            .post(format!("{}/tools/{tool}", self.base))
            .header("X-Session-Token", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("{tool}: {e}")))?;
        if !resp.status().is_success() {
            return Err(AppError::Transport(format!("{tool}: http {}", resp.status())));
        }
        Ok(())
    }

    async fn health_http(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// The SSE probe only needs to confirm the listener accepts connections;
    /// it does not need to read the stream (§4.6: independent failure
    /// counter from the HTTP probe, same "is the port alive" semantics).
    async fn health_sse(&self) -> bool {
        self.http
            .get(format!("{}/stream", self.sse_base))
            .header("X-Session-Token", &self.token)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

pub struct SupervisorConfig {
    pub agent: String,
    pub agent_config: AgentConfig,
    pub data_dir: PathBuf,
    pub token: String,
    pub http_port: u16,
    pub sse_port: u16,
    pub task_timeout_minutes: u64,
    pub http_kill_threshold: u32,
    pub sse_kill_threshold: u32,
    pub activity_quiet_secs: u64,
}

pub struct Supervisor {
    cfg: SupervisorConfig,
    session: Arc<dyn Session>,
    hub: Arc<HubClient>,
    state: Mutex<State>,
    shutting_down: AtomicBool,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const ACTIVITY_TICK: Duration = Duration::from_secs(1);
const HEALTH_TICK: Duration = Duration::from_secs(30);
const SSE_HEALTH_TICK: Duration = Duration::from_secs(30);
const RESTART_WATCH_TICK: Duration = Duration::from_secs(5);
const RESTART_WINDOW: Duration = Duration::from_secs(30);

impl Supervisor {
    pub fn new(cfg: SupervisorConfig) -> Self {
        let session = Arc::new(TmuxSession::new(
            &cfg.agent,
            &cfg.agent_config.command,
            cfg.agent_config.cwd.as_deref(),
            cfg.agent_config.resume_flag.as_deref(),
        ));
        let hub = Arc::new(HubClient::new(cfg.http_port, cfg.sse_port, cfg.token.clone()));
        Self {
            cfg,
            session,
            hub,
            state: Mutex::new(State::Starting),
            shutting_down: AtomicBool::new(false),
        }
    }

    async fn set_state(&self, s: State) {
        *self.state.lock().await = s;
    }

    pub async fn state(&self) -> State {
        *self.state.lock().await
    }

    /// §4.6 Startup: acquire the lock, truncate the trigger queue, attach or
    /// spawn the session, announce presence, then run until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<(), AppError> {
        let _lock = AgentLock::acquire(&self.cfg.data_dir, &self.cfg.agent)?;

        let mut reader = TriggerReader::new(self.cfg.data_dir.clone(), &self.cfg.agent);
        reader
            .truncate()
            .map_err(|e| AppError::Fatal(format!("truncating trigger queue: {e}")))?;

        let spawned = self.session.ensure_started().await?;
        stability_log(
            &self.cfg.data_dir,
            &self.cfg.agent,
            "session",
            if spawned { "spawned new session" } else { "reattached to existing session" },
        );
        if !spawned {
            tracing::info!(agent = %self.cfg.agent, "reattached to existing session");
        }

        self.set_state(State::Running).await;
        let _ = self
            .hub
            .call("chat_join", serde_json::json!({ "sender": self.cfg.agent }))
            .await;

        let mut tasks = tokio::task::JoinSet::new();
        tasks.spawn(self.clone().trigger_watcher(reader));
        tasks.spawn(self.clone().heartbeat());
        tasks.spawn(self.clone().activity_watcher());
        tasks.spawn(self.clone().health_watcher());
        tasks.spawn(self.clone().restart_watcher());

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::warn!(error = %e, agent = %self.cfg.agent, "watcher task panicked");
            }
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        self.set_state(State::Stopped).await;
        // §4.6: a `leave` notice, not a chat turn — posted via `system_message`
        // so it never touches `SenderKind::Agent` routing or hop counting.
        let _ = self
            .hub
            .call(
                "system_message",
                serde_json::json!({ "text": format!("{} left", self.cfg.agent), "msg_type": "leave" }),
            )
            .await;
    }

    /// §4.6 Trigger watcher: poll the per-agent queue, format a short
    /// `mcp read #<channel>` nudge for each new entry, and inject it with the
    /// session's deterministic sequence. A failed injection does not advance
    /// any cursor — the entry is lost rather than retried, matching the
    /// at-most-once delivery the spec accepts for this path.
    async fn trigger_watcher(self: Arc<Self>, mut reader: TriggerReader) {
        let mut last_sent = String::new();
        let mut idle_since = SystemTime::now();
        let timeout = Duration::from_secs(self.cfg.task_timeout_minutes * 60);
        let mut pending = false;
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            match reader.poll() {
                Ok(entries) => {
                    for entry in entries {
                        let prompt = format!("mcp read #{}", entry.channel);
                        if self.session.inject(&prompt).await.is_ok() {
                            last_sent = prompt;
                            idle_since = SystemTime::now();
                            pending = true;
                        } else {
                            tracing::warn!(agent = %self.cfg.agent, "trigger injection failed");
                            stability_log(&self.cfg.data_dir, &self.cfg.agent, "inject", "trigger injection failed");
                        }
                    }
                }
                Err(e) => tracing::warn!(agent = %self.cfg.agent, error = %e, "trigger queue poll failed"),
            }

            // §4.6 Task-idle re-nudge: re-send the latest prompt once if the
            // queue still has unconsumed work but the screen hasn't changed
            // in `timeout`. `pending` tracks whether we've already re-nudged
            // for the current idle stretch, so this fires at most once.
            if pending && !last_sent.is_empty() {
                if let Ok(elapsed) = SystemTime::now().duration_since(idle_since) {
                    if elapsed > timeout {
                        if self.session.inject(&last_sent).await.is_ok() {
                            tracing::info!(agent = %self.cfg.agent, "re-nudged idle task");
                        }
                        pending = false;
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// §4.6 Heartbeat: a `chat_who` call every 60s keeps presence from
    /// lapsing into the offline sweep even when the agent itself is quiet.
    async fn heartbeat(self: Arc<Self>) {
        let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tick.tick().await;
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            let _ = self
                .hub
                .call("chat_who", serde_json::json!({ "sender": self.cfg.agent }))
                .await;
        }
    }

    /// §4.6 Activity watcher: capture the pane once a second, hash the
    /// rendered text, and report busy/idle transitions over `agent_status`.
    /// Must not alias on color changes alone — `screen_hash` strips SGR
    /// state by construction. Busy sets the moment the hash changes, but only
    /// clears once the hash has held steady for `activity_quiet_secs` — a
    /// single quiet sample between two streamed lines must not flap busy/idle
    /// back and forth on every tick.
    async fn activity_watcher(self: Arc<Self>) {
        let mut tick = tokio::time::interval(ACTIVITY_TICK);
        let mut last_hash: Option<u64> = None;
        let mut busy = false;
        let mut last_change = tokio::time::Instant::now();
        let quiet_window = Duration::from_secs(self.cfg.activity_quiet_secs);
        loop {
            tick.tick().await;
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            let capture = match self.session.capture().await {
                Ok(c) => c,
                Err(_) => continue,
            };
            let hash = screen_hash(&capture);
            let changed = last_hash.map(|h| h != hash).unwrap_or(true);
            last_hash = Some(hash);

            if changed {
                last_change = tokio::time::Instant::now();
                if !busy {
                    busy = true;
                    let _ = self
                        .hub
                        .call("agent_status", serde_json::json!({ "agent": self.cfg.agent, "busy": busy }))
                        .await;
                }
            } else if busy && last_change.elapsed() >= quiet_window {
                busy = false;
                let _ = self
                    .hub
                    .call("agent_status", serde_json::json!({ "agent": self.cfg.agent, "busy": busy }))
                    .await;
            }
        }
    }

    /// §4.6 Health watcher: two independent failure counters, one per port,
    /// since the HTTP and SSE listeners can fail separately. Kills the
    /// session and posts a system message once either counter's threshold is
    /// crossed; a single transient failure just logs.
    async fn health_watcher(self: Arc<Self>) {
        let mut http_tick = tokio::time::interval(HEALTH_TICK);
        let mut sse_tick = tokio::time::interval(SSE_HEALTH_TICK);
        let mut http_failures = 0u32;
        let mut sse_failures = 0u32;
        let http_kill = self.cfg.http_kill_threshold;
        let sse_kill = self.cfg.sse_kill_threshold;
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            tokio::select! {
                _ = http_tick.tick() => {
                    if self.hub.health_http().await {
                        http_failures = 0;
                    } else {
                        http_failures += 1;
                        tracing::warn!(agent = %self.cfg.agent, http_failures, "http health probe failed");
                        stability_log(&self.cfg.data_dir, &self.cfg.agent, "health", &format!("http probe failed ({http_failures}/{http_kill})"));
                        if http_failures >= http_kill {
                            self.kill_unresponsive("http bridge unresponsive").await;
                            return;
                        }
                    }
                }
                _ = sse_tick.tick() => {
                    if self.hub.health_sse().await {
                        sse_failures = 0;
                    } else {
                        sse_failures += 1;
                        tracing::warn!(agent = %self.cfg.agent, sse_failures, "sse health probe failed");
                        stability_log(&self.cfg.data_dir, &self.cfg.agent, "health", &format!("sse probe failed ({sse_failures}/{sse_kill})"));
                        if sse_failures >= sse_kill {
                            self.kill_unresponsive("sse bridge unresponsive").await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// §4.6: fires a `kill` that optionally posts a system message
    /// (`"[stability] Killing <session> — <reason>"`) and terminates the
    /// session to force a clean restart.
    async fn kill_unresponsive(&self, reason: &str) {
        tracing::error!(agent = %self.cfg.agent, reason, "killing session after repeated health failures");
        stability_log(&self.cfg.data_dir, &self.cfg.agent, "kill", reason);
        let session_name = format!("agentchattr-{}", self.cfg.agent);
        // §4.6: same rationale as `shutdown` — a supervisor-originated
        // stability notice, posted via `system_message` instead of
        // `chat_send` so it isn't attributed to the agent or hop-counted.
        let _ = self
            .hub
            .call(
                "system_message",
                serde_json::json!({
                    "text": format!("[stability] Killing {session_name} — {reason}"),
                    "msg_type": "system",
                }),
            )
            .await;
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.session.kill().await;
    }

    /// §4.6 Server-restart watcher: the hub writes a fresh `server_started_at`
    /// file every time it boots. Two successive changes within a short
    /// window mean the hub is crash-looping or was just redeployed, so the
    /// session's MCP connection is stale — send a controlled interrupt to
    /// make the agent's own client reconnect. A single isolated change
    /// (ordinary restart) is just noise and is not acted on.
    async fn restart_watcher(self: Arc<Self>) {
        let path = self.cfg.data_dir.join("server_started_at");
        let mut last_seen = read_started_at(&path).await;
        let mut last_change: Option<SystemTime> = None;
        let mut pending_interrupt = false;
        let mut tick = tokio::time::interval(RESTART_WATCH_TICK);
        loop {
            tick.tick().await;
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            let current = read_started_at(&path).await;
            if current != last_seen && current.is_some() {
                let now = SystemTime::now();
                if pending_interrupt {
                    if let Some(prev) = last_change {
                        if now.duration_since(prev).unwrap_or(Duration::ZERO) <= RESTART_WINDOW {
                            tracing::info!(agent = %self.cfg.agent, "two restarts in window, interrupting session");
                            stability_log(&self.cfg.data_dir, &self.cfg.agent, "session", "interrupted after two server restarts in window");
                            let _ = self.session.interrupt().await;
                        }
                    }
                    pending_interrupt = false;
                } else {
                    pending_interrupt = true;
                    last_change = Some(now);
                }
                last_seen = current;
            }
        }
    }
}

async fn read_started_at(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_per_agent() {
        let dir = tempfile::tempdir().unwrap();
        let first = AgentLock::acquire(dir.path(), "claude").unwrap();
        let second = AgentLock::acquire(dir.path(), "claude");
        assert!(second.is_err());
        drop(first);
        assert!(AgentLock::acquire(dir.path(), "claude").is_ok());
    }

    #[test]
    fn initial_state_is_starting() {
        let cfg = SupervisorConfig {
            agent: "claude".into(),
            agent_config: AgentConfig {
                command: "true".into(),
                cwd: None,
                color: "#888888".into(),
                label: None,
                resume_flag: None,
            },
            data_dir: PathBuf::from("/tmp/agentchat-test-unused"),
            token: "t".into(),
            http_port: 8200,
            sse_port: 8201,
            task_timeout_minutes: 15,
            http_kill_threshold: 10,
            sse_kill_threshold: 5,
            activity_quiet_secs: 3,
        };
        let sup = Supervisor::new(cfg);
        assert!(matches!(sup.state.try_lock().map(|g| *g), Ok(State::Starting)));
    }

    #[test]
    fn stability_log_appends_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        stability_log(dir.path(), "claude", "kill", "http bridge unresponsive");
        let contents = std::fs::read_to_string(dir.path().join("claude_stability.log")).unwrap();
        assert!(contents.contains("[kill] http bridge unresponsive"));
    }
}
