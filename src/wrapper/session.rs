//! Terminal session ownership (§3, §4.6, §9). Each wrapper owns exactly one
//! detachable `tmux` session per agent — grounded in groblegark-coop's
//! `TmuxBackend` (`crates/cli/src/pty/attach.rs`): shell out to `tmux` for
//! every operation rather than managing a PTY fd directly, since the
//! terminal needs to survive the wrapper process restarting (§9
//! Polymorphism: swap the backend without touching the supervisor).

use crate::error::AppError;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

const DEFAULT_COLS: u16 = 220;
const DEFAULT_ROWS: u16 = 50;

fn io_err(context: &str, e: std::io::Error) -> AppError {
    AppError::Injection(format!("{context}: {e}"))
}

/// Capability a supervisor needs from a terminal backend (§9: the supervisor
/// must not care whether sessions are realized via tmux, screen, or a raw
/// PTY — only this trait).
#[async_trait::async_trait]

pub trait Session: Send + Sync {
    async fn ensure_started(&self) -> Result<bool, AppError>;
    async fn is_alive(&self) -> bool;
    async fn inject(&self, text: &str) -> Result<(), AppError>;
    async fn interrupt(&self) -> Result<(), AppError>;
    async fn capture(&self) -> Result<String, AppError>;
    async fn kill(&self) -> Result<(), AppError>;
}

pub struct TmuxSession {
    name: String,
    command: String,
    cwd: Option<PathBuf>,
    resume_flag: Option<String>,
}

impl TmuxSession {
    pub fn new(agent: &str, command: &str, cwd: Option<&str>, resume_flag: Option<&str>) -> Self {
        Self {
            name: format!("agentchattr-{agent}"),
            command: command.to_string(),
            cwd: cwd.map(PathBuf::from),
            resume_flag: resume_flag.map(String::from),
        }
    }

    /// §4.6 Startup step 3: "if resume is requested and supported, appends
    /// the configured resume flag." Resume support is "requested" simply by
    /// configuring `resume_flag` for the agent (§6 `agents.<name>`) — a
    /// spawn only happens when no live session was found to reattach to, so
    /// every spawn is a candidate for the CLI's own "resume last
    /// conversation if one exists" behavior.
    fn spawn_command(&self) -> String {
        match &self.resume_flag {
            Some(flag) => format!("{} {flag}", self.command),
            None => self.command.clone(),
        }
    }

    fn cmd(&self) -> Command {
        Command::new("tmux")
    }

    async fn send_keys(&self, keys: &[&str]) -> Result<(), AppError> {
        let status = self
            .cmd()
            .args(["send-keys", "-t", &self.name])
            .args(keys)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| io_err("tmux send-keys", e))?;
        if !status.success() {
            return Err(AppError::Injection(format!("tmux send-keys failed for {}", self.name)));
        }
        Ok(())
    }

    async fn send_keys_literal(&self, text: &str) -> Result<(), AppError> {
        let status = self
            .cmd()
            .args(["send-keys", "-l", "-t", &self.name, text])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| io_err("tmux send-keys -l", e))?;
        if !status.success() {
            return Err(AppError::Injection(format!("tmux literal send-keys failed for {}", self.name)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]

impl Session for TmuxSession {
    async fn ensure_started(&self) -> Result<bool, AppError> {
        if self.is_alive().await {
            return Ok(false);
        }
        let mut cmd = self.cmd();
        cmd.args(["new-session", "-d", "-s", &self.name, "-x", &DEFAULT_COLS.to_string(), "-y", &DEFAULT_ROWS.to_string()]);
        if let Some(cwd) = &self.cwd {
            cmd.arg("-c").arg(cwd);
        }
        cmd.arg(self.spawn_command());
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let status = cmd.status().await.map_err(|e| io_err("tmux new-session", e))?;
        if !status.success() {
            return Err(AppError::Injection(format!("tmux new-session failed for {}", self.name)));
        }
        Ok(true)
    }

    async fn is_alive(&self) -> bool {
        self.cmd()
            .args(["has-session", "-t", &self.name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Deterministic injection sequence (§4.6 Trigger watcher): clear the
    /// current input line, escape any modal input mode, settle, send the
    /// literal prompt text (`-l` so mentions and shell metacharacters aren't
    /// reinterpreted as tmux key names), settle again, then Enter.
    async fn inject(&self, text: &str) -> Result<(), AppError> {
        self.send_keys(&["C-u"]).await?;
        self.send_keys(&["Escape"]).await?;
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        self.send_keys_literal(text).await?;
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        self.send_keys(&["Enter"]).await
    }

    /// A controlled interrupt (§4.6 Server-restart watcher) to make a
    /// session holding a stale MCP session id reconnect.
    async fn interrupt(&self) -> Result<(), AppError> {
        self.send_keys(&["C-c"]).await
    }

    /// `-e` preserves SGR escape sequences so the activity watcher's `avt`
    /// parse sees real color/attribute state, not just flattened text.
    async fn capture(&self) -> Result<String, AppError> {
        let output = self
            .cmd()
            .args(["capture-pane", "-p", "-e", "-t", &self.name])
            .output()
            .await
            .map_err(|e| io_err("tmux capture-pane", e))?;
        if !output.status.success() {
            return Err(AppError::Injection(format!("tmux capture-pane failed for {}", self.name)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn kill(&self) -> Result<(), AppError> {
        let _ = self
            .cmd()
            .args(["kill-session", "-t", &self.name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// No live tmux binary in the test sandbox — this only asserts naming,
    /// not behavior that requires shelling out.
    #[test]
    fn session_name_is_namespaced() {
        let s = TmuxSession::new("claude", "claude", None, None);
        assert_eq!(s.name, "agentchattr-claude");
    }

    #[test]
    fn spawn_command_appends_resume_flag_when_configured() {
        let s = TmuxSession::new("claude", "claude", None, Some("--resume"));
        assert_eq!(s.spawn_command(), "claude --resume");
        let s = TmuxSession::new("claude", "claude", None, None);
        assert_eq!(s.spawn_command(), "claude");
    }
}
