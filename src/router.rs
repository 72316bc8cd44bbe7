//! Mention router and loop guard (§4.3). Parses each new message for agent
//! addressing, enqueues per-agent trigger events, and caps autonomous
//! agent-to-agent hops per channel.

use crate::config::Config;
use crate::events::{ChatEvent, EventBus};
use crate::models::Message;
use crate::trigger_queue::{TriggerEntry, TriggerWriter};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;
use std::time::{Duration, Instant};

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_-]+)").unwrap());

/// Dedup window: the same agent mentioned twice in one message enqueues once.
const DEDUP_WINDOW: Duration = Duration::from_millis(500);

pub struct Router {
    config: Config,
    events: Arc<EventBus>,
    writer: TriggerWriter,
    hops: Mutex<HashMap<String, u32>>,
    recent_enqueues: Mutex<HashMap<(String, String), Instant>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderKind {
    Human,
    Agent,
}

pub struct RouteOutcome {
    pub triggered: Vec<String>,
    pub loop_guard_paused: bool,
}

impl Router {
    pub fn new(config: Config, events: Arc<EventBus>, writer: TriggerWriter) -> Self {
        Self {
            config,
            events,
            writer,
            hops: Mutex::new(HashMap::new()),
            recent_enqueues: Mutex::new(HashMap::new()),
        }
    }

    /// Parse `@name` tokens (case-insensitive). Resolves `@all`/`@both` to
    /// every configured agent except `exclude`. Exact match first, then
    /// prefix match (`gemini-cli` -> `gemini`). Unknown tokens are ignored.
    pub fn mentioned_agents(&self, text: &str, exclude: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for cap in MENTION_RE.captures_iter(text) {
            let token = cap[1].to_lowercase();
            if token == "all" || token == "both" {
                for name in self.config.agent_names() {
                    if name != exclude && seen.insert(name.clone()) {
                        out.push(name);
                    }
                }
                continue;
            }
            if let Some(agent) = self.config.resolve_agent(&token) {
                if agent != exclude && seen.insert(agent.clone()) {
                    out.push(agent);
                }
            }
        }
        out
    }

    fn reset_hops(&self, channel: &str) {
        self.hops.lock().unwrap().insert(channel.to_string(), 0);
    }

    pub fn hop_count(&self, channel: &str) -> u32 {
        *self.hops.lock().unwrap().get(channel).unwrap_or(&0)
    }

    /// Route a newly appended message: reset/increment hops, resolve
    /// mentions (or forward-all under `routing.default = "all"`), enqueue
    /// triggers, and enforce the loop guard.
    pub fn route(&self, message: &Message, sender_kind: SenderKind) -> RouteOutcome {
        if message.text.trim() == "/continue" {
            self.reset_hops(&message.channel);
            return RouteOutcome {
                triggered: Vec::new(),
                loop_guard_paused: false,
            };
        }

        match sender_kind {
            SenderKind::Human => self.reset_hops(&message.channel),
            SenderKind::Agent => {
                let mut hops = self.hops.lock().unwrap();
                let count = hops.entry(message.channel.clone()).or_insert(0);
                *count += 1;
            }
        }

        if sender_kind == SenderKind::Agent
            && self.hop_count(&message.channel) > self.config.routing.max_agent_hops
        {
            self.events.publish(ChatEvent::LoopGuardPaused {
                channel: message.channel.clone(),
            });
            return RouteOutcome {
                triggered: Vec::new(),
                loop_guard_paused: true,
            };
        }

        let mut targets = self.mentioned_agents(&message.text, &message.sender);
        if targets.is_empty()
            && sender_kind == SenderKind::Human
            && self.config.routing.default == "all"
        {
            targets = self
                .config
                .agent_names()
                .into_iter()
                .filter(|n| n != &message.sender)
                .collect();
        }

        let mut triggered = Vec::new();
        for agent in targets {
            if self.should_dedup(&agent, &message.channel) {
                continue;
            }
            let entry = TriggerEntry {
                channel: message.channel.clone(),
                source_message_id: Some(message.id),
                ts: message.created_at,
            };
            if let Err(e) = self.writer.enqueue(&agent, &entry) {
                tracing::warn!(agent = %agent, error = %e, "failed to enqueue trigger");
                continue;
            }
            triggered.push(agent);
        }

        RouteOutcome {
            triggered,
            loop_guard_paused: false,
        }
    }

    fn should_dedup(&self, agent: &str, channel: &str) -> bool {
        let mut map = self.recent_enqueues.lock().unwrap();
        let key = (agent.to_string(), channel.to_string());
        let now = Instant::now();
        if let Some(last) = map.get(&key) {
            if now.duration_since(*last) < DEDUP_WINDOW {
                return true;
            }
        }
        map.insert(key, now);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;

    fn config_with_agents(names: &[&str]) -> Config {
        let mut cfg = Config::default();
        for n in names {
            cfg.agents.insert(
                n.to_string(),
                AgentConfig {
                    command: n.to_string(),
                    cwd: None,
                    color: "#fff".into(),
                    label: None,
                    resume_flag: None,
                },
            );
        }
        cfg
    }

    fn router(names: &[&str], dir: &std::path::Path) -> Router {
        let events = Arc::new(EventBus::new());
        let writer = TriggerWriter::new(dir.to_path_buf());
        Router::new(config_with_agents(names), events, writer)
    }

    #[test]
    fn single_mention_wakes_one_agent() {
        let dir = tempfile::tempdir().unwrap();
        let r = router(&["claude", "codex", "gemini"], dir.path());
        let msg = Message {
            id: 1,
            channel: "general".into(),
            sender: "user".into(),
            sender_type: "human".into(),
            text: "@claude ping".into(),
            created_at: 0,
            display_time: String::new(),
            reply_to: None,
            attachments: None,
            msg_type: "message".into(),
        };
        let outcome = r.route(&msg, SenderKind::Human);
        assert_eq!(outcome.triggered, vec!["claude".to_string()]);
        assert_eq!(r.hop_count("general"), 0);
    }

    #[test]
    fn two_hop_chain_capped() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventBus::new());
        let writer = TriggerWriter::new(dir.path().to_path_buf());
        let mut cfg = config_with_agents(&["claude", "codex"]);
        cfg.routing.max_agent_hops = 2;
        let r = Router::new(cfg, events, writer);

        let human = Message {
            id: 1,
            channel: "dev".into(),
            sender: "user".into(),
            sender_type: "human".into(),
            text: "@claude hi".into(),
            created_at: 0,
            display_time: String::new(),
            reply_to: None,
            attachments: None,
            msg_type: "message".into(),
        };
        r.route(&human, SenderKind::Human);

        let mut m2 = human.clone();
        m2.id = 2;
        m2.sender = "claude".into();
        m2.text = "@codex over to you".into();
        let o2 = r.route(&m2, SenderKind::Agent);
        assert!(!o2.loop_guard_paused);

        let mut m3 = human.clone();
        m3.id = 3;
        m3.sender = "codex".into();
        m3.text = "@claude done".into();
        let o3 = r.route(&m3, SenderKind::Agent);
        assert!(!o3.loop_guard_paused);

        let mut m4 = human.clone();
        m4.id = 4;
        m4.sender = "claude".into();
        m4.text = "@codex again".into();
        let o4 = r.route(&m4, SenderKind::Agent);
        assert!(o4.loop_guard_paused);
        assert!(o4.triggered.is_empty());

        let mut resume = human.clone();
        resume.id = 5;
        resume.sender = "user".into();
        resume.text = "/continue".into();
        r.route(&resume, SenderKind::Human);
        assert_eq!(r.hop_count("dev"), 0);
    }

    #[test]
    fn prefix_name_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let r = router(&["gemini"], dir.path());
        let msg = Message {
            id: 1,
            channel: "general".into(),
            sender: "user".into(),
            sender_type: "human".into(),
            text: "@gemini-cli see this".into(),
            created_at: 0,
            display_time: String::new(),
            reply_to: None,
            attachments: None,
            msg_type: "message".into(),
        };
        let outcome = r.route(&msg, SenderKind::Human);
        assert_eq!(outcome.triggered, vec!["gemini".to_string()]);
    }

    #[test]
    fn zero_max_hops_pauses_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventBus::new());
        let writer = TriggerWriter::new(dir.path().to_path_buf());
        let mut cfg = config_with_agents(&["claude"]);
        cfg.routing.max_agent_hops = 0;
        let r = Router::new(cfg, events, writer);
        let msg = Message {
            id: 1,
            channel: "general".into(),
            sender: "claude".into(),
            sender_type: "agent".into(),
            text: "hello".into(),
            created_at: 0,
            display_time: String::new(),
            reply_to: None,
            attachments: None,
            msg_type: "message".into(),
        };
        let outcome = r.route(&msg, SenderKind::Agent);
        assert!(outcome.loop_guard_paused);
    }
}
