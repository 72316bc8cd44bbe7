//! Presence tracker (§4.2). `{agent -> (last_seen, busy, session_id)}`,
//! generalized from the teacher's per-room SSE-viewer `PresenceTracker`
//! (`routes/mod.rs` in the original) to per-agent bookkeeping with an
//! offline tick loop, matching the teacher's `retention::spawn_retention_task`
//! interval-task idiom.

use crate::events::{ChatEvent, EventBus};
use crate::models::{Message, PresenceEntry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

pub const OFFLINE_THRESHOLD_SECS: i64 = 120;

#[derive(Debug, Clone)]
struct AgentPresence {
    last_seen: i64,
    busy: bool,
    session_id: Option<String>,
    hat: Option<String>,
    online: bool,
}

pub struct PresenceTracker {
    inner: RwLock<HashMap<String, AgentPresence>>,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

impl PresenceTracker {
    /// Touch presence for `agent`. Returns `true` if this is a transition
    /// from offline to online — callers use this to emit exactly one `join`
    /// (Testable property: "produces exactly one join system message").
    pub async fn touch(&self, agent: &str) -> bool {
        let mut map = self.inner.write().await;
        let entry = map.entry(agent.to_string()).or_insert(AgentPresence {
            last_seen: 0,
            busy: false,
            session_id: None,
            hat: None,
            online: false,
        });
        let was_offline = !entry.online;
        entry.last_seen = now();
        entry.online = true;
        was_offline
    }

    pub async fn set_busy(&self, agent: &str, busy: bool, session_id: Option<String>) {
        let mut map = self.inner.write().await;
        let entry = map.entry(agent.to_string()).or_insert(AgentPresence {
            last_seen: now(),
            busy: false,
            session_id: None,
            hat: None,
            online: true,
        });
        entry.busy = busy;
        if session_id.is_some() {
            entry.session_id = session_id;
        }
    }

    pub async fn set_hat(&self, agent: &str, hat: Option<String>) {
        let mut map = self.inner.write().await;
        let entry = map.entry(agent.to_string()).or_insert(AgentPresence {
            last_seen: now(),
            busy: false,
            session_id: None,
            hat: None,
            online: true,
        });
        entry.hat = hat;
    }

    pub async fn entry(&self, agent: &str) -> Option<PresenceEntry> {
        let map = self.inner.read().await;
        map.get(agent).map(|p| to_entry(agent, p))
    }

    pub async fn all(&self) -> Vec<PresenceEntry> {
        let map = self.inner.read().await;
        map.iter().map(|(name, p)| to_entry(name, p)).collect()
    }

    /// Offline-transition tick (§4.2). Runs on a background interval;
    /// synthesizes a `leave` message per channel and a `status` event.
    pub async fn sweep_offline(&self) -> Vec<String> {
        let mut map = self.inner.write().await;
        let cutoff = now() - OFFLINE_THRESHOLD_SECS;
        let mut newly_offline = Vec::new();
        for (name, p) in map.iter_mut() {
            if p.online && p.last_seen < cutoff {
                p.online = false;
                p.busy = false;
                newly_offline.push(name.clone());
            }
        }
        newly_offline
    }
}

fn to_entry(name: &str, p: &AgentPresence) -> PresenceEntry {
    PresenceEntry {
        agent: name.to_string(),
        last_seen: p.last_seen,
        busy: p.busy,
        session_id: p.session_id.clone(),
        online: p.online,
        hat: p.hat.clone(),
    }
}

/// Spawn the background offline-sweep tick (§4.2: "every few seconds").
/// On a transition the tracker appends a synthetic `leave` message to every
/// known channel and emits a `status` event.
pub fn spawn_offline_sweep(
    presence: Arc<PresenceTracker>,
    events: Arc<EventBus>,
    store: Arc<crate::store::Store>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            interval.tick().await;
            let offline = presence.sweep_offline().await;
            for agent in offline {
                tracing::info!(agent = %agent, "presence: agent went offline");
                for channel in store.channel_names() {
                    let _ = store.append_system(&channel, &format!("{agent} left"), "leave");
                }
                if let Some(entry) = presence.entry(&agent).await {
                    events.publish(ChatEvent::Status(entry));
                }
            }
        }
    })
}

/// Build the `join`/`leave` system message text (§3 Message, msg_type).
pub fn system_message_text(agent: &str, joined: bool) -> String {
    if joined {
        format!("{agent} joined")
    } else {
        format!("{agent} left")
    }
}

pub fn is_join_message(m: &Message) -> bool {
    m.msg_type == "join"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn touch_reports_offline_to_online_transition_once() {
        let tracker = PresenceTracker::default();
        assert!(tracker.touch("claude").await);
        assert!(!tracker.touch("claude").await);
    }

    #[tokio::test]
    async fn sweep_offline_respects_threshold() {
        let tracker = PresenceTracker::default();
        tracker.touch("codex").await;
        let offline = tracker.sweep_offline().await;
        assert!(offline.is_empty());
    }
}
