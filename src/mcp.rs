//! MCP bridge (§4.7, §6): the eight-tool surface exposed to agents. Each
//! call validates the session token the same way a browser does, dispatches
//! to the [`crate::store::Store`] / presence tracker, refreshes presence as
//! a side effect, and returns a small stable JSON shape. Mirrors the
//! teacher's route-function-per-endpoint layout, just addressed by tool
//! name instead of HTTP verb+path.

use crate::db::DEFAULT_CHANNEL;
use crate::error::AppError;
use crate::events::ChatEvent;
use crate::models::*;
use crate::presence::PresenceTracker;
use crate::store::Store;
use std::sync::Arc;

pub struct McpContext {
    pub store: Arc<Store>,
    pub presence: Arc<PresenceTracker>,
    pub events: Arc<crate::events::EventBus>,
}

impl McpContext {
    /// Every tool call refreshes presence for the caller (§4.2, §4.7). If
    /// this is the agent's first call since going offline, post exactly one
    /// `join` system message (Testable property, §8).
    async fn touch(&self, agent: &str) {
        let became_online = self.presence.touch(agent).await;
        if became_online {
            for channel in self.store.channel_names() {
                if let Ok(msg) = self.store.append_system(&channel, &format!("{agent} joined"), "join") {
                    let _ = msg;
                }
            }
            if let Some(entry) = self.presence.entry(agent).await {
                self.events.publish(ChatEvent::Status(entry));
            }
        }
    }

    pub async fn chat_send(&self, args: ChatSendArgs) -> Result<Message, AppError> {
        self.touch(&args.sender).await;
        let send = SendMessage {
            sender: args.sender.clone(),
            text: args.text,
            channel: args.channel,
            reply_to: args.reply_to,
            attachments: None,
            sender_type: Some("agent".into()),
        };
        let (msg, _outcome) = self.store.append(send, "agent")?;
        Ok(msg)
    }

    /// `chat_read(sender=X)` returns only messages with id greater than the
    /// per-agent cursor for `(X, channel)`, then advances that cursor.
    pub async fn chat_read(&self, args: ChatReadArgs) -> Result<Vec<Message>, AppError> {
        self.touch(&args.sender).await;
        let channel = args.channel.as_deref();
        let cursor_channel = channel.unwrap_or(DEFAULT_CHANNEL);
        let cursor = self.store.cursor_get(&args.sender, cursor_channel);
        let mut messages = self.store.since(cursor, channel)?;
        if let Some(limit) = args.limit {
            if messages.len() as i64 > limit {
                let drop_n = messages.len() - limit as usize;
                messages.drain(0..drop_n);
            }
        }
        if let Some(last) = messages.iter().map(|m| m.id).max() {
            self.store.cursor_set(&args.sender, cursor_channel, last);
        }
        Ok(messages)
    }

    pub async fn chat_resync(&self, args: ChatResyncArgs) -> Result<(), AppError> {
        self.touch(&args.sender).await;
        let channel = args.channel.as_deref().unwrap_or(DEFAULT_CHANNEL);
        self.store.cursor_reset(&args.sender, channel);
        Ok(())
    }

    pub async fn chat_join(&self, args: ChatJoinArgs) -> Result<PresenceEntry, AppError> {
        self.touch(&args.sender).await;
        Ok(self.presence.entry(&args.sender).await.unwrap_or(PresenceEntry {
            agent: args.sender,
            last_seen: 0,
            busy: false,
            session_id: None,
            online: true,
            hat: None,
        }))
    }

    pub async fn chat_who(&self, args: ChatWhoArgs) -> Result<Vec<PresenceEntry>, AppError> {
        self.touch(&args.sender).await;
        Ok(self.presence.all().await)
    }

    pub async fn chat_decision(&self, args: ChatDecisionArgs) -> Result<Vec<Decision>, AppError> {
        self.touch(&args.sender).await;
        match args.action.as_str() {
            "propose" => {
                let text = args.text.ok_or_else(|| AppError::Validation("text required".into()))?;
                self.store.decision_add(&args.sender, &text, args.reason.as_deref())?;
            }
            "approve" => {
                let id = args.id.ok_or_else(|| AppError::Validation("id required".into()))?;
                self.store.decision_set_status(id, DecisionStatus::Approved)?;
            }
            "unapprove" => {
                let id = args.id.ok_or_else(|| AppError::Validation("id required".into()))?;
                self.store.decision_set_status(id, DecisionStatus::Proposed)?;
            }
            "edit" => {
                let id = args.id.ok_or_else(|| AppError::Validation("id required".into()))?;
                self.store.decision_edit(id, args.text.as_deref(), args.reason.as_deref())?;
            }
            "delete" => {
                let id = args.id.ok_or_else(|| AppError::Validation("id required".into()))?;
                self.store.decision_delete(id)?;
            }
            "list" => {}
            other => return Err(AppError::Validation(format!("unknown decision action: {other}"))),
        }
        Ok(self.store.decisions_list())
    }

    pub async fn chat_channels(&self, sender: &str) -> Result<Vec<Channel>, AppError> {
        self.touch(sender).await;
        Ok(self.store.channels_list())
    }

    pub async fn chat_set_hat(&self, args: ChatSetHatArgs) -> Result<(), AppError> {
        self.touch(&args.sender).await;
        self.presence.set_hat(&args.sender, Some(args.hat)).await;
        Ok(())
    }

    /// §4.6 Activity watcher: the wrapper calls this on every busy/idle
    /// transition it detects in the terminal. Updates presence and emits a
    /// `typing` event while busy so the chat UI can show activity without
    /// the agent having to narrate it itself.
    /// Posts a `join`/`leave`/`system` notice directly via
    /// `Store::append_system`, bypassing `Router::route` entirely — these are
    /// supervisor lifecycle notices (§4.6), not agent chat turns, so they
    /// must not be tagged `SenderKind::Agent` or count against any channel's
    /// loop-guard hop budget (§4.3). Mirrors `touch`'s join broadcast: a
    /// single channel if named, otherwise every known channel.
    pub async fn system_message(&self, args: SystemMessageArgs) -> Result<(), AppError> {
        match args.channel {
            Some(channel) => {
                self.store.append_system(&channel, &args.text, &args.msg_type)?;
            }
            None => {
                for channel in self.store.channel_names() {
                    self.store.append_system(&channel, &args.text, &args.msg_type)?;
                }
            }
        }
        Ok(())
    }

    pub async fn report_status(&self, args: AgentStatusArgs) -> Result<(), AppError> {
        self.presence.set_busy(&args.agent, args.busy, args.session_id).await;
        if args.busy {
            self.events.publish(ChatEvent::Typing {
                sender: args.agent.clone(),
                channel: "*".to_string(),
            });
        }
        if let Some(entry) = self.presence.entry(&args.agent).await {
            self.events.publish(ChatEvent::Status(entry));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Db;
    use crate::events::EventBus;
    use crate::router::Router;
    use crate::trigger_queue::TriggerWriter;

    fn ctx(dir: &std::path::Path) -> McpContext {
        let db = Db::new(dir.join("chat.db").to_str().unwrap());
        let events = Arc::new(EventBus::new());
        let writer = TriggerWriter::new(dir.to_path_buf());
        let router = Arc::new(Router::new(Config::default(), events.clone(), writer));
        let store = Arc::new(Store::new(db, events.clone(), router));
        McpContext {
            store,
            presence: Arc::new(PresenceTracker::default()),
            events,
        }
    }

    #[tokio::test]
    async fn read_then_resync_resets_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let c = ctx(dir.path());
        c.chat_send(ChatSendArgs {
            sender: "user".into(),
            text: "hello".into(),
            channel: None,
            reply_to: None,
        })
        .await
        .unwrap();
        let first = c
            .chat_read(ChatReadArgs {
                sender: "claude".into(),
                channel: None,
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        let second = c
            .chat_read(ChatReadArgs {
                sender: "claude".into(),
                channel: None,
                limit: None,
            })
            .await
            .unwrap();
        assert!(second.is_empty());
        c.chat_resync(ChatResyncArgs {
            sender: "claude".into(),
            channel: None,
        })
        .await
        .unwrap();
        let third = c
            .chat_read(ChatReadArgs {
                sender: "claude".into(),
                channel: None,
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn first_call_after_offline_emits_single_join() {
        let dir = tempfile::tempdir().unwrap();
        let c = ctx(dir.path());
        c.chat_who(ChatWhoArgs { sender: "codex".into() }).await.unwrap();
        let joins = c
            .store
            .since(0, None)
            .unwrap()
            .into_iter()
            .filter(|m| m.msg_type == "join" && m.text.contains("codex"))
            .count();
        assert_eq!(joins, 1);
        // A second call while still online must not emit another join.
        c.chat_who(ChatWhoArgs { sender: "codex".into() }).await.unwrap();
        let joins = c
            .store
            .since(0, None)
            .unwrap()
            .into_iter()
            .filter(|m| m.msg_type == "join" && m.text.contains("codex"))
            .count();
        assert_eq!(joins, 1);
    }
}
