//! The Store (§4.1): durable, ordered persistence and change notification
//! for messages, decisions, pins, and channels. Wraps `Db` (SQLite, WAL
//! mode — the teacher's `db.rs` pattern) behind the method names §4.1
//! names, and folds in the router so any code path that appends a message
//! (WS, MCP `chat_send`) gets mention routing and loop-guard enforcement for
//! free.

use crate::db::{Db, DECISION_CAP, DEFAULT_CHANNEL};
use crate::error::AppError;
use crate::events::{ChatEvent, EventBus};
use crate::models::*;
use crate::router::{Router, SenderKind};
use chrono::Utc;
use rusqlite::params;
use std::sync::Arc;

pub struct Store {
    db: Db,
    events: Arc<EventBus>,
    router: Arc<Router>,
}

fn channel_name_valid(name: &str) -> bool {
    let re = regex::Regex::new(r"^[a-z0-9][a-z0-9-]{0,19}$").unwrap();
    re.is_match(name)
}

impl Store {
    pub fn new(db: Db, events: Arc<EventBus>, router: Arc<Router>) -> Self {
        Self { db, events, router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    // ---- Messages ----

    pub fn append(&self, req: SendMessage, sender_type: &str) -> Result<(Message, crate::router::RouteOutcome), AppError> {
        let channel = req.channel.clone().unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
        let text = req.text.clone();
        let msg = self.insert_message(
            &channel,
            &req.sender,
            sender_type,
            &text,
            req.reply_to,
            req.attachments.clone(),
            "message",
        )?;
        let kind = if sender_type == "agent" {
            SenderKind::Agent
        } else {
            SenderKind::Human
        };
        let outcome = self.router.route(&msg, kind);
        Ok((msg, outcome))
    }

    pub fn append_system(&self, channel: &str, text: &str, msg_type: &str) -> Result<Message, AppError> {
        self.insert_message(channel, "system", "system", text, None, None, msg_type)
    }

    fn insert_message(
        &self,
        channel: &str,
        sender: &str,
        sender_type: &str,
        text: &str,
        reply_to: Option<i64>,
        attachments: Option<Vec<Attachment>>,
        msg_type: &str,
    ) -> Result<Message, AppError> {
        let conn = self.db.conn();
        if let Some(parent) = reply_to {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE id = ?1",
                    params![parent],
                    |r| r.get::<_, i64>(0),
                )
                .map(|c| c > 0)
                .unwrap_or(false);
            if !exists {
                return Err(AppError::Validation("reply_to references unknown message".into()));
            }
        }
        let now = Utc::now();
        let created_at = now.timestamp();
        let display_time = now.to_rfc3339();
        let attachments_json = attachments
            .as_ref()
            .map(|a| serde_json::to_string(a).unwrap());

        conn.execute(
            "INSERT INTO messages (channel, sender, sender_type, text, created_at, display_time, reply_to, attachments, msg_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![channel, sender, sender_type, text, created_at, display_time, reply_to, attachments_json, msg_type],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        let msg = Message {
            id,
            channel: channel.to_string(),
            sender: sender.to_string(),
            sender_type: sender_type.to_string(),
            text: text.to_string(),
            created_at,
            display_time,
            reply_to,
            attachments,
            msg_type: msg_type.to_string(),
        };
        self.events.publish(ChatEvent::Message(msg.clone()));
        Ok(msg)
    }

    pub fn delete(&self, ids: &[i64], channel: &str) -> Result<(), AppError> {
        let conn = self.db.conn();
        for id in ids {
            conn.execute("UPDATE messages SET deleted = 1 WHERE id = ?1", params![id])?;
            conn.execute("DELETE FROM pins WHERE message_id = ?1", params![id])?;
        }
        drop(conn);
        self.events.publish(ChatEvent::Delete {
            ids: ids.to_vec(),
            channel: channel.to_string(),
        });
        Ok(())
    }

    pub fn recent(&self, channel: Option<&str>, limit: i64) -> Result<Vec<Message>, AppError> {
        let conn = self.db.conn();
        let sql = if channel.is_some() {
            "SELECT id, channel, sender, sender_type, text, created_at, display_time, reply_to, attachments, msg_type
             FROM messages WHERE deleted = 0 AND channel = ?1 ORDER BY id DESC LIMIT ?2"
        } else {
            "SELECT id, channel, sender, sender_type, text, created_at, display_time, reply_to, attachments, msg_type
             FROM messages WHERE deleted = 0 ORDER BY id DESC LIMIT ?1"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = if let Some(ch) = channel {
            stmt.query_map(params![ch, limit], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![limit], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?
        };
        let mut rows = rows;
        rows.reverse();
        Ok(rows)
    }

    /// `since(cursor, channel)`: all visible messages with id > cursor.
    /// Open question (§9, resolved in SPEC_FULL): cross-channel ordering is
    /// strictly by id ascending.
    pub fn since(&self, cursor: i64, channel: Option<&str>) -> Result<Vec<Message>, AppError> {
        let conn = self.db.conn();
        let sql = if channel.is_some() {
            "SELECT id, channel, sender, sender_type, text, created_at, display_time, reply_to, attachments, msg_type
             FROM messages WHERE deleted = 0 AND channel = ?1 AND id > ?2 ORDER BY id ASC"
        } else {
            "SELECT id, channel, sender, sender_type, text, created_at, display_time, reply_to, attachments, msg_type
             FROM messages WHERE deleted = 0 AND id > ?1 ORDER BY id ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = if let Some(ch) = channel {
            stmt.query_map(params![ch, cursor], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![cursor], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn channel_names(&self) -> Vec<String> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM channels WHERE deleted_at IS NULL ORDER BY name")
            .unwrap();
        stmt.query_map([], |r| r.get::<_, String>(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    // ---- Channels ----

    pub fn channel_create(&self, name: &str) -> Result<Channel, AppError> {
        if !channel_name_valid(name) {
            return Err(AppError::Validation(format!("invalid channel name: {name}")));
        }
        let conn = self.db.conn();
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM channels WHERE name = ?1 AND deleted_at IS NULL",
                params![name],
                |r| r.get::<_, i64>(0),
            )
            .map(|c| c > 0)
            .unwrap_or(false);
        if exists {
            return Err(AppError::Validation(format!("channel already exists: {name}")));
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO channels (name, created_at, deleted_at) VALUES (?1, ?2, NULL)",
            params![name, now],
        )?;
        drop(conn);
        let channel = Channel {
            name: name.to_string(),
            created_at: now,
        };
        self.events.publish(ChatEvent::ChannelCreated(channel.clone()));
        Ok(channel)
    }

    pub fn channel_rename(&self, old: &str, new: &str) -> Result<(), AppError> {
        if old == DEFAULT_CHANNEL {
            return Err(AppError::Validation("cannot rename the default channel".into()));
        }
        if !channel_name_valid(new) || new == DEFAULT_CHANNEL {
            return Err(AppError::Validation(format!("invalid channel name: {new}")));
        }
        let conn = self.db.conn();
        let updated = conn.execute(
            "UPDATE channels SET name = ?1 WHERE name = ?2 AND deleted_at IS NULL",
            params![new, old],
        )?;
        if updated == 0 {
            return Err(AppError::Validation(format!("channel not found: {old}")));
        }
        conn.execute("UPDATE messages SET channel = ?1 WHERE channel = ?2", params![new, old])?;
        drop(conn);
        self.events.publish(ChatEvent::ChannelRenamed {
            old: old.to_string(),
            new: new.to_string(),
        });
        Ok(())
    }

    /// §9 Open Question (resolved in SPEC_FULL): deletion tombstones the
    /// channel row rather than purging its messages.
    pub fn channel_delete(&self, name: &str) -> Result<(), AppError> {
        if name == DEFAULT_CHANNEL {
            return Err(AppError::Validation("cannot delete the default channel".into()));
        }
        let conn = self.db.conn();
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE channels SET deleted_at = ?1 WHERE name = ?2 AND deleted_at IS NULL",
            params![now, name],
        )?;
        if updated == 0 {
            return Err(AppError::Validation(format!("channel not found: {name}")));
        }
        drop(conn);
        self.events.publish(ChatEvent::ChannelDeleted { name: name.to_string() });
        Ok(())
    }

    pub fn channels_list(&self) -> Vec<Channel> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare("SELECT name, created_at FROM channels WHERE deleted_at IS NULL ORDER BY name")
            .unwrap();
        stmt.query_map([], |r| {
            Ok(Channel {
                name: r.get(0)?,
                created_at: r.get(1)?,
            })
        })
        .unwrap()
        .filter_map(|r| r.ok())
        .collect()
    }

    // ---- Pins ----

    pub fn pin_set(&self, message_id: i64, status: PinStatus) -> Result<(), AppError> {
        let conn = self.db.conn();
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE id = ?1",
                params![message_id],
                |r| r.get::<_, i64>(0),
            )
            .map(|c| c > 0)
            .unwrap_or(false);
        if !exists {
            return Err(AppError::Validation(format!("message not found: {message_id}")));
        }
        conn.execute(
            "INSERT INTO pins (message_id, status) VALUES (?1, ?2)
             ON CONFLICT(message_id) DO UPDATE SET status = excluded.status",
            params![message_id, status.as_str()],
        )?;
        drop(conn);
        self.events.publish(ChatEvent::TodoUpdate {
            message_id,
            status: Some(status),
        });
        Ok(())
    }

    pub fn pin_clear(&self, message_id: i64) -> Result<(), AppError> {
        let conn = self.db.conn();
        conn.execute("DELETE FROM pins WHERE message_id = ?1", params![message_id])?;
        drop(conn);
        self.events.publish(ChatEvent::TodoUpdate {
            message_id,
            status: None,
        });
        Ok(())
    }

    pub fn pins_list(&self) -> Vec<(i64, PinStatus)> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT message_id, status FROM pins ORDER BY message_id").unwrap();
        stmt.query_map([], |r| {
            let status: String = r.get(1)?;
            let status = if status == "done" { PinStatus::Done } else { PinStatus::Todo };
            Ok((r.get::<_, i64>(0)?, status))
        })
        .unwrap()
        .filter_map(|r| r.ok())
        .collect()
    }

    // ---- Decisions ----

    pub fn decision_add(&self, owner: &str, text: &str, reason: Option<&str>) -> Result<Decision, AppError> {
        if text.len() > 80 {
            return Err(AppError::Validation("decision text must be <= 80 chars".into()));
        }
        if let Some(r) = reason {
            if r.len() > 80 {
                return Err(AppError::Validation("decision reason must be <= 80 chars".into()));
            }
        }
        let conn = self.db.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM decisions", [], |r| r.get(0))?;
        if count >= DECISION_CAP {
            // §9 resolved: evict the oldest non-approved decision; refuse if none evictable.
            if crate::db::evict_oldest_proposed(&conn).is_none() {
                return Err(AppError::ResourceExhausted("decision cap reached; no evictable decision".into()));
            }
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO decisions (owner, text, reason, status, created_at) VALUES (?1, ?2, ?3, 'proposed', ?4)",
            params![owner, text, reason, now],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        let decision = Decision {
            id,
            owner: owner.to_string(),
            text: text.to_string(),
            reason: reason.map(String::from),
            status: DecisionStatus::Proposed,
            created_at: now,
        };
        self.events.publish(ChatEvent::Decision(decision.clone()));
        Ok(decision)
    }

    pub fn decision_set_status(&self, id: i64, status: DecisionStatus) -> Result<Decision, AppError> {
        let conn = self.db.conn();
        let status_str = match status {
            DecisionStatus::Proposed => "proposed",
            DecisionStatus::Approved => "approved",
        };
        let updated = conn.execute("UPDATE decisions SET status = ?1 WHERE id = ?2", params![status_str, id])?;
        if updated == 0 {
            return Err(AppError::Validation(format!("decision not found: {id}")));
        }
        let decision = self.decision_get(&conn, id)?;
        drop(conn);
        self.events.publish(ChatEvent::Decision(decision.clone()));
        Ok(decision)
    }

    pub fn decision_edit(&self, id: i64, text: Option<&str>, reason: Option<&str>) -> Result<Decision, AppError> {
        if let Some(t) = text {
            if t.len() > 80 {
                return Err(AppError::Validation("decision text must be <= 80 chars".into()));
            }
        }
        let conn = self.db.conn();
        if let Some(t) = text {
            conn.execute("UPDATE decisions SET text = ?1 WHERE id = ?2", params![t, id])?;
        }
        if let Some(r) = reason {
            conn.execute("UPDATE decisions SET reason = ?1 WHERE id = ?2", params![r, id])?;
        }
        let decision = self.decision_get(&conn, id)?;
        drop(conn);
        self.events.publish(ChatEvent::Decision(decision.clone()));
        Ok(decision)
    }

    pub fn decision_delete(&self, id: i64) -> Result<(), AppError> {
        let conn = self.db.conn();
        let updated = conn.execute("DELETE FROM decisions WHERE id = ?1", params![id])?;
        if updated == 0 {
            return Err(AppError::Validation(format!("decision not found: {id}")));
        }
        drop(conn);
        self.events.publish(ChatEvent::Decisions(self.decisions_list()));
        Ok(())
    }

    pub fn decisions_list(&self) -> Vec<Decision> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare("SELECT id, owner, text, reason, status, created_at FROM decisions ORDER BY id")
            .unwrap();
        stmt.query_map([], row_to_decision)
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    fn decision_get(&self, conn: &rusqlite::Connection, id: i64) -> Result<Decision, AppError> {
        conn.query_row(
            "SELECT id, owner, text, reason, status, created_at FROM decisions WHERE id = ?1",
            params![id],
            row_to_decision,
        )
        .map_err(|_| AppError::Validation(format!("decision not found: {id}")))
    }

    // ---- Settings ----

    pub fn setting_get(&self, key: &str) -> Option<serde_json::Value> {
        let conn = self.db.conn();
        conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |r| {
            r.get::<_, String>(0)
        })
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
    }

    pub fn setting_set(&self, key: &str, value: &serde_json::Value) -> Result<(), AppError> {
        let conn = self.db.conn();
        let serialized = serde_json::to_string(value).unwrap();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, serialized],
        )?;
        drop(conn);
        self.events.publish(ChatEvent::Settings {
            key: key.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    // ---- Read cursors (per-agent, per-channel; §4.7 MCP bridge) ----

    pub fn cursor_get(&self, agent: &str, channel: &str) -> i64 {
        let conn = self.db.conn();
        conn.query_row(
            "SELECT last_read_id FROM read_positions WHERE agent = ?1 AND channel = ?2",
            params![agent, channel],
            |r| r.get(0),
        )
        .unwrap_or(0)
    }

    pub fn cursor_set(&self, agent: &str, channel: &str, last_read_id: i64) {
        let conn = self.db.conn();
        let _ = conn.execute(
            "INSERT INTO read_positions (agent, channel, last_read_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(agent, channel) DO UPDATE SET last_read_id = excluded.last_read_id",
            params![agent, channel, last_read_id],
        );
    }

    pub fn cursor_reset(&self, agent: &str, channel: &str) {
        let conn = self.db.conn();
        let _ = conn.execute("DELETE FROM read_positions WHERE agent = ?1 AND channel = ?2", params![agent, channel]);
    }
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let attachments_json: Option<String> = row.get(8)?;
    let attachments = attachments_json.and_then(|s| serde_json::from_str(&s).ok());
    Ok(Message {
        id: row.get(0)?,
        channel: row.get(1)?,
        sender: row.get(2)?,
        sender_type: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
        display_time: row.get(6)?,
        reply_to: row.get(7)?,
        attachments,
        msg_type: row.get(9)?,
    })
}

fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
    let status: String = row.get(4)?;
    Ok(Decision {
        id: row.get(0)?,
        owner: row.get(1)?,
        text: row.get(2)?,
        reason: row.get(3)?,
        status: if status == "approved" {
            DecisionStatus::Approved
        } else {
            DecisionStatus::Proposed
        },
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::trigger_queue::TriggerWriter;

    fn store(dir: &std::path::Path) -> Store {
        let db = Db::new(dir.join("chat.db").to_str().unwrap());
        let events = Arc::new(EventBus::new());
        let writer = TriggerWriter::new(dir.to_path_buf());
        let router = Arc::new(Router::new(Config::default(), events.clone(), writer));
        Store::new(db, events, router)
    }

    #[test]
    fn append_ids_are_dense_and_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let mut last = 0;
        for i in 0..5 {
            let (msg, _) = s
                .append(
                    SendMessage {
                        sender: "user".into(),
                        text: format!("msg {i}"),
                        channel: None,
                        reply_to: None,
                        attachments: None,
                        sender_type: Some("human".into()),
                    },
                    "human",
                )
                .unwrap();
            assert!(msg.id > last);
            last = msg.id;
        }
    }

    #[test]
    fn delete_then_since_excludes_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let (m1, _) = s
            .append(
                SendMessage {
                    sender: "user".into(),
                    text: "first".into(),
                    channel: None,
                    reply_to: None,
                    attachments: None,
                    sender_type: Some("human".into()),
                },
                "human",
            )
            .unwrap();
        s.delete(&[m1.id], DEFAULT_CHANNEL).unwrap();
        let visible = s.since(0, None).unwrap();
        assert!(visible.iter().all(|m| m.id != m1.id));
    }

    #[test]
    fn channel_name_validator_boundaries() {
        assert!(channel_name_valid("a"));
        assert!(channel_name_valid("a1"));
        assert!(channel_name_valid("a-b"));
        assert!(!channel_name_valid("A"));
        assert!(!channel_name_valid("-a"));
        assert!(!channel_name_valid("a_b"));
        assert!(!channel_name_valid("a/b"));
        assert!(!channel_name_valid(&"a".repeat(21)));
    }

    #[test]
    fn decision_text_length_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let ok = "x".repeat(80);
        assert!(s.decision_add("user", &ok, None).is_ok());
        let too_long = "x".repeat(81);
        assert!(s.decision_add("user", &too_long, None).is_err());
    }

    #[test]
    fn pin_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let (msg, _) = s
            .append(
                SendMessage {
                    sender: "user".into(),
                    text: "pin me".into(),
                    channel: None,
                    reply_to: None,
                    attachments: None,
                    sender_type: Some("human".into()),
                },
                "human",
            )
            .unwrap();
        s.pin_set(msg.id, PinStatus::Todo).unwrap();
        assert_eq!(s.pins_list(), vec![(msg.id, PinStatus::Todo)]);
        s.pin_set(msg.id, PinStatus::Done).unwrap();
        assert_eq!(s.pins_list(), vec![(msg.id, PinStatus::Done)]);
        s.pin_clear(msg.id).unwrap();
        assert!(s.pins_list().is_empty());
    }

    #[test]
    fn channel_rename_round_trip_preserves_messages() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.channel_create("dev").unwrap();
        let (msg, _) = s
            .append(
                SendMessage {
                    sender: "user".into(),
                    text: "hi".into(),
                    channel: Some("dev".into()),
                    reply_to: None,
                    attachments: None,
                    sender_type: Some("human".into()),
                },
                "human",
            )
            .unwrap();
        s.channel_rename("dev", "devops").unwrap();
        s.channel_rename("devops", "dev").unwrap();
        let found = s.since(0, Some("dev")).unwrap();
        assert!(found.iter().any(|m| m.id == msg.id && m.channel == "dev"));
    }
}
