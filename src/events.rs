use crate::models::{Decision, Message, PinStatus, PresenceEntry};
use serde::Serialize;
use tokio::sync::broadcast;

/// Server-to-client event taxonomy (§4.5). `ChatEvent` is the in-process
/// fan-out payload; `ws.rs` serializes each variant into the wire envelope
/// (a JSON object carrying a `type` field) before writing it to a socket.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Message(Message),
    Delete { ids: Vec<i64>, channel: String },
    Clear { channel: String },
    Todos(Vec<(i64, PinStatus)>),
    TodoUpdate { message_id: i64, status: Option<PinStatus> },
    Decisions(Vec<Decision>),
    Decision(Decision),
    Status(PresenceEntry),
    Typing { sender: String, channel: String },
    Settings { key: String, value: serde_json::Value },
    Agents(Vec<PresenceEntry>),
    ChannelRenamed { old: String, new: String },
    ChannelCreated(crate::models::Channel),
    ChannelDeleted { name: String },
    LoopGuardPaused { channel: String },
}

#[derive(Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum WireEvent<'a> {
    Message(&'a Message),
    Delete { ids: &'a [i64], channel: &'a str },
    Clear { channel: &'a str },
    Todos { todos: Vec<TodoWire> },
    TodoUpdate {
        message_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<PinStatus>,
    },
    Decisions { decisions: &'a [Decision] },
    Decision(&'a Decision),
    Status(&'a PresenceEntry),
    Typing { sender: &'a str, channel: &'a str },
    Settings { key: &'a str, value: &'a serde_json::Value },
    Agents { agents: &'a [PresenceEntry] },
    ChannelRenamed { old: &'a str, new: &'a str },
    ChannelCreated { channel: &'a crate::models::Channel },
    ChannelDeleted { name: &'a str },
    System { text: String, channel: &'a str },
}

#[derive(Serialize)]
struct TodoWire {
    message_id: i64,
    status: PinStatus,
}

impl ChatEvent {
    /// Render this event as the JSON wire frame sent over `/ws`.
    pub fn to_wire_json(&self) -> serde_json::Value {
        let wire = match self {
            ChatEvent::Message(m) => WireEvent::Message(m),
            ChatEvent::Delete { ids, channel } => WireEvent::Delete { ids, channel },
            ChatEvent::Clear { channel } => WireEvent::Clear { channel },
            ChatEvent::Todos(todos) => WireEvent::Todos {
                todos: todos
                    .iter()
                    .map(|(id, status)| TodoWire {
                        message_id: *id,
                        status: *status,
                    })
                    .collect(),
            },
            ChatEvent::TodoUpdate { message_id, status } => WireEvent::TodoUpdate {
                message_id: *message_id,
                status: *status,
            },
            ChatEvent::Decisions(decisions) => WireEvent::Decisions { decisions },
            ChatEvent::Decision(d) => WireEvent::Decision(d),
            ChatEvent::Status(p) => WireEvent::Status(p),
            ChatEvent::Typing { sender, channel } => WireEvent::Typing { sender, channel },
            ChatEvent::Settings { key, value } => WireEvent::Settings { key, value },
            ChatEvent::Agents(agents) => WireEvent::Agents { agents },
            ChatEvent::ChannelRenamed { old, new } => WireEvent::ChannelRenamed { old, new },
            ChatEvent::ChannelCreated(c) => WireEvent::ChannelCreated { channel: c },
            ChatEvent::ChannelDeleted { name } => WireEvent::ChannelDeleted { name },
            ChatEvent::LoopGuardPaused { channel } => WireEvent::System {
                text: format!("Loop guard paused #{channel} — type /continue to resume"),
                channel,
            },
        };
        serde_json::to_value(wire).unwrap_or(serde_json::Value::Null)
    }

    /// Non-essential events may be coalesced/dropped for a slow client (§5
    /// Backpressure); `message` and `delete` must never be dropped.
    pub fn is_essential(&self) -> bool {
        matches!(self, ChatEvent::Message(_) | ChatEvent::Delete { .. })
    }
}

pub struct EventBus {
    pub sender: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender }
    }

    pub fn publish(&self, event: ChatEvent) {
        let _ = self.sender.send(event);
    }
}
