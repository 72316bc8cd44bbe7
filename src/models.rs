use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Channel {
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Attachment {
    pub path: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: i64,
    pub channel: String,
    pub sender: String,
    pub sender_type: String,
    pub text: String,
    pub created_at: i64,
    pub display_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(rename = "type")]
    pub msg_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub reply_to: Option<i64>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default)]
    pub sender_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameChannel {
    pub name: String,
}

// --- Pins ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinStatus {
    Todo,
    Done,
}

impl PinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinStatus::Todo => "todo",
            PinStatus::Done => "done",
        }
    }

    pub fn toggled(&self) -> PinStatus {
        match self {
            PinStatus::Todo => PinStatus::Done,
            PinStatus::Done => PinStatus::Todo,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Pin {
    pub message_id: i64,
    pub status: PinStatus,
}

// --- Decisions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Proposed,
    Approved,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Decision {
    pub id: i64,
    pub owner: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: DecisionStatus,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ProposeDecision {
    pub owner: String,
    pub text: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditDecision {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

// --- Presence ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PresenceEntry {
    pub agent: String,
    pub last_seen: i64,
    pub busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hat: Option<String>,
}

// --- Read positions / cursors ---

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ReadCursor {
    pub agent: String,
    pub channel: String,
    pub last_read_id: i64,
}

// --- Settings ---

#[derive(Debug, Deserialize)]
pub struct UpdateSettings {
    pub key: String,
    pub value: serde_json::Value,
}

// --- File attachments (upload endpoint) ---

#[derive(Debug, Deserialize)]
pub struct FileUpload {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub data: String, // base64-encoded
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileInfo {
    pub path: String,
    pub name: String,
    pub url: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

// --- MCP tool payloads ---

#[derive(Debug, Deserialize)]
pub struct ChatSendArgs {
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub reply_to: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReadArgs {
    pub sender: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResyncArgs {
    pub sender: String,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatJoinArgs {
    pub sender: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatWhoArgs {
    pub sender: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatDecisionArgs {
    pub sender: String,
    pub action: String, // propose | approve | unapprove | edit | delete | list
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatSetHatArgs {
    pub sender: String,
    pub hat: String,
}

/// Reported by the wrapper's activity watcher over MCP-HTTP on every
/// busy/idle transition (§4.6). Not part of the eight agent-facing tools —
/// internal control traffic from the supervisor process, not the agent.
#[derive(Debug, Deserialize)]
pub struct AgentStatusArgs {
    pub agent: String,
    pub busy: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Internal-only tool the wrapper supervisor uses to post `join`/`leave`/
/// `system` notices without going through `chat_send`'s agent-sender path
/// (§4.6: these are supervisor lifecycle events, not agent chat messages,
/// and must not consume a routing hop).
#[derive(Debug, Deserialize)]
pub struct SystemMessageArgs {
    pub text: String,
    pub msg_type: String,
    #[serde(default)]
    pub channel: Option<String>,
}

// --- WebSocket client->server envelope (§4.5, §6) ---

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Message(SendMessage),
    UpdateSettings(UpdateSettings),
    TodoAdd { message_id: i64 },
    TodoToggle { message_id: i64 },
    TodoRemove { message_id: i64 },
    Delete { ids: Vec<i64>, #[serde(default)] channel: Option<String> },
    DecisionPropose(ProposeDecision),
    DecisionApprove { id: i64 },
    DecisionUnapprove { id: i64 },
    DecisionEdit { id: i64, #[serde(flatten)] edit: EditDecision },
    DecisionDelete { id: i64 },
    ChannelCreate(CreateChannel),
    ChannelRename { old: String, new: String },
    ChannelDelete { name: String },
    /// Internal wrapper<->hub control frame (§2, §4.6): reports a busy
    /// transition detected by the activity watcher. Not part of the MCP
    /// tool surface — the wrapper is its own authenticated WS client.
    AgentStatus {
        agent: String,
        busy: bool,
        #[serde(default)]
        session_id: Option<String>,
    },
}

// --- Agent (static) config payload mirrored for the `agents` WS event ---

#[derive(Debug, Serialize, Clone)]
pub struct AgentSummary {
    pub name: String,
    pub label: String,
    pub color: String,
}
