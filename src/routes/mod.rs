// Route module decomposition — each concern in its own file, grounded in
// the teacher's split (request guards and shared trackers live here; route
// functions live in submodules and are re-exported for `lib.rs`'s mount).

mod http;
mod mcp_http;
mod mcp_sse;
mod ws;

pub use http::{open_path, open_session, root, upload};
pub use mcp_http::*;
pub use mcp_sse::mcp_sse_stream;
pub use ws::ws_endpoint;

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Instant;

/// In-memory dedup: tracks last "typing" broadcast per (agent, channel) so a
/// busy agent doesn't spam the browser with one event per activity-watcher
/// tick (teacher's `TypingTracker` idiom, generalized from per-room senders
/// to per-agent busy transitions reported over the internal `agent_status`
/// control frame, §4.6 Activity watcher).
pub struct TypingTracker {
    last_typing: StdMutex<HashMap<(String, String), Instant>>,
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self {
            last_typing: StdMutex::new(HashMap::new()),
        }
    }
}

impl TypingTracker {
    pub fn should_emit(&self, agent: &str, channel: &str) -> bool {
        let mut map = self.last_typing.lock().unwrap();
        let key = (agent.to_string(), channel.to_string());
        let now = Instant::now();
        if let Some(last) = map.get(&key) {
            if now.duration_since(*last) < std::time::Duration::from_secs(3) {
                return false;
            }
        }
        map.insert(key, now);
        true
    }
}
