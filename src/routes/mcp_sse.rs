//! MCP-over-SSE transport (§4.7, §6): a standing event stream the health
//! watcher's SSE probe keeps open to detect hub liveness independently of
//! the HTTP probe (§4.6 — the two probes keep separate consecutive-failure
//! counters, `mcp.sse_kill_threshold` vs `mcp.http_kill_threshold`). Carries
//! the same broadcast events a browser WS client sees, reusing
//! [`crate::events::EventBus`] rather than inventing a second fan-out path.

use crate::auth::Authenticated;
use crate::events::EventBus;
use rocket::response::stream::{Event, EventStream};
use rocket::{get, Shutdown, State};
use std::time::Duration;

#[get("/stream")]
pub fn mcp_sse_stream(_auth: Authenticated, events: &State<std::sync::Arc<EventBus>>, mut shutdown: Shutdown) -> EventStream![] {
    let mut rx = events.sender.subscribe();
    EventStream! {
        yield Event::data("ready").event("ready");
        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));
        heartbeat.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = heartbeat.tick() => {
                    yield Event::data("").event("heartbeat");
                }
                msg = rx.recv() => {
                    match msg {
                        Ok(event) => {
                            let payload = event.to_wire_json().to_string();
                            yield Event::data(payload).event("chat");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}
