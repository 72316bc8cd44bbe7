//! The chat WebSocket endpoint (§4.1, §4.5). Browsers and wrapper
//! supervisors share one socket type: on connect the server replays recent
//! state, then the socket becomes a duplex channel — client frames mutate
//! the [`crate::store::Store`], server events come from the
//! [`crate::events::EventBus`] broadcast. Grounded in the teacher's
//! `ws.channel` handler, generalized from a single outbound broadcast
//! forward to the two-way `ClientFrame` dispatch this spec needs.

use crate::auth::{origin_allowed, Authenticated};
use crate::db::DEFAULT_CHANNEL;
use crate::error::AppError;
use crate::events::{ChatEvent, EventBus};
use crate::models::ClientFrame;
use crate::presence::PresenceTracker;
use crate::store::Store;
use futures_util::{SinkExt, StreamExt};
use rocket::{get, Request, State};
use rocket_ws::{Message as WsMessage, WebSocket};
use std::sync::Arc;

use super::TypingTracker;

/// Generic "the agent is doing something" channel key. The internal
/// `agent_status` control frame (set by the wrapper's activity watcher)
/// doesn't carry a channel — busyness is process-wide, not per-room — so the
/// dedup/typing indicator is keyed on the agent alone.
const ACTIVITY_CHANNEL: &str = "*";

/// Request guard gating the WS handshake itself.
///
/// Known, accepted deviation from §4.5/§7's literal wording ("a WebSocket
/// whose token is rejected closes with code 4003"): this rejects the
/// handshake with HTTP 403 before any socket opens, rather than accepting
/// the upgrade and immediately closing with 4003. See DESIGN.md's Open
/// Questions entry 5 for the rationale (the token is a flat file loaded once
/// at startup, so the only rejection case is "never authenticated", which a
/// failed handshake conveys without asking a client to notice a frame-level
/// close code).
pub struct WsAuth;

#[rocket::async_trait]
impl<'r> rocket::request::FromRequest<'r> for WsAuth {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> rocket::request::Outcome<Self, Self::Error> {
        if !origin_allowed(req.headers().get_one("Origin")) {
            return rocket::request::Outcome::Error((
                rocket::http::Status::Forbidden,
                AppError::Auth("origin not allowed".into()),
            ));
        }
        match <Authenticated as rocket::request::FromRequest>::from_request(req).await {
            rocket::request::Outcome::Success(_) => rocket::request::Outcome::Success(WsAuth),
            rocket::request::Outcome::Error(e) => rocket::request::Outcome::Error(e),
            rocket::request::Outcome::Forward(f) => rocket::request::Outcome::Forward(f),
        }
    }
}

#[get("/ws")]
pub fn ws_endpoint(
    _auth: WsAuth,
    ws: WebSocket,
    store: &State<Arc<Store>>,
    presence: &State<Arc<PresenceTracker>>,
    events: &State<Arc<EventBus>>,
    typing: &State<Arc<TypingTracker>>,
) -> rocket_ws::Channel<'static> {
    let store = (*store).clone();
    let presence = (*presence).clone();
    let events = (*events).clone();
    let typing = (*typing).clone();

    ws.channel(move |stream| {
        Box::pin(async move {
            let (mut sink, mut source) = stream.split();
            let mut rx = events.sender.subscribe();

            if let Err(e) = send_initial_state(&mut sink, &store, &presence).await {
                tracing::warn!(error = %e, "ws: failed sending initial state");
                return Ok(());
            }

            loop {
                tokio::select! {
                    incoming = source.next() => {
                        match incoming {
                            Some(Ok(WsMessage::Text(text))) => {
                                handle_client_frame(&text, &store, &presence, &typing, &events).await;
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "ws: read error");
                                break;
                            }
                        }
                    }
                    broadcast = rx.recv() => {
                        match broadcast {
                            Ok(event) => {
                                let payload = event.to_wire_json().to_string();
                                // §5 Backpressure: never drop message/delete; a
                                // send failure here means the socket write
                                // buffer is backed up, so drop non-essential
                                // frames rather than block the whole server.
                                if sink.send(WsMessage::Text(payload)).await.is_err() && event.is_essential() {
                                    break;
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
            Ok(())
        })
    })
}

async fn send_initial_state(
    sink: &mut (impl futures_util::Sink<WsMessage, Error = rocket_ws::result::Error> + Unpin),
    store: &Store,
    presence: &PresenceTracker,
) -> Result<(), rocket_ws::result::Error> {
    let history = store.recent(None, 200).unwrap_or_default();
    let channels = store.channels_list();
    let decisions = store.decisions_list();
    let pins = store.pins_list();
    let agents = presence.all().await;

    let frames = [
        serde_json::json!({ "type": "history", "messages": history }),
        serde_json::json!({ "type": "channels", "channels": channels }),
        serde_json::json!({ "type": "decisions", "decisions": decisions }),
        serde_json::json!({ "type": "todos", "todos": pins.into_iter().map(|(id, status)| {
            serde_json::json!({ "message_id": id, "status": status })
        }).collect::<Vec<_>>() }),
        serde_json::json!({ "type": "agents", "agents": agents }),
    ];
    for frame in frames {
        sink.send(WsMessage::Text(frame.to_string())).await?;
    }
    Ok(())
}

async fn handle_client_frame(
    text: &str,
    store: &Store,
    presence: &PresenceTracker,
    typing: &TypingTracker,
    events: &EventBus,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(error = %e, "ws: malformed client frame");
            return;
        }
    };

    let result = dispatch(frame, store, presence, typing, events).await;
    if let Err(e) = result {
        tracing::warn!(error = %e, "ws: client frame rejected");
    }
}

async fn dispatch(
    frame: ClientFrame,
    store: &Store,
    presence: &PresenceTracker,
    typing: &TypingTracker,
    events: &EventBus,
) -> Result<(), AppError> {
    use crate::models::PinStatus;

    match frame {
        ClientFrame::Message(mut send) => {
            if send.sender_type.is_none() {
                send.sender_type = Some("human".into());
            }
            let sender_type = send.sender_type.clone().unwrap();
            store.append(send, &sender_type)?;
        }
        ClientFrame::UpdateSettings(s) => {
            store.setting_set(&s.key, &s.value)?;
        }
        ClientFrame::TodoAdd { message_id } => {
            store.pin_set(message_id, PinStatus::Todo)?;
        }
        ClientFrame::TodoToggle { message_id } => {
            let current = store.pins_list().into_iter().find(|(id, _)| *id == message_id);
            let next = match current {
                Some((_, status)) => status.toggled(),
                None => PinStatus::Todo,
            };
            store.pin_set(message_id, next)?;
        }
        ClientFrame::TodoRemove { message_id } => {
            store.pin_clear(message_id)?;
        }
        ClientFrame::Delete { ids, channel } => {
            store.delete(&ids, channel.as_deref().unwrap_or(DEFAULT_CHANNEL))?;
        }
        ClientFrame::DecisionPropose(args) => {
            store.decision_add(&args.owner, &args.text, args.reason.as_deref())?;
        }
        ClientFrame::DecisionApprove { id } => {
            store.decision_set_status(id, crate::models::DecisionStatus::Approved)?;
        }
        ClientFrame::DecisionUnapprove { id } => {
            store.decision_set_status(id, crate::models::DecisionStatus::Proposed)?;
        }
        ClientFrame::DecisionEdit { id, edit } => {
            store.decision_edit(id, edit.text.as_deref(), edit.reason.as_deref())?;
        }
        ClientFrame::DecisionDelete { id } => {
            store.decision_delete(id)?;
        }
        ClientFrame::ChannelCreate(args) => {
            store.channel_create(&args.name)?;
        }
        ClientFrame::ChannelRename { old, new } => {
            store.channel_rename(&old, &new)?;
        }
        ClientFrame::ChannelDelete { name } => {
            store.channel_delete(&name)?;
        }
        ClientFrame::AgentStatus { agent, busy, session_id } => {
            presence.set_busy(&agent, busy, session_id).await;
            if busy && typing.should_emit(&agent, ACTIVITY_CHANNEL) {
                events.publish(ChatEvent::Typing {
                    sender: agent,
                    channel: ACTIVITY_CHANNEL.to_string(),
                });
            }
        }
    }
    Ok(())
}
