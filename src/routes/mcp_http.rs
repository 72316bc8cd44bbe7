//! MCP-over-HTTP transport (§4.7, §6): one `/tools/<name>` route per
//! [`crate::mcp::McpContext`] method, plus `/health` for the HTTP
//! health-watcher probe (§4.6, independent failure counter from the SSE
//! probe on `mcp.sse_port`). Mirrors the teacher's thin route-per-handler
//! style; all the logic lives in `mcp.rs`.

use crate::auth::Authenticated;
use crate::error::AppError;
use crate::mcp::McpContext;
use crate::models::*;
use rocket::serde::json::Json;
use rocket::{get, post, State};

#[post("/tools/chat_send", format = "json", data = "<args>")]
pub async fn chat_send(_auth: Authenticated, ctx: &State<McpContext>, args: Json<ChatSendArgs>) -> Result<Json<Message>, AppError> {
    Ok(Json(ctx.chat_send(args.into_inner()).await?))
}

#[post("/tools/chat_read", format = "json", data = "<args>")]
pub async fn chat_read(_auth: Authenticated, ctx: &State<McpContext>, args: Json<ChatReadArgs>) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(ctx.chat_read(args.into_inner()).await?))
}

#[post("/tools/chat_resync", format = "json", data = "<args>")]
pub async fn chat_resync(_auth: Authenticated, ctx: &State<McpContext>, args: Json<ChatResyncArgs>) -> Result<Json<serde_json::Value>, AppError> {
    ctx.chat_resync(args.into_inner()).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[post("/tools/chat_join", format = "json", data = "<args>")]
pub async fn chat_join(_auth: Authenticated, ctx: &State<McpContext>, args: Json<ChatJoinArgs>) -> Result<Json<PresenceEntry>, AppError> {
    Ok(Json(ctx.chat_join(args.into_inner()).await?))
}

#[post("/tools/chat_who", format = "json", data = "<args>")]
pub async fn chat_who(_auth: Authenticated, ctx: &State<McpContext>, args: Json<ChatWhoArgs>) -> Result<Json<Vec<PresenceEntry>>, AppError> {
    Ok(Json(ctx.chat_who(args.into_inner()).await?))
}

#[post("/tools/chat_decision", format = "json", data = "<args>")]
pub async fn chat_decision(_auth: Authenticated, ctx: &State<McpContext>, args: Json<ChatDecisionArgs>) -> Result<Json<Vec<Decision>>, AppError> {
    Ok(Json(ctx.chat_decision(args.into_inner()).await?))
}

#[get("/tools/chat_channels?<sender>")]
pub async fn chat_channels(_auth: Authenticated, ctx: &State<McpContext>, sender: &str) -> Result<Json<Vec<Channel>>, AppError> {
    Ok(Json(ctx.chat_channels(sender).await?))
}

#[post("/tools/chat_set_hat", format = "json", data = "<args>")]
pub async fn chat_set_hat(_auth: Authenticated, ctx: &State<McpContext>, args: Json<ChatSetHatArgs>) -> Result<Json<serde_json::Value>, AppError> {
    ctx.chat_set_hat(args.into_inner()).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[post("/tools/agent_status", format = "json", data = "<args>")]
pub async fn agent_status(_auth: Authenticated, ctx: &State<McpContext>, args: Json<AgentStatusArgs>) -> Result<Json<serde_json::Value>, AppError> {
    ctx.report_status(args.into_inner()).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Internal tool used only by the wrapper supervisor's `shutdown`/
/// `kill_unresponsive` paths (§4.6) — not part of the eight agent-facing
/// MCP tools, just authenticated the same way.
#[post("/tools/system_message", format = "json", data = "<args>")]
pub async fn system_message(_auth: Authenticated, ctx: &State<McpContext>, args: Json<SystemMessageArgs>) -> Result<Json<serde_json::Value>, AppError> {
    ctx.system_message(args.into_inner()).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Unauthenticated on purpose: the health watcher's HTTP probe (§4.6) needs
/// to distinguish "hub is down" from "hub is up but token rotated", and a
/// 403 from a missing/garbled token would otherwise read as the former.
#[get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
