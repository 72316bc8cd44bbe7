pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod mcp;
pub mod models;
pub mod presence;
pub mod router;
pub mod routes;
pub mod store;
pub mod trigger_queue;
pub mod wrapper;

use auth::SessionToken;
use config::Config;
use events::EventBus;
use mcp::McpContext;
use presence::PresenceTracker;
use rocket_cors::CorsOptions;
use routes::TypingTracker;
use std::sync::Arc;
use store::Store;

/// Everything the three Rocket instances share, built once in `bin/hub.rs`
/// and handed to each builder below. Mirrors the teacher's single
/// `build_rocket(db_path, rate_limit_config)` entry point, split three ways
/// because this spec runs three independently-bindable listeners (§6)
/// instead of one.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub presence: Arc<PresenceTracker>,
    pub events: Arc<EventBus>,
    pub token: SessionToken,
    pub typing: Arc<TypingTracker>,
}

/// JSON limit bump mirrors the teacher's figment override: base64-encoded
/// uploads inflate ~33%, so the 5MB cap in `routes::http` needs headroom.
fn json_limit_figment(host: &str, port: u16) -> rocket::figment::Figment {
    rocket::Config::figment()
        .merge(("address", host))
        .merge(("port", port))
        .merge(("limits.json", 10 * 1024 * 1024))
}

/// The main chat surface: `/`, `/ws`, `/api/upload`, `/api/open-path`,
/// `/api/open-session/<agent>` (§4.5, §6 `server.port`, default 8300).
pub fn hub_rocket(state: &AppState) -> rocket::Rocket<rocket::Build> {
    let cors = CorsOptions::default().to_cors().expect("failed to build CORS fairing");
    rocket::custom(json_limit_figment(&state.config.server.host, state.config.server.port))
        .manage(state.config.clone())
        .manage(state.store.clone())
        .manage(state.presence.clone())
        .manage(state.events.clone())
        .manage(state.token.clone())
        .manage(state.typing.clone())
        .attach(cors)
        .mount(
            "/",
            rocket::routes![
                routes::root,
                routes::upload,
                routes::open_path,
                routes::open_session,
                routes::ws_endpoint,
            ],
        )
}

/// The MCP-over-HTTP tool bridge (§4.7, §6 `mcp.http_port`, default 8200).
pub fn mcp_http_rocket(state: &AppState) -> rocket::Rocket<rocket::Build> {
    let ctx = McpContext {
        store: state.store.clone(),
        presence: state.presence.clone(),
        events: state.events.clone(),
    };
    rocket::custom(json_limit_figment(&state.config.server.host, state.config.mcp.http_port))
        .manage(ctx)
        .manage(state.token.clone())
        .mount(
            "/",
            rocket::routes![
                routes::chat_send,
                routes::chat_read,
                routes::chat_resync,
                routes::chat_join,
                routes::chat_who,
                routes::chat_decision,
                routes::chat_channels,
                routes::chat_set_hat,
                routes::agent_status,
                routes::system_message,
                routes::health,
            ],
        )
}

/// The MCP-over-SSE tool bridge (§4.7, §6 `mcp.sse_port`, default 8201) —
/// kept as a separate listener so its health-watcher failure counter is
/// independent of the HTTP bridge's (§4.6).
pub fn mcp_sse_rocket(state: &AppState) -> rocket::Rocket<rocket::Build> {
    rocket::custom(json_limit_figment(&state.config.server.host, state.config.mcp.sse_port))
        .manage(state.events.clone())
        .manage(state.token.clone())
        .mount("/", rocket::routes![routes::mcp_sse_stream])
}
