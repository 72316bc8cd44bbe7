use agentchat_hub::auth::SessionToken;
use agentchat_hub::config::{AgentConfig, Config};
use agentchat_hub::db::Db;
use agentchat_hub::events::EventBus;
use agentchat_hub::presence::PresenceTracker;
use agentchat_hub::router::Router;
use agentchat_hub::routes::TypingTracker;
use agentchat_hub::store::Store;
use agentchat_hub::trigger_queue::TriggerWriter;
use agentchat_hub::{hub_rocket, mcp_http_rocket, AppState};
use rocket::local::blocking::Client;
use std::sync::Arc;

pub const TEST_TOKEN: &str = "test-session-token";

/// Holds the tempdir alive for the test's duration — dropping it cleans up
/// the SQLite file and any uploads/trigger-queue files a test wrote.
pub struct TestEnv {
    pub _dir: tempfile::TempDir,
    pub state: AppState,
}

pub fn test_state() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.agents.insert(
        "claude".to_string(),
        AgentConfig {
            command: "true".into(),
            cwd: None,
            color: "#d97757".into(),
            label: Some("Claude".into()),
            resume_flag: None,
        },
    );
    config.data_dir = dir.path().to_string_lossy().to_string();

    let db = Db::new(dir.path().join("chat.db").to_str().unwrap());
    let events = Arc::new(EventBus::new());
    let writer = TriggerWriter::new(dir.path().to_path_buf());
    let router = Arc::new(Router::new(config.clone(), events.clone(), writer));
    let store = Arc::new(Store::new(db, events.clone(), router));
    let presence = Arc::new(PresenceTracker::default());

    let state = AppState {
        config: Arc::new(config),
        store,
        presence,
        events,
        token: SessionToken(TEST_TOKEN.to_string()),
        typing: Arc::new(TypingTracker::default()),
    };

    TestEnv { _dir: dir, state }
}

pub fn hub_client(env: &TestEnv) -> Client {
    Client::tracked(hub_rocket(&env.state)).expect("valid hub rocket instance")
}

pub fn mcp_client(env: &TestEnv) -> Client {
    Client::tracked(mcp_http_rocket(&env.state)).expect("valid mcp rocket instance")
}
