use crate::common::{mcp_client, test_state, TEST_TOKEN};
use rocket::http::{ContentType, Status};

fn post(client: &rocket::local::blocking::Client, path: &str, body: serde_json::Value) -> serde_json::Value {
    let res = client
        .post(format!("{path}?token={TEST_TOKEN}"))
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "unexpected status for {path}");
    res.into_json().unwrap()
}

#[test]
fn chat_send_then_chat_read_advances_cursor() {
    let env = test_state();
    let client = mcp_client(&env);

    let sent = post(
        &client,
        "/tools/chat_send",
        serde_json::json!({ "sender": "claude", "text": "hello from claude" }),
    );
    assert_eq!(sent["sender"], "claude");
    assert_eq!(sent["type"], "message");

    let first = post(
        &client,
        "/tools/chat_read",
        serde_json::json!({ "sender": "codex" }),
    );
    assert_eq!(first.as_array().unwrap().len(), 1);

    let second = post(
        &client,
        "/tools/chat_read",
        serde_json::json!({ "sender": "codex" }),
    );
    assert!(second.as_array().unwrap().is_empty());

    post(
        &client,
        "/tools/chat_resync",
        serde_json::json!({ "sender": "codex" }),
    );
    let third = post(
        &client,
        "/tools/chat_read",
        serde_json::json!({ "sender": "codex" }),
    );
    assert_eq!(third.as_array().unwrap().len(), 1);
}

#[test]
fn chat_decision_propose_and_approve_lifecycle() {
    let env = test_state();
    let client = mcp_client(&env);

    let decisions = post(
        &client,
        "/tools/chat_decision",
        serde_json::json!({ "sender": "user", "action": "propose", "text": "use sqlite" }),
    );
    let decisions = decisions.as_array().unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0]["status"], "proposed");
    let id = decisions[0]["id"].as_i64().unwrap();

    let decisions = post(
        &client,
        "/tools/chat_decision",
        serde_json::json!({ "sender": "user", "action": "approve", "id": id }),
    );
    assert_eq!(decisions.as_array().unwrap()[0]["status"], "approved");
}

#[test]
fn chat_decision_text_over_80_chars_is_rejected() {
    let env = test_state();
    let client = mcp_client(&env);

    let res = client
        .post(format!("/tools/chat_decision?token={TEST_TOKEN}"))
        .header(ContentType::JSON)
        .body(serde_json::json!({ "sender": "user", "action": "propose", "text": "x".repeat(81) }).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn chat_channels_lists_default_general() {
    let env = test_state();
    let client = mcp_client(&env);

    let res = client
        .get(format!("/tools/chat_channels?sender=claude&token={TEST_TOKEN}"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let channels: serde_json::Value = res.into_json().unwrap();
    let names: Vec<String> = channels
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"general".to_string()));
}

#[test]
fn system_message_posts_as_system_without_touching_router() {
    let env = test_state();
    let client = mcp_client(&env);

    post(
        &client,
        "/tools/system_message",
        serde_json::json!({ "text": "claude left", "msg_type": "leave" }),
    );

    let history = env.state.store.recent(None, 10).unwrap();
    let posted = history.iter().find(|m| m.text == "claude left").expect("system_message should land in history");
    assert_eq!(posted.sender, "system");
    assert_eq!(posted.sender_type, "system");
    assert_eq!(posted.msg_type, "leave");
}

#[test]
fn chat_channels_accepts_url_encoded_sender() {
    let env = test_state();
    let client = mcp_client(&env);

    let sender = urlencoding::encode("claude the 1st");
    let res = client
        .get(format!("/tools/chat_channels?sender={sender}&token={TEST_TOKEN}"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn chat_who_reports_presence_after_join() {
    let env = test_state();
    let client = mcp_client(&env);

    post(&client, "/tools/chat_join", serde_json::json!({ "sender": "claude" }));
    let who = post(&client, "/tools/chat_who", serde_json::json!({ "sender": "claude" }));
    let names: Vec<String> = who
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["agent"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"claude".to_string()));
}

#[test]
fn tools_reject_missing_token() {
    let env = test_state();
    let client = mcp_client(&env);
    let res = client
        .post("/tools/chat_send")
        .header(ContentType::JSON)
        .body(serde_json::json!({ "sender": "claude", "text": "hi" }).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}
