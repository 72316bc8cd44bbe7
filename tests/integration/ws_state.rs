// `/ws` is a long-lived duplex socket that `rocket::local::blocking::Client`
// can't drive end to end, so these exercise the same `Store` surface the
// socket's `dispatch()` delegates to (pins/todos, settings, channel
// lifecycle) plus the initial-state snapshot the socket replays on connect.

use crate::common::test_state;
use agentchat_hub::events::ChatEvent;
use agentchat_hub::models::{PinStatus, SendMessage};

#[test]
fn todo_pin_lifecycle_toggles_and_clears() {
    let env = test_state();
    let store = &env.state.store;

    let (msg, _) = store
        .append(
            SendMessage {
                sender: "user".into(),
                text: "ship the release".into(),
                channel: None,
                reply_to: None,
                attachments: None,
                sender_type: None,
            },
            "human",
        )
        .unwrap();

    store.pin_set(msg.id, PinStatus::Todo).unwrap();
    let pins = store.pins_list();
    assert_eq!(pins, vec![(msg.id, PinStatus::Todo)]);

    store.pin_set(msg.id, PinStatus::Done).unwrap();
    let pins = store.pins_list();
    assert_eq!(pins, vec![(msg.id, PinStatus::Done)]);

    store.pin_clear(msg.id).unwrap();
    assert!(store.pins_list().is_empty());
}

#[test]
fn settings_round_trip_through_store() {
    let env = test_state();
    let store = &env.state.store;

    assert!(store.setting_get("theme").is_none());
    store.setting_set("theme", &serde_json::json!("dark")).unwrap();
    assert_eq!(store.setting_get("theme"), Some(serde_json::json!("dark")));
}

#[test]
fn channel_create_rename_delete_is_reflected_in_listing() {
    let env = test_state();
    let store = &env.state.store;

    store.channel_create("ops").unwrap();
    let names: Vec<String> = store.channels_list().into_iter().map(|c| c.name).collect();
    assert!(names.contains(&"ops".to_string()));

    store.channel_rename("ops", "operations").unwrap();
    let names: Vec<String> = store.channels_list().into_iter().map(|c| c.name).collect();
    assert!(names.contains(&"operations".to_string()));
    assert!(!names.contains(&"ops".to_string()));

    store.channel_delete("operations").unwrap();
    let names: Vec<String> = store.channels_list().into_iter().map(|c| c.name).collect();
    assert!(!names.contains(&"operations".to_string()), "deleted channel is tombstoned out of the listing");
}

#[test]
fn decision_delete_publishes_refreshed_decisions_event() {
    let env = test_state();
    let store = &env.state.store;
    let mut rx = env.state.events.sender.subscribe();

    let id = store.decision_add("user", "adopt sqlite", None).unwrap().id;
    while let Ok(evt) = rx.try_recv() {
        let _ = evt;
    }

    store.decision_delete(id).unwrap();
    assert!(store.decisions_list().is_empty());

    let mut saw_empty_decisions = false;
    while let Ok(evt) = rx.try_recv() {
        if let ChatEvent::Decisions(decisions) = evt {
            saw_empty_decisions = decisions.is_empty();
        }
    }
    assert!(saw_empty_decisions, "decision_delete should publish a refreshed Decisions event");
}

#[test]
fn initial_state_snapshot_mirrors_what_ws_replays_on_connect() {
    let env = test_state();
    let store = &env.state.store;

    store
        .append(
            SendMessage {
                sender: "user".into(),
                text: "hello".into(),
                channel: None,
                reply_to: None,
                attachments: None,
                sender_type: None,
            },
            "human",
        )
        .unwrap();
    store.decision_add("user", "adopt sqlite", None).unwrap();

    let history = store.recent(None, 200).unwrap();
    let channels = store.channels_list();
    let decisions = store.decisions_list();

    assert_eq!(history.len(), 1);
    assert!(channels.iter().any(|c| c.name == "general"));
    assert_eq!(decisions.len(), 1);
}
