use crate::common::{hub_client, test_state, TEST_TOKEN};
use rocket::http::{ContentType, Status};

fn b64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[test]
fn upload_writes_under_configured_data_dir() {
    let env = test_state();
    let client = hub_client(&env);

    let data = b64(b"some file contents");
    let res = client
        .post(format!("/api/upload?token={TEST_TOKEN}"))
        .header(ContentType::JSON)
        .body(serde_json::json!({ "filename": "note.txt", "data": data }).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();

    let stored_path = body["path"].as_str().unwrap();
    assert!(
        stored_path.starts_with(&env.state.config.data_dir),
        "upload should land under the configured data_dir, got {stored_path}"
    );
    assert!(std::path::Path::new(stored_path).exists());
}

#[test]
fn upload_rejects_file_over_5mb() {
    let env = test_state();
    let client = hub_client(&env);

    let oversized = vec![0u8; 5 * 1024 * 1024 + 1];
    let data = b64(&oversized);
    let res = client
        .post(format!("/api/upload?token={TEST_TOKEN}"))
        .header(ContentType::JSON)
        .body(serde_json::json!({ "filename": "big.bin", "data": data }).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn upload_sanitizes_path_traversal_in_filename() {
    let env = test_state();
    let client = hub_client(&env);

    let data = b64(b"x");
    let res = client
        .post(format!("/api/upload?token={TEST_TOKEN}"))
        .header(ContentType::JSON)
        .body(serde_json::json!({ "filename": "../../etc/passwd", "data": data }).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let url = body["url"].as_str().unwrap();
    assert!(!url.contains(".."));
    assert!(url.starts_with("/uploads/"));
}

#[test]
fn upload_rejects_invalid_base64() {
    let env = test_state();
    let client = hub_client(&env);

    let res = client
        .post(format!("/api/upload?token={TEST_TOKEN}"))
        .header(ContentType::JSON)
        .body(serde_json::json!({ "filename": "a.bin", "data": "not valid base64!!" }).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}
