use crate::common::{hub_client, test_state, TEST_TOKEN};
use rocket::http::Status;

#[test]
fn root_without_token_is_forbidden_free_but_upload_requires_it() {
    let env = test_state();
    let client = hub_client(&env);

    // GET / serves the placeholder page unauthenticated (static-asset-style route).
    let res = client.get("/").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body = res.into_string().unwrap();
    assert!(body.contains(TEST_TOKEN));
}

#[test]
fn upload_without_token_is_forbidden() {
    let env = test_state();
    let client = hub_client(&env);

    let res = client
        .post("/api/upload")
        .header(rocket::http::ContentType::JSON)
        .body(r#"{"filename":"a.png","data":"aGVsbG8="}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn upload_with_mismatched_token_is_forbidden() {
    let env = test_state();
    let client = hub_client(&env);

    let res = client
        .post("/api/upload?token=wrong")
        .header(rocket::http::ContentType::JSON)
        .body(r#"{"filename":"a.png","data":"aGVsbG8="}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn upload_with_correct_token_succeeds() {
    let env = test_state();
    let client = hub_client(&env);

    let res = client
        .post(format!("/api/upload?token={TEST_TOKEN}"))
        .header(rocket::http::ContentType::JSON)
        .body(r#"{"filename":"a.png","data":"aGVsbG8="}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["name"], "a.png");
    assert!(body["url"].as_str().unwrap().starts_with("/uploads/"));
}

#[test]
fn header_token_is_also_accepted() {
    let env = test_state();
    let client = hub_client(&env);

    let res = client
        .post("/api/upload")
        .header(rocket::http::ContentType::JSON)
        .header(rocket::http::Header::new("X-Session-Token", TEST_TOKEN))
        .body(r#"{"filename":"b.png","data":"aGVsbG8="}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}
