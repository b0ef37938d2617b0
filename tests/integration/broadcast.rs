use crate::common::{auth_header, register_identity, test_client};
use rocket::http::{ContentType, Status};

#[test]
fn ingest_creates_event_and_second_identical_post_is_suppressed() {
    let client = test_client();
    let token = register_identity(&client, "opsbot", true);

    let res = client
        .post("/api/broadcast/webhooks")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"app_name": "ci", "title": "build failed"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let webhook: serde_json::Value = res.into_json().unwrap();
    let app_name = webhook["app_name"].as_str().unwrap();
    let capability_token = webhook["token"].as_str().unwrap();

    let res = client
        .post(format!("/api/ingest/{app_name}/{capability_token}"))
        .header(ContentType::Plain)
        .body("nightly job failed on runner 7")
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let first: serde_json::Value = res.into_json().unwrap();
    assert_eq!(first["ok"], true);
    assert_eq!(first["suppressed"], false);

    let res = client
        .post(format!("/api/ingest/{app_name}/{capability_token}"))
        .header(ContentType::Plain)
        .body("nightly job failed on runner 7")
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let second: serde_json::Value = res.into_json().unwrap();
    assert_eq!(second["suppressed"], true);
    assert_eq!(second["event_id"], first["event_id"]);
}

#[test]
fn ingest_rejects_unknown_capability() {
    let client = test_client();
    let res = client.post("/api/ingest/ci/not-a-real-token").header(ContentType::Plain).body("hi").dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn json_ingest_is_kept_structured() {
    let client = test_client();
    let token = register_identity(&client, "opsbot2", true);

    let res = client
        .post("/api/broadcast/webhooks")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"app_name": "deploys", "title": "deploy finished"}"#)
        .dispatch();
    let webhook: serde_json::Value = res.into_json().unwrap();
    let app_name = webhook["app_name"].as_str().unwrap();
    let capability_token = webhook["token"].as_str().unwrap();

    let res = client
        .post(format!("/api/ingest/{app_name}/{capability_token}"))
        .header(ContentType::JSON)
        .body(r#"{"title": "release 1.2.3 shipped", "commit": "abc123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .get(format!("/api/broadcast/events?app_name={app_name}"))
        .header(auth_header(&token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let events: serde_json::Value = res.into_json().unwrap();
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["title"], "release 1.2.3 shipped");
    assert_eq!(events[0]["body_json"]["commit"], "abc123");
}

#[test]
fn only_admin_can_update_or_delete_webhooks() {
    let client = test_client();
    let admin_token = register_identity(&client, "opsadmin", true);
    let member_token = register_identity(&client, "opsmember", false);

    let res = client
        .post("/api/broadcast/webhooks")
        .header(ContentType::JSON)
        .header(auth_header(&admin_token))
        .body(r#"{"app_name": "billing", "title": "billing alert"}"#)
        .dispatch();
    let webhook: serde_json::Value = res.into_json().unwrap();
    let id = webhook["id"].as_str().unwrap();

    let res = client
        .patch(format!("/api/broadcast/webhooks/{id}"))
        .header(ContentType::JSON)
        .header(auth_header(&member_token))
        .body(r#"{"enabled": false}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .delete(format!("/api/broadcast/webhooks/{id}"))
        .header(auth_header(&member_token))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .patch(format!("/api/broadcast/webhooks/{id}"))
        .header(ContentType::JSON)
        .header(auth_header(&admin_token))
        .body(r#"{"enabled": false}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}
