use crate::common::{auth_header, register_identity, test_client};
use rocket::http::{ContentType, Status};

#[test]
fn send_ack_and_reply_round_trip() {
    let client = test_client();
    let alice = register_identity(&client, "mailalice", false);
    let bob = register_identity(&client, "mailbob", false);

    let res = client
        .post("/api/mailboxes/mailbob/messages")
        .header(ContentType::JSON)
        .header(auth_header(&alice))
        .body(r#"{"title": "status check", "body": "how's it going?"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let message: serde_json::Value = res.into_json().unwrap();
    let id = message["id"].as_i64().unwrap();
    assert_eq!(message["status"], "unread");

    let res = client.get("/api/mailboxes/me/messages").header(auth_header(&bob)).dispatch();
    let page: serde_json::Value = res.into_json().unwrap();
    assert_eq!(page["total"], 1);

    let res = client.post(format!("/api/mailboxes/me/messages/{id}/ack")).header(auth_header(&bob)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .post(format!("/api/mailboxes/me/messages/{id}/reply"))
        .header(ContentType::JSON)
        .header(auth_header(&bob))
        .body(r#"{"body": "all good, thanks"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let reply: serde_json::Value = res.into_json().unwrap();
    assert_eq!(reply["recipient"], "mailalice");
    assert_eq!(reply["title"], "Re: status check");
    assert_eq!(reply["thread_id"], id.to_string());
}

#[test]
fn duplicate_dedupe_key_is_idempotent() {
    let client = test_client();
    let bob = register_identity(&client, "dedupebob", false);
    let alice_token = register_identity(&client, "dedupealice", false);

    let res = client
        .post("/api/mailboxes/dedupebob/messages")
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(r#"{"title": "reminder", "body": "ping", "dedupe_key": "daily-ping"}"#)
        .dispatch();
    let first: serde_json::Value = res.into_json().unwrap();

    let res = client
        .post("/api/mailboxes/dedupebob/messages")
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(r#"{"title": "reminder", "body": "ping again", "dedupe_key": "daily-ping"}"#)
        .dispatch();
    let second: serde_json::Value = res.into_json().unwrap();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["body"], "ping");

    let res = client.get("/api/mailboxes/me/messages").header(auth_header(&bob)).dispatch();
    let page: serde_json::Value = res.into_json().unwrap();
    assert_eq!(page["total"], 1);
}

#[test]
fn pending_mark_and_clear_round_trip() {
    let client = test_client();
    let alice = register_identity(&client, "pendalice", false);
    let bob = register_identity(&client, "pendbob", false);

    let res = client
        .post("/api/mailboxes/pendbob/messages")
        .header(ContentType::JSON)
        .header(auth_header(&alice))
        .body(r#"{"title": "need input", "body": "can you review?"}"#)
        .dispatch();
    let message: serde_json::Value = res.into_json().unwrap();
    let id = message["id"].as_i64().unwrap();

    let res = client.post(format!("/api/mailboxes/me/messages/{id}/pending")).header(auth_header(&bob)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.delete(format!("/api/mailboxes/me/messages/{id}/pending")).header(auth_header(&bob)).dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn ack_unknown_message_is_not_found() {
    let client = test_client();
    let bob = register_identity(&client, "unknownbob", false);
    let res = client.post("/api/mailboxes/me/messages/999999/ack").header(auth_header(&bob)).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}
