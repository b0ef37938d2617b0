use crate::common::{auth_header, register_identity, test_client};
use rocket::http::{ContentType, Status};

#[test]
fn dm_channel_is_deterministic_for_a_pair() {
    let client = test_client();
    let alice = register_identity(&client, "alice", false);
    let bob = register_identity(&client, "bob", false);

    let res = client
        .post("/api/chat/channels")
        .header(ContentType::JSON)
        .header(auth_header(&alice))
        .body(r#"{"channel_type": "dm", "members": ["bob"]}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let first: serde_json::Value = res.into_json().unwrap();
    assert_eq!(first["channel_type"], "dm");

    let res = client
        .post("/api/chat/channels")
        .header(ContentType::JSON)
        .header(auth_header(&bob))
        .body(r#"{"channel_type": "dm", "members": ["alice"]}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let second: serde_json::Value = res.into_json().unwrap();
    assert_eq!(first["id"], second["id"]);
}

#[test]
fn messages_are_visible_only_to_channel_members() {
    let client = test_client();
    let alice = register_identity(&client, "alice2", false);
    let bob = register_identity(&client, "bob2", false);
    let eve = register_identity(&client, "eve2", false);

    let res = client
        .post("/api/chat/channels")
        .header(ContentType::JSON)
        .header(auth_header(&alice))
        .body(r#"{"channel_type": "dm", "members": ["bob2"]}"#)
        .dispatch();
    let channel: serde_json::Value = res.into_json().unwrap();
    let channel_id = channel["id"].as_str().unwrap();

    let res = client
        .post(format!("/api/chat/channels/{channel_id}/messages"))
        .header(ContentType::JSON)
        .header(auth_header(&alice))
        .body(r#"{"body": "hey bob"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/api/chat/channels/{channel_id}/messages")).header(auth_header(&bob)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let messages: serde_json::Value = res.into_json().unwrap();
    assert_eq!(messages.as_array().unwrap().len(), 1);
    assert_eq!(messages[0]["body"], "hey bob");

    let res = client.get(format!("/api/chat/channels/{channel_id}/messages")).header(auth_header(&eve)).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn mark_read_and_typing_require_membership() {
    let client = test_client();
    let alice = register_identity(&client, "alice3", false);
    let bob = register_identity(&client, "bob3", false);
    let eve = register_identity(&client, "eve3", false);

    let res = client
        .post("/api/chat/channels")
        .header(ContentType::JSON)
        .header(auth_header(&alice))
        .body(r#"{"channel_type": "dm", "members": ["bob3"]}"#)
        .dispatch();
    let channel: serde_json::Value = res.into_json().unwrap();
    let channel_id = channel["id"].as_str().unwrap();

    let res = client.post(format!("/api/chat/channels/{channel_id}/read")).header(auth_header(&bob)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.post(format!("/api/chat/channels/{channel_id}/typing")).header(auth_header(&eve)).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn group_channel_includes_all_named_members() {
    let client = test_client();
    let alice = register_identity(&client, "alice4", false);
    let _ = register_identity(&client, "bob4", false);
    let _ = register_identity(&client, "carol4", false);

    let res = client
        .post("/api/chat/channels")
        .header(ContentType::JSON)
        .header(auth_header(&alice))
        .body(r#"{"channel_type": "group", "name": "launch squad", "members": ["bob4", "carol4"]}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let channel: serde_json::Value = res.into_json().unwrap();
    assert_eq!(channel["channel_type"], "group");
    assert_eq!(channel["name"], "launch squad");

    let res = client.get("/api/chat/channels").header(auth_header(&alice)).dispatch();
    let channels: serde_json::Value = res.into_json().unwrap();
    assert!(channels.as_array().unwrap().iter().any(|c| c["id"] == channel["id"]));
}
