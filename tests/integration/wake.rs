use crate::common::{auth_header, register_identity, test_client};
use rocket::http::ContentType;

#[test]
fn wake_aggregates_message_swarm_and_buzz_then_buzz_is_delivered_once() {
    let client = test_client();
    let waker = register_identity(&client, "waker", false);
    let colleague = register_identity(&client, "colleague", false);

    client
        .post("/api/mailboxes/waker/messages")
        .header(ContentType::JSON)
        .header(auth_header(&colleague))
        .body(r#"{"title": "need a hand", "body": "quick question"}"#)
        .dispatch();

    let res = client
        .post("/api/swarm/tasks")
        .header(ContentType::JSON)
        .header(auth_header(&waker))
        .body(r#"{"title": "ship the patch", "assignee_user_id": "waker"}"#)
        .dispatch();
    let task: serde_json::Value = res.into_json().unwrap();
    let task_id = task["id"].as_str().unwrap();
    client
        .patch(format!("/api/swarm/tasks/{task_id}"))
        .header(ContentType::JSON)
        .header(auth_header(&waker))
        .body(r#"{"status": "ready"}"#)
        .dispatch();

    let res = client
        .post("/api/broadcast/webhooks")
        .header(ContentType::JSON)
        .header(auth_header(&waker))
        .body(r#"{"app_name": "monitoring", "title": "alert", "wake_agent": "waker"}"#)
        .dispatch();
    let webhook: serde_json::Value = res.into_json().unwrap();
    let app_name = webhook["app_name"].as_str().unwrap();
    let capability_token = webhook["token"].as_str().unwrap();
    client.post(format!("/api/ingest/{app_name}/{capability_token}")).header(ContentType::Plain).body("disk full").dispatch();

    let res = client.get("/api/wake").header(auth_header(&waker)).dispatch();
    let payload: serde_json::Value = res.into_json().unwrap();
    let items = payload["items"].as_array().unwrap();

    let sources: Vec<&str> = items.iter().map(|i| i["source"].as_str().unwrap()).collect();
    assert!(sources.contains(&"message"));
    assert!(sources.contains(&"swarm"));
    assert!(sources.contains(&"buzz"));

    let buzz_item = items.iter().find(|i| i["source"] == "buzz").unwrap();
    assert_eq!(buzz_item["priority"], "high");

    let categories: Vec<&str> = payload["actions"].as_array().unwrap().iter().map(|a| a["category"].as_str().unwrap()).collect();
    assert!(categories.contains(&"buzz"));

    let res = client.get("/api/wake").header(auth_header(&waker)).dispatch();
    let second: serde_json::Value = res.into_json().unwrap();
    let second_sources: Vec<&str> = second["items"].as_array().unwrap().iter().map(|i| i["source"].as_str().unwrap()).collect();
    assert!(!second_sources.contains(&"buzz"));
    assert!(second_sources.contains(&"message"));
    assert!(second_sources.contains(&"swarm"));
}
