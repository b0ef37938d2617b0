use crate::common::{auth_header, register_identity, test_client};
use rocket::http::{ContentType, Status};

#[test]
fn only_admin_can_manage_projects() {
    let client = test_client();
    let admin = register_identity(&client, "lead", true);
    let member = register_identity(&client, "dev", false);

    let res = client
        .post("/api/swarm/projects")
        .header(ContentType::JSON)
        .header(auth_header(&member))
        .body(r#"{"title": "rocket ship", "project_lead_user_id": "lead", "developer_lead_user_id": "dev"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    let res = client
        .post("/api/swarm/projects")
        .header(ContentType::JSON)
        .header(auth_header(&admin))
        .body(r#"{"title": "rocket ship", "project_lead_user_id": "lead", "developer_lead_user_id": "dev"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let project: serde_json::Value = res.into_json().unwrap();
    assert_eq!(project["title"], "rocket ship");

    let res = client.get("/api/swarm/projects").header(auth_header(&member)).dispatch();
    let projects: serde_json::Value = res.into_json().unwrap();
    assert_eq!(projects.as_array().unwrap().len(), 1);
}

#[test]
fn task_crud_and_reorder() {
    let client = test_client();
    let admin = register_identity(&client, "taskadmin", true);

    let res = client
        .post("/api/swarm/tasks")
        .header(ContentType::JSON)
        .header(auth_header(&admin))
        .body(r#"{"title": "write docs"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let task: serde_json::Value = res.into_json().unwrap();
    let task_id = task["id"].as_str().unwrap().to_string();
    assert_eq!(task["status"], "queued");

    let res = client
        .patch(format!("/api/swarm/tasks/{task_id}"))
        .header(ContentType::JSON)
        .header(auth_header(&admin))
        .body(r#"{"status": "in_progress"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let updated: serde_json::Value = res.into_json().unwrap();
    assert_eq!(updated["status"], "in_progress");

    let res = client.get(format!("/api/swarm/tasks/{task_id}/events")).header(auth_header(&admin)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let events: serde_json::Value = res.into_json().unwrap();
    assert!(!events.as_array().unwrap().is_empty());

    let res = client.delete(format!("/api/swarm/tasks/{task_id}")).header(auth_header(&admin)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get("/api/swarm/tasks").header(auth_header(&admin)).dispatch();
    let tasks: serde_json::Value = res.into_json().unwrap();
    assert!(tasks.as_array().unwrap().iter().all(|t| t["id"] != task_id));
}

#[test]
fn workflow_attached_to_task_round_trips() {
    let client = test_client();
    let admin = register_identity(&client, "workflowadmin", true);

    let res = client
        .post("/api/swarm/tasks")
        .header(ContentType::JSON)
        .header(auth_header(&admin))
        .body(r#"{"title": "deploy release"}"#)
        .dispatch();
    let task: serde_json::Value = res.into_json().unwrap();
    let task_id = task["id"].as_str().unwrap();

    let res = client
        .post(format!("/api/swarm/tasks/{task_id}/workflows"))
        .header(ContentType::JSON)
        .header(auth_header(&admin))
        .body(r#"{"title": "approve release", "url": "https://example.com/approve"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let workflow: serde_json::Value = res.into_json().unwrap();
    assert_eq!(workflow["task_id"], task_id);

    let res = client.get(format!("/api/swarm/tasks/{task_id}/workflows")).header(auth_header(&admin)).dispatch();
    let workflows: serde_json::Value = res.into_json().unwrap();
    assert_eq!(workflows.as_array().unwrap().len(), 1);

    let workflow_id = workflow["id"].as_str().unwrap();
    let res = client.delete(format!("/api/swarm/workflows/{workflow_id}")).header(auth_header(&admin)).dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn presence_reflects_recent_activity() {
    let client = test_client();
    let token = register_identity(&client, "presencebot", false);

    let _ = client.get("/api/swarm/projects").header(auth_header(&token)).dispatch();

    let res = client.get("/api/presence").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let presence: serde_json::Value = res.into_json().unwrap();
    assert_eq!(presence["presencebot"]["online"], true);
}
