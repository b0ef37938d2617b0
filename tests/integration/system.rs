use crate::common::test_client;
use rocket::http::{ContentType, Status};

#[test]
fn health_reports_ok() {
    let client = test_client();
    let res = client.get("/api/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "hive");
}

#[test]
fn doctor_reports_table_counts() {
    let client = test_client();
    let res = client.get("/api/doctor").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["users"], 1); // the reconciled superuser row
}

#[test]
fn skill_md_serves_known_categories_and_falls_back_for_unknown() {
    let client = test_client();

    let res = client.get("/api/skills/buzz").dispatch();
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(res.content_type(), Some(ContentType::Markdown));

    let res = client.get("/api/skills/not-a-category").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body = res.into_string().unwrap();
    assert!(body.contains("unknown category"));
}

#[test]
fn unknown_route_returns_structured_404() {
    let client = test_client();
    let res = client.get("/api/does-not-exist").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert!(body["error"].is_string());
}
