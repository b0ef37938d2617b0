use crate::common::{auth_header, register_identity, test_client};
use rocket::http::{ContentType, Status};

#[test]
fn create_list_get_update_and_archive_page() {
    let client = test_client();
    let token = register_identity(&client, "scribe", false);

    let res = client
        .post("/api/notebook/pages")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title": "runbook", "content": "step one"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let page: serde_json::Value = res.into_json().unwrap();
    let id = page["id"].as_str().unwrap().to_string();
    assert_eq!(page["title"], "runbook");
    assert_eq!(page["locked"], false);

    let res = client.get("/api/notebook/pages").header(auth_header(&token)).dispatch();
    let pages: serde_json::Value = res.into_json().unwrap();
    assert!(pages.as_array().unwrap().iter().any(|p| p["id"] == id));

    let res = client.get(format!("/api/notebook/pages/{id}")).header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let fetched: serde_json::Value = res.into_json().unwrap();
    assert_eq!(fetched["content"], "step one");

    let res = client
        .put(format!("/api/notebook/pages/{id}"))
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"content": "step one, then step two", "locked": true}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let updated: serde_json::Value = res.into_json().unwrap();
    assert_eq!(updated["content"], "step one, then step two");
    assert_eq!(updated["locked"], true);

    let res = client.post(format!("/api/notebook/pages/{id}/archive")).header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get("/api/notebook/pages").header(auth_header(&token)).dispatch();
    let pages: serde_json::Value = res.into_json().unwrap();
    assert!(!pages.as_array().unwrap().iter().any(|p| p["id"] == id));

    let res = client.get("/api/notebook/pages?include_archived=true").header(auth_header(&token)).dispatch();
    let pages: serde_json::Value = res.into_json().unwrap();
    assert!(pages.as_array().unwrap().iter().any(|p| p["id"] == id));
}

#[test]
fn get_unknown_page_is_not_found() {
    let client = test_client();
    let token = register_identity(&client, "scribe2", false);
    let res = client.get("/api/notebook/pages/does-not-exist").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}
