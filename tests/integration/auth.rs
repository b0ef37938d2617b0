use crate::common::{auth_header, register_identity, test_client, SUPERUSER_TOKEN};
use rocket::http::{ContentType, Status};

#[test]
fn superuser_token_verifies_as_admin() {
    let client = test_client();
    let res = client.post("/api/auth/verify").header(auth_header(SUPERUSER_TOKEN)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["identity"], "root");
    assert_eq!(body["is_admin"], true);
}

#[test]
fn missing_token_is_unauthorized() {
    let client = test_client();
    let res = client.post("/api/auth/verify").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn register_with_invite_grants_working_token() {
    let client = test_client();
    let token = register_identity(&client, "alice", false);
    assert!(!token.is_empty());

    let res = client.post("/api/auth/verify").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["identity"], "alice");
    assert_eq!(body["is_admin"], false);
}

#[test]
fn register_rejects_uppercase_identity() {
    let client = test_client();
    let res = client
        .post("/api/auth/invites")
        .header(ContentType::JSON)
        .header(auth_header(SUPERUSER_TOKEN))
        .body(r#"{}"#)
        .dispatch();
    let invite: serde_json::Value = res.into_json().unwrap();
    let code = invite["code"].as_str().unwrap();

    let res = client
        .post("/api/auth/register")
        .header(ContentType::JSON)
        .body(format!(r#"{{"code": "{code}", "identity": "Alice"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn invite_is_single_use_by_default() {
    let client = test_client();
    let res = client
        .post("/api/auth/invites")
        .header(ContentType::JSON)
        .header(auth_header(SUPERUSER_TOKEN))
        .body(r#"{}"#)
        .dispatch();
    let invite: serde_json::Value = res.into_json().unwrap();
    let code = invite["code"].as_str().unwrap();

    let res = client
        .post("/api/auth/register")
        .header(ContentType::JSON)
        .body(format!(r#"{{"code": "{code}", "identity": "bob"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .post("/api/auth/register")
        .header(ContentType::JSON)
        .body(format!(r#"{{"code": "{code}", "identity": "carol"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn non_admin_cannot_create_invites() {
    let client = test_client();
    let token = register_identity(&client, "dave", false);
    let res = client
        .post("/api/auth/invites")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn garbage_bearer_token_is_unauthorized() {
    let client = test_client();
    let res = client.post("/api/auth/verify").header(auth_header("not-a-real-token")).dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn register_rejects_mismatched_identity_hint() {
    let client = test_client();
    let res = client
        .post("/api/auth/invites")
        .header(ContentType::JSON)
        .header(auth_header(SUPERUSER_TOKEN))
        .body(r#"{"identity_hint": "erin"}"#)
        .dispatch();
    let invite: serde_json::Value = res.into_json().unwrap();
    let code = invite["code"].as_str().unwrap();

    let res = client
        .post("/api/auth/register")
        .header(ContentType::JSON)
        .body(format!(r#"{{"code": "{code}", "identity": "frank"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}
