use hive::config::HiveConfig;
use rocket::local::blocking::Client;

/// Wrapper around `Client` that removes the temp SQLite file (and its
/// `-wal`/`-shm` siblings) on drop, the same lifecycle the teacher's
/// `TestClient` manages for its own per-test database.
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

pub const SUPERUSER_TOKEN: &str = "test-superuser-token-0123456789ab";

fn test_config(db_path: &str) -> HiveConfig {
    HiveConfig {
        database_path: db_path.to_string(),
        static_dir: "frontend/dist".to_string(),
        superuser_name: Some("root".to_string()),
        superuser_token: Some(SUPERUSER_TOKEN.to_string()),
        superuser_display_name: "Root".to_string(),
        base_url: Some("http://localhost:8000".to_string()),
        broadcast_cooldown_minutes: 180,
        webhook_allowed_hosts: vec![],
        attachment_dir: "data/attachments".to_string(),
        avatar_dir: "data/avatars".to_string(),
        auth_cache_ttl_secs: 30,
        webhook_cache_ttl_secs: 60,
        presence_stale_secs: 120,
        sse_heartbeat_secs: 30,
        sse_wake_pulse_secs: 1800,
        notebook_save_debounce_secs: 5,
        notebook_destroy_delay_secs: 10,
        scheduler_tick_secs: 60,
        webhook_timeout_secs: 5,
        fetch_timeout_secs: 8,
    }
}

pub fn test_client() -> TestClient {
    let db_path = format!("/tmp/hive_test_{}.db", uuid::Uuid::new_v4().simple());
    let rocket = hive::rocket_with_config(test_config(&db_path));
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

/// Registers a fresh identity through an admin-issued invite and returns its
/// bearer token. Mirrors the only path a non-superuser identity can obtain
/// one: `POST /api/auth/invites` (admin) then `POST /api/auth/register`.
pub fn register_identity(client: &Client, identity: &str, is_admin: bool) -> String {
    use rocket::http::{ContentType, Header, Status};

    let res = client
        .post("/api/auth/invites")
        .header(ContentType::JSON)
        .header(Header::new("Authorization", format!("Bearer {SUPERUSER_TOKEN}")))
        .body(format!(r#"{{"is_admin": {is_admin}}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let invite: serde_json::Value = res.into_json().unwrap();
    let code = invite["code"].as_str().unwrap();

    let res = client
        .post("/api/auth/register")
        .header(ContentType::JSON)
        .body(format!(r#"{{"code": "{code}", "identity": "{identity}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    body["token"].as_str().unwrap().to_string()
}

pub fn auth_header(token: &str) -> rocket::http::Header<'static> {
    rocket::http::Header::new("Authorization", format!("Bearer {token}"))
}
