use crate::db::Db;
use rocket::serde::json::Json;
use rocket::{get, State};
use std::sync::Arc;

#[get("/api/health")]
pub fn health(_rl: super::RateLimited) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "hive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Cheap self-check for operators: confirms the SQLite connection is alive
/// and reports row counts for the busiest tables. Migration failures at
/// startup are logged and swallowed (`db::run_migrations` never panics), so
/// this is the place to notice a schema that didn't come up as expected.
#[get("/api/doctor")]
pub fn doctor(_rl: super::RateLimited, db: &State<Arc<Db>>) -> Json<serde_json::Value> {
    let conn = db.conn.lock().unwrap();

    let count = |table: &str| -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0)).unwrap_or(-1)
    };

    Json(serde_json::json!({
        "status": "ok",
        "users": count("users"),
        "mailbox_messages": count("mailbox_messages"),
        "swarm_tasks": count("swarm_tasks"),
        "notebook_pages": count("notebook_pages"),
        "broadcast_webhooks": count("broadcast_webhooks"),
        "recurring_templates": count("recurring_templates"),
    }))
}

/// Machine-readable cheat sheet for one wake category, the target of
/// `WakeAction::skill_url` (`wake.rs`): an agent that gets a wake item it
/// doesn't recognize can follow the link instead of guessing at the
/// contract. Unknown categories get a generic fallback rather than a 404,
/// since the category set in `wake.rs` may grow without this list being
/// kept perfectly in sync.
#[get("/api/skills/<category>")]
pub fn skill_md(_rl: super::RateLimited, category: &str) -> (rocket::http::ContentType, String) {
    let body = match category {
        "message" => {
            "# message\n\nAn unread mailbox message is waiting. \
             `POST /api/mailboxes/me/messages/<id>/ack` marks it read, \
             `POST /api/mailboxes/me/messages/<id>/reply` replies in-thread."
        }
        "message_pending" => {
            "# message_pending\n\nYou marked a message for follow-up with \
             `POST /api/mailboxes/me/messages/<id>/pending`. Deliver the \
             follow-up, then `DELETE /api/mailboxes/me/messages/<id>/pending` \
             to clear it. Pending items older than 24h are promoted to `high`."
        }
        "swarm" => {
            "# swarm\n\nA swarm task is assigned to you. \
             `PATCH /api/swarm/tasks/<id>` to change status or hand it off, \
             `GET /api/swarm/tasks/<id>/events` for its audit trail."
        }
        "buzz" => {
            "# buzz\n\nA broadcast event was routed to you as a wake or \
             notify target. `wake` role: open a swarm task in `ready` to \
             investigate. `notify` role: no action required beyond awareness. \
             Delivery is at-most-once — this item will not reappear on the \
             next wake poll."
        }
        "backup" => {
            "# backup\n\nAn agent you back up has gone stale (no presence \
             heartbeat past its configured threshold). Check on it and \
             notify the team if it's genuinely down."
        }
        _ => "# unknown category\n\nNo skill documentation is registered for this wake category.",
    };
    (rocket::http::ContentType::Markdown, body.to_string())
}

#[rocket::catch(429)]
pub fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Too many requests"}))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}
