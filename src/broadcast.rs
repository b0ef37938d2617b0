use crate::config::HiveConfig;
use crate::db::{generate_short_token, Db};
use crate::error::HiveError;
use crate::events::{EventBus, CHANNEL_BROADCAST};
use crate::models::{
    BroadcastEvent, BroadcastWebhook, CreateBroadcastWebhookInput, IngestResponse, UpdateBroadcastWebhookInput,
};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn create_webhook(db: &Db, owner: &str, input: &CreateBroadcastWebhookInput) -> Result<BroadcastWebhook, HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    let id = uuid::Uuid::new_v4().to_string();
    let token = generate_short_token();
    let for_users = (!input.for_users.is_empty()).then(|| input.for_users.join(","));

    conn.execute(
        "INSERT INTO broadcast_webhooks (id, app_name, token, title, owner, for_users, wake_agent, notify_agent, enabled, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)",
        params![&id, &input.app_name, &token, &input.title, owner, &for_users, &input.wake_agent, &input.notify_agent, &now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
            HiveError::Conflict("a webhook with this appName already exists for this token".to_string())
        }
        other => other.into(),
    })?;

    Ok(BroadcastWebhook {
        id,
        app_name: input.app_name.clone(),
        token,
        title: input.title.clone(),
        owner: owner.to_string(),
        for_users,
        wake_agent: input.wake_agent.clone(),
        notify_agent: input.notify_agent.clone(),
        enabled: true,
        last_hit_at: None,
        created_at: now,
    })
}

pub fn list_webhooks(db: &Db) -> Result<Vec<BroadcastWebhook>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, app_name, token, title, owner, for_users, wake_agent, notify_agent, enabled, last_hit_at, created_at
         FROM broadcast_webhooks ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(BroadcastWebhook {
                id: row.get(0)?,
                app_name: row.get(1)?,
                token: row.get(2)?,
                title: row.get(3)?,
                owner: row.get(4)?,
                for_users: row.get(5)?,
                wake_agent: row.get(6)?,
                notify_agent: row.get(7)?,
                enabled: row.get(8)?,
                last_hit_at: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn update_webhook(db: &Db, id: &str, input: &UpdateBroadcastWebhookInput) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let for_users = input.for_users.as_ref().map(|v| v.join(","));
    conn.execute(
        "UPDATE broadcast_webhooks SET
            title = COALESCE(?2, title),
            for_users = COALESCE(?3, for_users),
            wake_agent = COALESCE(?4, wake_agent),
            notify_agent = COALESCE(?5, notify_agent),
            enabled = COALESCE(?6, enabled)
         WHERE id = ?1",
        params![id, input.title, for_users, input.wake_agent, input.notify_agent, input.enabled],
    )?;
    Ok(())
}

pub fn delete_webhook(db: &Db, id: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    conn.execute("DELETE FROM broadcast_webhooks WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn list_events(db: &Db, app_name: Option<&str>, limit: i64) -> Result<Vec<BroadcastEvent>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, webhook_id, app_name, title, for_users, content_type, body_text, body_json, received_at, delivered_to_wake
         FROM broadcast_events WHERE (?1 IS NULL OR app_name = ?1) ORDER BY received_at DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![app_name, limit], row_to_event)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<BroadcastEvent> {
    let body_json_str: Option<String> = row.get(7)?;
    Ok(BroadcastEvent {
        id: row.get(0)?,
        webhook_id: row.get(1)?,
        app_name: row.get(2)?,
        title: row.get(3)?,
        for_users: row.get(4)?,
        content_type: row.get(5)?,
        body_text: row.get(6)?,
        body_json: body_json_str.and_then(|s| serde_json::from_str(&s).ok()),
        received_at: row.get(8)?,
        delivered_to_wake: row.get(9)?,
    })
}

/// Canonical JSON: object keys sorted recursively, arrays left in order.
/// Used purely to compute a stable dedupe signature, never stored verbatim.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let canon = sorted.into_iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            Value::Object(canon)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn compute_signature(
    title: &str,
    body_text: Option<&str>,
    body_json: Option<&Value>,
    for_users: Option<&str>,
    content_type: Option<&str>,
) -> String {
    let canon_json = body_json.map(canonicalize);
    let payload = serde_json::json!({
        "title": title,
        "bodyText": body_text,
        "bodyJson": canon_json,
        "forUsers": for_users,
        "contentType": content_type,
    });
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

pub struct IngestBody {
    pub title: Option<String>,
    pub body_text: Option<String>,
    pub body_json: Option<Value>,
    pub content_type: Option<String>,
}

/// Handles `POST /api/ingest/{appName}/{token}`. Resolves the capability,
/// dedupes within the cooldown window by signature, inserts the event, and
/// emits wake triggers for `wakeAgent`/`notifyAgent` when newly inserted.
pub fn ingest(
    db: &Db,
    config: &HiveConfig,
    bus: &EventBus,
    app_name: &str,
    token: &str,
    body: IngestBody,
) -> Result<IngestResponse, HiveError> {
    let conn = db.conn.lock().unwrap();

    let webhook: Option<(String, String, Option<String>, Option<String>, bool)> = conn
        .query_row(
            "SELECT id, title, for_users, wake_agent, enabled FROM broadcast_webhooks
             WHERE app_name = ?1 AND token = ?2",
            params![app_name, token],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;

    let (webhook_id, default_title, for_users, wake_agent, enabled) =
        webhook.ok_or_else(|| HiveError::NotFound("unknown ingest capability".to_string()))?;
    if !enabled {
        return Err(HiveError::NotFound("ingest endpoint disabled".to_string()));
    }

    let notify_agent: Option<String> = conn
        .query_row("SELECT notify_agent FROM broadcast_webhooks WHERE id = ?1", params![&webhook_id], |r| r.get(0))
        .optional()?
        .flatten();

    let title = body.title.unwrap_or(default_title);
    let signature = compute_signature(
        &title,
        body.body_text.as_deref(),
        body.body_json.as_ref(),
        for_users.as_deref(),
        body.content_type.as_deref(),
    );

    let now = chrono::Utc::now();
    let cooldown = chrono::Duration::minutes(config.broadcast_cooldown_minutes);

    let mut stmt = conn.prepare(
        "SELECT id, signature, received_at FROM broadcast_events WHERE webhook_id = ?1
         ORDER BY received_at DESC LIMIT 50",
    )?;
    let recent: Vec<(String, String, String)> = stmt
        .query_map(params![&webhook_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .filter_map(|r| r.ok())
        .collect();
    drop(stmt);

    for (existing_id, existing_sig, received_at) in &recent {
        if existing_sig != &signature {
            continue;
        }
        if let Ok(received) = chrono::DateTime::parse_from_rfc3339(received_at) {
            if now.signed_duration_since(received.with_timezone(&chrono::Utc)) < cooldown {
                conn.execute(
                    "UPDATE broadcast_webhooks SET last_hit_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), &webhook_id],
                )?;
                return Ok(IngestResponse { ok: true, event_id: existing_id.clone(), suppressed: true });
            }
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    let body_json_str = body.body_json.as_ref().map(|v| v.to_string());
    conn.execute(
        "INSERT INTO broadcast_events (id, webhook_id, app_name, title, for_users, content_type, body_text, body_json, signature, received_at, delivered_to_wake)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, '')",
        params![&id, &webhook_id, app_name, &title, &for_users, &body.content_type, &body.body_text, &body_json_str, &signature, now.to_rfc3339()],
    )?;
    conn.execute("UPDATE broadcast_webhooks SET last_hit_at = ?1 WHERE id = ?2", params![now.to_rfc3339(), &webhook_id])?;

    drop(conn);

    bus.emit(CHANNEL_BROADCAST, crate::events::HiveEvent::Broadcast(BroadcastEvent {
        id: id.clone(),
        webhook_id,
        app_name: app_name.to_string(),
        title,
        for_users,
        content_type: body.content_type,
        body_text: body.body_text,
        body_json: body.body_json,
        received_at: now.to_rfc3339(),
        delivered_to_wake: String::new(),
    }));

    if let Some(ref agent) = wake_agent {
        bus.emit_wake_trigger(agent);
    }
    if let Some(ref agent) = notify_agent {
        bus.emit_wake_trigger(agent);
    }

    Ok(IngestResponse { ok: true, event_id: id, suppressed: false })
}

/// Marks `event_id` as delivered to `identity` for the wake aggregator's
/// at-most-once contract. Commits after the wake response has been written.
pub fn mark_delivered(db: &Db, event_id: &str, identity: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let current: Option<String> = conn
        .query_row("SELECT delivered_to_wake FROM broadcast_events WHERE id = ?1", params![event_id], |r| r.get(0))
        .optional()?;
    let Some(current) = current else { return Ok(()) };
    let mut identities: Vec<&str> = current.split(',').filter(|s| !s.is_empty()).collect();
    if !identities.contains(&identity) {
        identities.push(identity);
    }
    conn.execute(
        "UPDATE broadcast_events SET delivered_to_wake = ?1 WHERE id = ?2",
        params![identities.join(","), event_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_object_keys() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn signature_changes_with_content_type() {
        let sig_a = compute_signature("t", Some("body"), None, None, Some("application/json"));
        let sig_b = compute_signature("t", Some("body"), None, None, None);
        assert_ne!(sig_a, sig_b);
    }

    #[test]
    fn signature_is_stable_across_key_order() {
        let a = serde_json::json!({"x": 1, "y": 2});
        let b = serde_json::json!({"y": 2, "x": 1});
        let sig_a = compute_signature("t", None, Some(&a), None, None);
        let sig_b = compute_signature("t", None, Some(&b), None, None);
        assert_eq!(sig_a, sig_b);
    }
}
