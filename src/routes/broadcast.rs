use crate::auth::AuthContext;
use crate::config::HiveConfig;
use crate::db::Db;
use crate::error::{HiveError, HiveResult};
use crate::events::EventBus;
use crate::models::{BroadcastEvent, BroadcastWebhook, CreateBroadcastWebhookInput, IngestResponse, UpdateBroadcastWebhookInput};
use rocket::data::{Data, ToByteUnit};
use rocket::http::ContentType;
use rocket::serde::json::Json;
use rocket::{get, patch, post, delete, State};
use std::sync::Arc;

use super::require_admin;

#[post("/api/broadcast/webhooks", format = "json", data = "<body>")]
pub fn create_broadcast_webhook(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    ctx: AuthContext,
    body: Json<CreateBroadcastWebhookInput>,
) -> HiveResult<Json<BroadcastWebhook>> {
    let webhook = crate::broadcast::create_webhook(db, &ctx.identity, &body)?;
    Ok(Json(webhook))
}

#[get("/api/broadcast/webhooks")]
pub fn list_broadcast_webhooks(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext) -> HiveResult<Json<Vec<BroadcastWebhook>>> {
    let webhooks = crate::broadcast::list_webhooks(db)?;
    Ok(Json(webhooks))
}

#[patch("/api/broadcast/webhooks/<id>", format = "json", data = "<body>")]
pub fn update_broadcast_webhook(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    ctx: AuthContext,
    id: &str,
    body: Json<UpdateBroadcastWebhookInput>,
) -> HiveResult<Json<serde_json::Value>> {
    require_admin(&ctx)?;
    crate::broadcast::update_webhook(db, id, &body)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[delete("/api/broadcast/webhooks/<id>")]
pub fn delete_broadcast_webhook(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: &str) -> HiveResult<Json<serde_json::Value>> {
    require_admin(&ctx)?;
    crate::broadcast::delete_webhook(db, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[get("/api/broadcast/events?<app_name>&<limit>")]
pub fn list_broadcast_events(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    _ctx: AuthContext,
    app_name: Option<&str>,
    limit: Option<i64>,
) -> HiveResult<Json<Vec<BroadcastEvent>>> {
    let events = crate::broadcast::list_events(db, app_name, limit.unwrap_or(50))?;
    Ok(Json(events))
}

/// Public, tokenized ingest endpoint: no `AuthContext` guard, the path
/// segments themselves are the capability. Body is parsed by Content-Type
/// per the ingest contract: `application/json` is kept structured as
/// `bodyJson`, anything else is read as UTF-8 text into `bodyText`.
#[post("/api/ingest/<app_name>/<token>", data = "<data>")]
pub async fn ingest(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    config: &State<HiveConfig>,
    bus: &State<Arc<EventBus>>,
    content_type: Option<&ContentType>,
    app_name: &str,
    token: &str,
    data: Data<'_>,
) -> HiveResult<Json<IngestResponse>> {
    let raw = data
        .open(1.mebibytes())
        .into_string()
        .await
        .map_err(|e| HiveError::BadRequest(format!("failed to read request body: {e}")))?;

    let content_type_str = content_type.map(|c| c.to_string());
    let is_json = content_type.map(|c| c.is_json()).unwrap_or(false);

    let (title, body_text, body_json) = if is_json {
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);
        let title = value.get("title").and_then(|v| v.as_str()).map(|s| s.to_string());
        (title, None, Some(value))
    } else {
        (None, if raw.is_empty() { None } else { Some(raw.to_string()) }, None)
    };

    let body = crate::broadcast::IngestBody { title, body_text, body_json, content_type: content_type_str };
    let response = crate::broadcast::ingest(db, config, bus, app_name, token, body)?;
    Ok(Json(response))
}
