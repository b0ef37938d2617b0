use crate::auth::AuthContext;
use crate::config::HiveConfig;
use crate::db::Db;
use crate::error::HiveResult;
use crate::events::EventBus;
use crate::models::{MessagePage, ReplyInput, SendMessageInput};
use crate::webhooks::WebhookConfigCache;
use rocket::serde::json::Json;
use rocket::{delete, get, post, State};
use std::sync::Arc;

#[get("/api/mailboxes/me/messages?<status>&<limit>&<cursor>")]
pub fn list_messages(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    ctx: AuthContext,
    status: Option<&str>,
    limit: Option<i64>,
    cursor: Option<i64>,
) -> HiveResult<Json<MessagePage>> {
    let page = crate::mailbox::list(db, &ctx.identity, status, limit.unwrap_or(50), cursor)?;
    Ok(Json(page))
}

#[post("/api/mailboxes/<recipient>/messages", format = "json", data = "<body>")]
pub fn send_message(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    bus: &State<Arc<EventBus>>,
    config: &State<HiveConfig>,
    webhook_cache: &State<Arc<WebhookConfigCache>>,
    http_client: &State<reqwest::Client>,
    ctx: AuthContext,
    recipient: &str,
    body: Json<SendMessageInput>,
) -> HiveResult<Json<crate::models::MailboxMessage>> {
    let message = crate::mailbox::send(db, bus, &ctx.identity, recipient, &body)?;

    crate::webhooks::dispatch_message(
        http_client.inner().clone(),
        Arc::clone(db.inner()),
        Arc::clone(webhook_cache.inner()),
        config.webhook_allowed_hosts.clone(),
        recipient.to_string(),
        serde_json::to_value(&message).unwrap_or_default(),
    );

    Ok(Json(message))
}

#[post("/api/mailboxes/me/messages/<id>/ack")]
pub fn ack_message(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, id: i64) -> HiveResult<Json<serde_json::Value>> {
    crate::mailbox::ack(db, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[post("/api/mailboxes/me/messages/<id>/reply", format = "json", data = "<body>")]
pub fn reply_message(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    bus: &State<Arc<EventBus>>,
    ctx: AuthContext,
    id: i64,
    body: Json<ReplyInput>,
) -> HiveResult<Json<crate::models::MailboxMessage>> {
    let message = crate::mailbox::reply(db, bus, &ctx.identity, id, &body)?;
    Ok(Json(message))
}

#[post("/api/mailboxes/me/messages/<id>/pending")]
pub fn mark_pending(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: i64) -> HiveResult<Json<serde_json::Value>> {
    crate::mailbox::mark_pending(db, id, &ctx.identity)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[delete("/api/mailboxes/me/messages/<id>/pending")]
pub fn clear_pending(_rl: super::RateLimited, db: &State<Arc<Db>>, _ctx: AuthContext, id: i64) -> HiveResult<Json<serde_json::Value>> {
    crate::mailbox::clear_pending(db, id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}
