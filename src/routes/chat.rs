use crate::auth::AuthContext;
use crate::config::HiveConfig;
use crate::db::Db;
use crate::error::HiveResult;
use crate::events::EventBus;
use crate::models::{ChatChannel, ChatMessage, CreateChannelInput, SendChatMessageInput};
use crate::webhooks::WebhookConfigCache;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use std::sync::Arc;

#[get("/api/chat/channels")]
pub fn list_channels(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext) -> HiveResult<Json<Vec<ChatChannel>>> {
    let channels = crate::chat::list_channels(db, &ctx.identity)?;
    Ok(Json(channels))
}

/// A `channelType` of `"dm"` with exactly one other member gets (or creates)
/// the canonical DM channel for that pair; anything else creates a group.
#[post("/api/chat/channels", format = "json", data = "<body>")]
pub fn create_channel(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, body: Json<CreateChannelInput>) -> HiveResult<Json<ChatChannel>> {
    let channel = if body.channel_type.as_deref() == Some("dm") && body.members.len() == 1 {
        crate::chat::get_or_create_dm(db, &ctx.identity, &body.members[0])?
    } else {
        crate::chat::create_group(db, &ctx.identity, &body)?
    };
    Ok(Json(channel))
}

#[get("/api/chat/channels/<id>/messages?<limit>")]
pub fn list_chat_messages(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: &str, limit: Option<i64>) -> HiveResult<Json<Vec<ChatMessage>>> {
    let messages = crate::chat::list_messages(db, id, &ctx.identity, limit.unwrap_or(50))?;
    Ok(Json(messages))
}

#[post("/api/chat/channels/<id>/messages", format = "json", data = "<body>")]
pub fn send_chat_message(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    bus: &State<Arc<EventBus>>,
    config: &State<HiveConfig>,
    webhook_cache: &State<Arc<WebhookConfigCache>>,
    http_client: &State<reqwest::Client>,
    ctx: AuthContext,
    id: &str,
    body: Json<SendChatMessageInput>,
) -> HiveResult<Json<ChatMessage>> {
    let (message, recipients) = crate::chat::send_message(db, bus, id, &ctx.identity, &body)?;

    for recipient in recipients {
        crate::webhooks::dispatch_message(
            http_client.inner().clone(),
            Arc::clone(db.inner()),
            Arc::clone(webhook_cache.inner()),
            config.webhook_allowed_hosts.clone(),
            recipient,
            serde_json::to_value(&message).unwrap_or_default(),
        );
    }

    Ok(Json(message))
}

#[post("/api/chat/channels/<id>/read")]
pub fn mark_channel_read(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, id: &str) -> HiveResult<Json<serde_json::Value>> {
    crate::chat::mark_read(db, id, &ctx.identity)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[post("/api/chat/channels/<id>/typing")]
pub fn notify_typing(_rl: super::RateLimited, db: &State<Arc<Db>>, bus: &State<Arc<EventBus>>, ctx: AuthContext, id: &str) -> HiveResult<Json<serde_json::Value>> {
    crate::chat::notify_typing(db, bus, id, &ctx.identity)?;
    Ok(Json(serde_json::json!({"ok": true})))
}
