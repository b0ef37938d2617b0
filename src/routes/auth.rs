use crate::auth::{self, AuthCache, AuthContext};
use crate::db::Db;
use crate::error::HiveResult;
use crate::models::{CreateInvite, Invite, RegisterRequest, RegisterResponse, VerifyResponse};
use rocket::serde::json::Json;
use rocket::{post, State};
use std::sync::Arc;

#[post("/api/auth/verify")]
pub fn verify(_rl: super::RateLimited, ctx: AuthContext) -> Json<VerifyResponse> {
    Json(VerifyResponse { identity: ctx.identity, is_admin: ctx.is_admin })
}

#[post("/api/auth/register", format = "json", data = "<body>")]
pub fn register(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    cache: &State<Arc<AuthCache>>,
    body: Json<RegisterRequest>,
) -> HiveResult<Json<RegisterResponse>> {
    let response = auth::register(db, cache, &body.code, &body.identity)?;
    Ok(Json(response))
}

#[post("/api/auth/invites", format = "json", data = "<body>")]
pub fn create_invite(_rl: super::RateLimited, db: &State<Arc<Db>>, ctx: AuthContext, body: Json<CreateInvite>) -> HiveResult<Json<Invite>> {
    let invite = auth::create_invite(db, &ctx, &body)?;
    Ok(Json(invite))
}

#[post("/api/auth/tokens/<token_id>/rotate")]
pub fn rotate_token(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    cache: &State<Arc<AuthCache>>,
    ctx: AuthContext,
    token_id: &str,
) -> HiveResult<Json<serde_json::Value>> {
    let token = auth::rotate_token(db, cache, token_id, &ctx)?;
    Ok(Json(serde_json::json!({"token": token})))
}

#[post("/api/auth/tokens/<token_id>/revoke")]
pub fn revoke_token(
    _rl: super::RateLimited,
    db: &State<Arc<Db>>,
    cache: &State<Arc<AuthCache>>,
    ctx: AuthContext,
    token_id: &str,
) -> HiveResult<Json<serde_json::Value>> {
    auth::revoke_token(db, cache, token_id, &ctx)?;
    Ok(Json(serde_json::json!({"ok": true})))
}
