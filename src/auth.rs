use crate::config::HiveConfig;
use crate::db::{generate_token, Db};
use crate::error::HiveError;
use crate::models::{Invite, RegisterResponse};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Request};
use rocket::State;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    Env,
    Database,
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: String,
    pub is_admin: bool,
    pub source: AuthSource,
}

/// 30-second positive+negative cache keyed by the bearer token string, to
/// shield the store from a lookup on every request. Every mutation that
/// changes validity calls `clear()`.
pub struct AuthCache {
    entries: Mutex<HashMap<String, (Option<AuthContext>, Instant)>>,
    ttl: Duration,
}

impl AuthCache {
    pub fn new(ttl_secs: u64) -> Self {
        AuthCache { entries: Mutex::new(HashMap::new()), ttl: Duration::from_secs(ttl_secs) }
    }

    fn get(&self, token: &str) -> Option<Option<AuthContext>> {
        let entries = self.entries.lock().unwrap();
        entries.get(token).and_then(|(ctx, at)| {
            if at.elapsed() < self.ttl {
                Some(ctx.clone())
            } else {
                None
            }
        })
    }

    fn put(&self, token: &str, ctx: Option<AuthContext>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(token.to_string(), (ctx, Instant::now()));
    }

    /// Clears the whole cache. Called after revoke/rotate/archive/register:
    /// clear-the-whole-thing rather than fine-grained invalidation, same as
    /// the rate limiter and webhook config cache.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Resolves a bearer token to an `AuthContext`: the bootstrap env-token
/// identity first, then the database.
pub fn authenticate(db: &Db, config: &HiveConfig, cache: &AuthCache, token: &str) -> Option<AuthContext> {
    if let Some(cached) = cache.get(token) {
        return cached;
    }

    let ctx = authenticate_uncached(db, config, token);
    cache.put(token, ctx.clone());
    ctx
}

fn authenticate_uncached(db: &Db, config: &HiveConfig, token: &str) -> Option<AuthContext> {
    if let Some(ref superuser_token) = config.superuser_token {
        if token == superuser_token {
            if let Some(ref name) = config.superuser_name {
                return Some(AuthContext { identity: name.clone(), is_admin: true, source: AuthSource::Env });
            }
        }
    }

    let conn = db.conn.lock().unwrap();
    let row: Option<(String, Option<bool>, Option<String>)> = conn
        .query_row(
            "SELECT t.identity, u.is_admin, u.archived_at
             FROM mailbox_tokens t LEFT JOIN users u ON u.id = t.identity
             WHERE t.token = ?1 AND t.revoked_at IS NULL
               AND (t.expires_at IS NULL OR t.expires_at > ?2)",
            params![token, chrono::Utc::now().to_rfc3339()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .ok()
        .flatten();

    let (identity, is_admin, archived_at) = row?;
    if archived_at.is_some() {
        return None;
    }

    let is_admin = match is_admin {
        Some(v) => v,
        None => {
            // Token exists but the user row is missing: backfill a minimal row.
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO users (id, display_name, is_admin, is_agent, created_at)
                 VALUES (?1, ?1, 0, 1, ?2)",
                params![&identity, &now],
            )
            .ok();
            false
        }
    };

    touch_last_used(&conn, token);

    Some(AuthContext { identity, is_admin, source: AuthSource::Database })
}

fn touch_last_used(conn: &rusqlite::Connection, token: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute("UPDATE mailbox_tokens SET last_used_at = ?1 WHERE token = ?2", params![now, token])
        .ok();
}

/// Upserts the bootstrap superuser row to `is_admin=true`. Runs once at
/// every boot regardless of whether the row already existed.
pub fn reconcile_superuser(db: &Db, config: &HiveConfig) {
    let (Some(name), Some(_token)) = (&config.superuser_name, &config.superuser_token) else {
        return;
    };
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (id, display_name, is_admin, is_agent, created_at) VALUES (?1, ?2, 1, 0, ?3)
         ON CONFLICT(id) DO UPDATE SET is_admin = 1, display_name = excluded.display_name",
        params![name, &config.superuser_display_name, &now],
    )
    .expect("failed to reconcile superuser row");
}

#[derive(Debug)]
pub enum AuthError {
    Missing,
    Invalid,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthContext {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = bearer_token(req);
        let Some(token) = token else {
            return Outcome::Error((Status::Unauthorized, AuthError::Missing));
        };

        let db = req.guard::<&State<std::sync::Arc<Db>>>().await.succeeded();
        let config = req.guard::<&State<HiveConfig>>().await.succeeded();
        let cache = req.guard::<&State<std::sync::Arc<AuthCache>>>().await.succeeded();
        let (Some(db), Some(config), Some(cache)) = (db, config, cache) else {
            return Outcome::Error((Status::InternalServerError, AuthError::Invalid));
        };

        match authenticate(db, config, cache, &token) {
            Some(ctx) => Outcome::Success(ctx),
            None => Outcome::Error((Status::Unauthorized, AuthError::Invalid)),
        }
    }
}

/// Reads `Authorization: Bearer <token>` first, then `?token=` — the latter
/// exists because SSE/WebSocket clients (browsers) cannot attach custom
/// headers to `EventSource`/`WebSocket`.
fn bearer_token(req: &Request<'_>) -> Option<String> {
    if let Some(auth) = req.headers().get_one("Authorization") {
        if let Some(tok) = auth.strip_prefix("Bearer ") {
            return Some(tok.to_string());
        }
    }
    req.query_value::<String>("token").and_then(|r| r.ok())
}

/// Wraps `AuthContext`, forwarding with `Forbidden` when the caller is not
/// an admin.
pub struct AdminContext(pub AuthContext);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminContext {
    type Error = HiveError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthContext::from_request(req).await {
            Outcome::Success(ctx) if ctx.is_admin => Outcome::Success(AdminContext(ctx)),
            Outcome::Success(_) => Outcome::Error((Status::Forbidden, HiveError::admin_required())),
            Outcome::Error((s, _)) => Outcome::Error((s, HiveError::Unauthorized)),
            Outcome::Forward(s) => Outcome::Forward(s),
        }
    }
}

static IDENTITY_RE_SRC: &str = r"^[a-z][a-z0-9_-]*$";

pub fn validate_identity(identity: &str) -> Result<(), HiveError> {
    if identity.is_empty() || identity.len() > 50 {
        return Err(HiveError::BadRequest("identity must be 1-50 characters".into()));
    }
    let mut chars = identity.chars();
    let first_ok = chars.next().map(|c| c.is_ascii_lowercase()).unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !first_ok || !rest_ok {
        return Err(HiveError::BadRequest(format!("identity must match {IDENTITY_RE_SRC}")));
    }
    Ok(())
}

/// Validates the invite, mints a token + user row, increments use count, and
/// clears the auth cache — all as one logical step.
pub fn register(db: &Db, cache: &AuthCache, code: &str, identity: &str) -> Result<RegisterResponse, HiveError> {
    validate_identity(identity)?;

    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();

    let invite: Invite = conn
        .query_row(
            "SELECT id, code, identity_hint, is_admin, max_uses, use_count, expires_at, created_by, created_at
             FROM invites WHERE code = ?1",
            params![code],
            |row| {
                Ok(Invite {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    identity_hint: row.get(2)?,
                    is_admin: row.get(3)?,
                    max_uses: row.get(4)?,
                    use_count: row.get(5)?,
                    expires_at: row.get(6)?,
                    created_by: row.get(7)?,
                    created_at: row.get(8)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| HiveError::Forbidden("invalid invite code".to_string()))?;

    if invite.use_count >= invite.max_uses {
        return Err(HiveError::Forbidden("invite has already been used".to_string()));
    }
    if let Some(ref expires_at) = invite.expires_at {
        if expires_at.as_str() < now.as_str() {
            return Err(HiveError::Forbidden("invite has expired".to_string()));
        }
    }
    if let Some(ref hint) = invite.identity_hint {
        if hint != identity {
            return Err(HiveError::BadRequest("identity does not match invite hint".to_string()));
        }
    }

    let token = generate_token();
    conn.execute(
        "INSERT INTO users (id, display_name, is_admin, is_agent, created_at)
         VALUES (?1, ?1, ?2, 0, ?3)
         ON CONFLICT(id) DO UPDATE SET is_admin = excluded.is_admin",
        params![identity, invite.is_admin, &now],
    )?;
    let token_id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO mailbox_tokens (id, token, identity, label, created_by, created_at, webhook_token)
         VALUES (?1, ?2, ?3, 'registration', ?3, ?4, ?2)",
        params![&token_id, &token, identity, &now],
    )?;
    conn.execute("UPDATE invites SET use_count = use_count + 1 WHERE id = ?1", params![invite.id])?;

    cache.clear();

    Ok(RegisterResponse {
        identity: identity.to_string(),
        token,
        is_admin: invite.is_admin,
        message: "registration successful; store this token, it will not be shown again".to_string(),
    })
}

/// Generates a fresh token, sets `revokedAt=now` on the old row, inserts a
/// new row with the same identity/webhookUrl, copying the old token as the
/// new row's `webhookToken`.
pub fn rotate_token(db: &Db, cache: &AuthCache, token_id: &str, caller: &AuthContext) -> Result<String, HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();

    let (identity, old_token, webhook_url): (String, String, Option<String>) = conn
        .query_row(
            "SELECT identity, token, webhook_url FROM mailbox_tokens WHERE id = ?1",
            params![token_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or_else(|| HiveError::NotFound("token not found".to_string()))?;

    if !caller.is_admin && caller.identity != identity {
        return Err(HiveError::Forbidden("admin or token owner required".to_string()));
    }

    conn.execute("UPDATE mailbox_tokens SET revoked_at = ?1 WHERE id = ?2", params![now, token_id])?;

    let new_token = generate_token();
    let new_id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO mailbox_tokens (id, token, identity, label, created_by, created_at, webhook_url, webhook_token)
         VALUES (?1, ?2, ?3, 'rotated', ?3, ?4, ?5, ?6)",
        params![&new_id, &new_token, &identity, &now, webhook_url, &old_token],
    )?;

    cache.clear();
    Ok(new_token)
}

pub fn revoke_token(db: &Db, cache: &AuthCache, token_id: &str, caller: &AuthContext) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let identity: String = conn
        .query_row("SELECT identity FROM mailbox_tokens WHERE id = ?1", params![token_id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| HiveError::NotFound("token not found".to_string()))?;

    if !caller.is_admin && caller.identity != identity {
        return Err(HiveError::Forbidden("admin or token owner required".to_string()));
    }

    let now = chrono::Utc::now().to_rfc3339();
    conn.execute("UPDATE mailbox_tokens SET revoked_at = ?1 WHERE id = ?2", params![now, token_id])?;
    cache.clear();
    Ok(())
}

pub fn create_invite(db: &Db, caller: &AuthContext, input: &crate::models::CreateInvite) -> Result<Invite, HiveError> {
    if !caller.is_admin {
        return Err(HiveError::admin_required());
    }
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    let id = uuid::Uuid::new_v4().to_string();
    let code = generate_short_code();
    let expires_at = input
        .expires_in_hours
        .map(|h| (chrono::Utc::now() + chrono::Duration::hours(h)).to_rfc3339());

    conn.execute(
        "INSERT INTO invites (id, code, identity_hint, is_admin, max_uses, use_count, expires_at, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
        params![&id, &code, &input.identity_hint, input.is_admin, input.max_uses, &expires_at, &caller.identity, &now],
    )?;

    Ok(Invite {
        id,
        code,
        identity_hint: input.identity_hint.clone(),
        is_admin: input.is_admin,
        max_uses: input.max_uses,
        use_count: 0,
        expires_at,
        created_by: caller.identity.clone(),
        created_at: now,
    })
}

fn generate_short_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_regex_rejects_uppercase_and_leading_digit() {
        assert!(validate_identity("alice").is_ok());
        assert!(validate_identity("alice-2").is_ok());
        assert!(validate_identity("Alice").is_err());
        assert!(validate_identity("2alice").is_err());
        assert!(validate_identity("").is_err());
        assert!(validate_identity(&"a".repeat(51)).is_err());
    }

    #[test]
    fn cache_clear_drops_positive_and_negative_entries() {
        let cache = AuthCache::new(30);
        cache.put("tok", Some(AuthContext { identity: "alice".into(), is_admin: false, source: AuthSource::Database }));
        cache.put("missing", None);
        assert!(cache.get("tok").is_some());
        assert!(cache.get("missing").is_some());
        cache.clear();
        assert!(cache.get("tok").is_none());
        assert!(cache.get("missing").is_none());
    }
}
