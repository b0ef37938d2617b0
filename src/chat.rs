use crate::db::Db;
use crate::error::HiveError;
use crate::events::{EventBus, HiveEvent, CHANNEL_CHAT};
use crate::models::{ChatChannel, ChatMessage, CreateChannelInput, SendChatMessageInput};
use rusqlite::{params, OptionalExtension};

/// DMs are keyed by the sorted pair of member identities, so `getOrCreateDm`
/// is an upsert against a single unique index instead of a search.
fn dm_key(a: &str, b: &str) -> String {
    let mut pair = [a, b];
    pair.sort();
    format!("{}:{}", pair[0], pair[1])
}

pub fn get_or_create_dm(db: &Db, a: &str, b: &str) -> Result<ChatChannel, HiveError> {
    let conn = db.conn.lock().unwrap();
    let key = dm_key(a, b);

    if let Some(channel) = conn
        .query_row(
            "SELECT id, channel_type, name, created_by, created_at FROM chat_channels WHERE dm_key = ?1",
            params![&key],
            row_to_channel,
        )
        .optional()?
    {
        return Ok(channel);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO chat_channels (id, channel_type, name, dm_key, created_by, created_at) VALUES (?1, 'dm', NULL, ?2, ?3, ?4)
         ON CONFLICT(dm_key) DO NOTHING",
        params![&id, &key, a, &now],
    )?;

    for member in [a, b] {
        conn.execute(
            "INSERT OR IGNORE INTO chat_members (channel_id, identity) VALUES (?1, ?2)",
            params![&id, member],
        )?;
    }

    conn.query_row(
        "SELECT id, channel_type, name, created_by, created_at FROM chat_channels WHERE dm_key = ?1",
        params![&key],
        row_to_channel,
    )
    .map_err(|e| e.into())
}

pub fn create_group(db: &Db, creator: &str, input: &CreateChannelInput) -> Result<ChatChannel, HiveError> {
    let conn = db.conn.lock().unwrap();
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO chat_channels (id, channel_type, name, created_by, created_at) VALUES (?1, 'group', ?2, ?3, ?4)",
        params![&id, &input.name, creator, &now],
    )?;

    conn.execute("INSERT OR IGNORE INTO chat_members (channel_id, identity) VALUES (?1, ?2)", params![&id, creator])?;
    for member in &input.members {
        conn.execute("INSERT OR IGNORE INTO chat_members (channel_id, identity) VALUES (?1, ?2)", params![&id, member])?;
    }

    conn.query_row(
        "SELECT id, channel_type, name, created_by, created_at FROM chat_channels WHERE id = ?1",
        params![&id],
        row_to_channel,
    )
    .map_err(|e| e.into())
}

fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<ChatChannel> {
    Ok(ChatChannel { id: row.get(0)?, channel_type: row.get(1)?, name: row.get(2)?, created_by: row.get(3)?, created_at: row.get(4)? })
}

pub fn list_channels(db: &Db, identity: &str) -> Result<Vec<ChatChannel>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT c.id, c.channel_type, c.name, c.created_by, c.created_at FROM chat_channels c
         JOIN chat_members m ON m.channel_id = c.id WHERE m.identity = ?1 ORDER BY c.created_at DESC",
    )?;
    let rows = stmt.query_map(params![identity], row_to_channel)?.filter_map(|r| r.ok()).collect();
    Ok(rows)
}

fn require_member(conn: &rusqlite::Connection, channel_id: &str, identity: &str) -> Result<(), HiveError> {
    let is_member: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM chat_members WHERE channel_id = ?1 AND identity = ?2)",
            params![channel_id, identity],
            |r| r.get(0),
        )
        .unwrap_or(false);
    if !is_member {
        return Err(HiveError::NotFound("channel not found".to_string()));
    }
    Ok(())
}

/// Returns the created message along with the other channel members, so
/// the route layer (which alone holds the webhook HTTP client/cache) can
/// dispatch delivery webhooks the same way the mailbox send path does.
pub fn send_message(db: &Db, bus: &EventBus, channel_id: &str, sender: &str, input: &SendChatMessageInput) -> Result<(ChatMessage, Vec<String>), HiveError> {
    let conn = db.conn.lock().unwrap();
    require_member(&conn, channel_id, sender)?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO chat_messages (id, channel_id, sender, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, channel_id, sender, &input.body, &now],
    )?;

    let message = ChatMessage { id, channel_id: channel_id.to_string(), sender: sender.to_string(), body: input.body.clone(), created_at: now };

    let mut stmt = conn.prepare("SELECT identity FROM chat_members WHERE channel_id = ?1 AND identity != ?2")?;
    let recipients: Vec<String> = stmt.query_map(params![channel_id, sender], |r| r.get(0))?.filter_map(|r| r.ok()).collect();
    drop(stmt);
    drop(conn);

    for recipient in &recipients {
        bus.emit(recipient, HiveEvent::ChatMessage { channel_id: channel_id.to_string(), recipient: recipient.clone(), message: message.clone() });
    }

    Ok((message, recipients))
}

pub fn list_messages(db: &Db, channel_id: &str, identity: &str, limit: i64) -> Result<Vec<ChatMessage>, HiveError> {
    let conn = db.conn.lock().unwrap();
    require_member(&conn, channel_id, identity)?;
    let limit = limit.clamp(1, 200);
    let mut stmt = conn.prepare(
        "SELECT id, channel_id, sender, body, created_at FROM chat_messages WHERE channel_id = ?1 ORDER BY created_at DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![channel_id, limit], |row| {
            Ok(ChatMessage { id: row.get(0)?, channel_id: row.get(1)?, sender: row.get(2)?, body: row.get(3)?, created_at: row.get(4)? })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn mark_read(db: &Db, channel_id: &str, identity: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    require_member(&conn, channel_id, identity)?;
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE chat_members SET last_read_at = ?1 WHERE channel_id = ?2 AND identity = ?3",
        params![now, channel_id, identity],
    )?;
    Ok(())
}

/// Typing pulses are ephemeral: no persistence, just a bus fan-out on
/// `__chat__` (the SSE gateway relabels it as `chat_typing`).
pub fn notify_typing(db: &Db, bus: &EventBus, channel_id: &str, identity: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    require_member(&conn, channel_id, identity)?;
    drop(conn);
    bus.emit(CHANNEL_CHAT, HiveEvent::ChatTyping { channel_id: channel_id.to_string(), identity: identity.to_string() });
    Ok(())
}
