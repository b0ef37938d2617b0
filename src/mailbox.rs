use crate::db::Db;
use crate::error::HiveError;
use crate::events::{EventBus, HiveEvent};
use crate::models::{MailboxMessage, MessagePage, ReplyInput, SendMessageInput};
use rusqlite::{params, OptionalExtension, Row};

fn row_to_message(row: &Row) -> rusqlite::Result<MailboxMessage> {
    let metadata: Option<String> = row.get(11)?;
    Ok(MailboxMessage {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        status: row.get(5)?,
        urgent: row.get(6)?,
        created_at: row.get(7)?,
        viewed_at: row.get(8)?,
        thread_id: row.get(9)?,
        reply_to_message_id: row.get(10)?,
        dedupe_key: row.get(12)?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        response_waiting: row.get(13)?,
        waiting_responder: row.get(14)?,
        waiting_since: row.get(15)?,
    })
}

const SELECT_COLUMNS: &str = "id, sender, recipient, title, body, status, urgent, created_at, viewed_at, \
    thread_id, reply_to_message_id, metadata, dedupe_key, response_waiting, waiting_responder, waiting_since";

/// Inserts a message. When `dedupeKey` is set, a conflicting insert is
/// treated as idempotent: the pre-existing row is returned rather than an
/// error, so concurrent senders racing on the same dedupe key never fail.
pub fn send(
    db: &Db,
    bus: &EventBus,
    sender: &str,
    recipient: &str,
    input: &SendMessageInput,
) -> Result<MailboxMessage, HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    let metadata_str = input.metadata.as_ref().map(|v| v.to_string());

    conn.execute(
        "INSERT INTO mailbox_messages (sender, recipient, title, body, status, urgent, created_at, dedupe_key, metadata)
         VALUES (?1, ?2, ?3, ?4, 'unread', ?5, ?6, ?7, ?8)
         ON CONFLICT (sender, recipient, dedupe_key) WHERE dedupe_key IS NOT NULL DO NOTHING",
        params![sender, recipient, &input.title, &input.body, input.urgent, &now, &input.dedupe_key, &metadata_str],
    )?;

    let row: MailboxMessage = if let Some(ref key) = input.dedupe_key {
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM mailbox_messages WHERE sender = ?1 AND recipient = ?2 AND dedupe_key = ?3"),
            params![sender, recipient, key],
            row_to_message,
        )?
    } else {
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM mailbox_messages WHERE rowid = last_insert_rowid()"),
            [],
            row_to_message,
        )?
    };

    drop(conn);

    bus.emit(recipient, HiveEvent::Message(row.clone()));
    // Webhook dispatch is triggered by the route handler, which holds the
    // managed `WebhookConfigCache`/HTTP client this module doesn't.

    Ok(row)
}

pub fn list(db: &Db, recipient: &str, status: Option<&str>, limit: i64, cursor: Option<i64>) -> Result<MessagePage, HiveError> {
    let limit = limit.clamp(1, 100);
    let conn = db.conn.lock().unwrap();

    let (order_by, where_cursor) = if status == Some("unread") {
        ("urgent DESC, created_at ASC", "id > ?3")
    } else {
        ("created_at DESC", "id < ?3")
    };
    let cursor_val = cursor.unwrap_or(if status == Some("unread") { 0 } else { i64::MAX });

    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM mailbox_messages
         WHERE recipient = ?1 AND (?2 IS NULL OR status = ?2) AND {where_cursor}
         ORDER BY {order_by} LIMIT ?4"
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut messages: Vec<MailboxMessage> = stmt
        .query_map(params![recipient, status, cursor_val, limit + 1], row_to_message)?
        .filter_map(|r| r.ok())
        .collect();

    let next_cursor = if messages.len() as i64 > limit {
        messages.pop();
        messages.last().map(|m| m.id)
    } else {
        None
    };

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM mailbox_messages WHERE recipient = ?1 AND (?2 IS NULL OR status = ?2)",
        params![recipient, status],
        |r| r.get(0),
    )?;

    Ok(MessagePage { messages, total, next_cursor })
}

pub fn ack(db: &Db, id: i64) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE mailbox_messages SET status = 'read', viewed_at = COALESCE(viewed_at, ?1) WHERE id = ?2",
        params![now, id],
    )?;
    if changed == 0 {
        return Err(HiveError::NotFound("message not found".to_string()));
    }
    Ok(())
}

pub fn reply(db: &Db, bus: &EventBus, sender: &str, original_id: i64, input: &ReplyInput) -> Result<MailboxMessage, HiveError> {
    let conn = db.conn.lock().unwrap();
    let original: (String, String, String, Option<String>) = conn
        .query_row(
            "SELECT sender, recipient, title, thread_id FROM mailbox_messages WHERE id = ?1",
            params![original_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?
        .ok_or_else(|| HiveError::NotFound("original message not found".to_string()))?;

    let (original_sender, original_recipient, original_title, thread_id) = original;
    if original_recipient != sender {
        return Err(HiveError::NotFound("original message not found".to_string()));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let title = format!("Re: {original_title}");
    let thread_id = thread_id.unwrap_or_else(|| original_id.to_string());

    conn.execute(
        "INSERT INTO mailbox_messages (sender, recipient, title, body, status, urgent, created_at, thread_id, reply_to_message_id)
         VALUES (?1, ?2, ?3, ?4, 'unread', 0, ?5, ?6, ?7)",
        params![sender, &original_sender, &title, &input.body, &now, &thread_id, original_id],
    )?;

    let row: MailboxMessage = conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM mailbox_messages WHERE rowid = last_insert_rowid()"),
        [],
        row_to_message,
    )?;

    drop(conn);
    bus.emit(&original_sender, HiveEvent::Message(row.clone()));

    Ok(row)
}

pub fn mark_pending(db: &Db, id: i64, responder: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE mailbox_messages SET response_waiting = 1, waiting_responder = ?1, waiting_since = ?2 WHERE id = ?3",
        params![responder, now, id],
    )?;
    if changed == 0 {
        return Err(HiveError::NotFound("message not found".to_string()));
    }
    Ok(())
}

pub fn clear_pending(db: &Db, id: i64) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let changed = conn.execute(
        "UPDATE mailbox_messages SET response_waiting = 0, waiting_responder = NULL, waiting_since = NULL WHERE id = ?1",
        params![id],
    )?;
    if changed == 0 {
        return Err(HiveError::NotFound("message not found".to_string()));
    }
    Ok(())
}

pub fn list_my_pending(db: &Db, responder: &str) -> Result<Vec<MailboxMessage>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM mailbox_messages WHERE response_waiting = 1 AND waiting_responder = ?1 ORDER BY waiting_since ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![responder], row_to_message)?.filter_map(|r| r.ok()).collect();
    Ok(rows)
}

pub fn list_waiting_on_others(db: &Db, sender: &str) -> Result<Vec<MailboxMessage>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM mailbox_messages WHERE response_waiting = 1 AND sender = ?1 ORDER BY waiting_since ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![sender], row_to_message)?.filter_map(|r| r.ok()).collect();
    Ok(rows)
}

pub fn unread_count(db: &Db, recipient: &str) -> Result<i64, HiveError> {
    let conn = db.conn.lock().unwrap();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM mailbox_messages WHERE recipient = ?1 AND status = 'unread'",
        params![recipient],
        |r| r.get(0),
    )?;
    Ok(count)
}
