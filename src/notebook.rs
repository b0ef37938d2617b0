use crate::db::Db;
use crate::error::HiveError;
use crate::models::{CreatePageInput, NotebookPage, UpdatePageInput};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A character's identity is unique and totally ordered: `(replica, counter)`.
/// Concurrent inserts at the same position are broken by descending id so
/// every replica that applies the same set of ops converges to the same
/// text, independent of delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharId {
    pub replica: u32,
    pub counter: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Elem {
    id: CharId,
    after: Option<CharId>,
    ch: char,
    tombstone: bool,
}

/// A change a client or the server made locally, or received from a peer.
/// Bincode-encoded for the wire: this is the "opaque byte array" the
/// notebook WebSocket protocol forwards between peers verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Op {
    Insert { id: CharId, after: Option<CharId>, ch: char },
    Delete { id: CharId },
}

/// Replicated growable array for plain text. Elements are kept in one
/// global causal order; deletion tombstones rather than removes, so a
/// delete that arrives after concurrent inserts at the same spot still
/// lands correctly. Not optimized for large documents — the index is
/// rebuilt after every mutation, which is the `O(n)` cost this codebase
/// accepts for notebook-page-sized text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RgaDoc {
    elements: Vec<Elem>,
    #[serde(skip)]
    id_index: HashMap<CharId, usize>,
    replica_id: u32,
    counter: u64,
}

impl RgaDoc {
    pub fn new(replica_id: u32) -> Self {
        RgaDoc { elements: Vec::new(), id_index: HashMap::new(), replica_id, counter: 0 }
    }

    /// Seeds a fresh document from persisted plain text, assigning each
    /// character a synthetic id in document order.
    pub fn from_text(replica_id: u32, text: &str) -> Self {
        let mut doc = RgaDoc::new(replica_id);
        let mut after = None;
        for ch in text.chars() {
            let id = CharId { replica: replica_id, counter: doc.counter };
            doc.counter += 1;
            doc.elements.push(Elem { id, after, ch, tombstone: false });
            after = Some(id);
        }
        doc.reindex();
        doc
    }

    fn reindex(&mut self) {
        self.id_index = self.elements.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
    }

    fn insert_at(&mut self, id: CharId, after: Option<CharId>, ch: char) {
        if self.id_index.contains_key(&id) {
            return;
        }
        let mut idx = match after {
            Some(anchor) => self.id_index.get(&anchor).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };
        while idx < self.elements.len() && self.elements[idx].after == after && self.elements[idx].id > id {
            idx += 1;
        }
        self.elements.insert(idx, Elem { id, after, ch, tombstone: false });
        self.reindex();
    }

    fn delete_at(&mut self, id: CharId) {
        if let Some(&idx) = self.id_index.get(&id) {
            self.elements[idx].tombstone = true;
        }
    }

    /// Types one character locally after `after` (None = document start).
    /// Returns the op to broadcast to peers.
    pub fn local_insert(&mut self, after: Option<CharId>, ch: char) -> Op {
        let id = CharId { replica: self.replica_id, counter: self.counter };
        self.counter += 1;
        self.insert_at(id, after, ch);
        Op::Insert { id, after, ch }
    }

    pub fn local_delete(&mut self, id: CharId) -> Op {
        self.delete_at(id);
        Op::Delete { id }
    }

    /// Applies an op received from a peer (or forwarded by the server).
    pub fn apply(&mut self, op: &Op) {
        match *op {
            Op::Insert { id, after, ch } => self.insert_at(id, after, ch),
            Op::Delete { id } => self.delete_at(id),
        }
    }

    pub fn text(&self) -> String {
        self.elements.iter().filter(|e| !e.tombstone).map(|e| e.ch).collect()
    }

    /// Last element id in document order, for appending at the end.
    pub fn last_id(&self) -> Option<CharId> {
        self.elements.iter().rev().find(|e| !e.tombstone).map(|e| e.id)
    }

    pub fn encode_snapshot(&self) -> Vec<u8> {
        bincode::serialize(&self.elements).unwrap_or_default()
    }

    pub fn load_snapshot(replica_id: u32, bytes: &[u8]) -> Option<Self> {
        let elements: Vec<Elem> = bincode::deserialize(bytes).ok()?;
        let counter = elements.iter().map(|e| e.id.counter + 1).max().unwrap_or(0);
        let mut doc = RgaDoc { elements, id_index: HashMap::new(), replica_id, counter };
        doc.reindex();
        Some(doc)
    }
}

pub fn encode_op(op: &Op) -> Vec<u8> {
    bincode::serialize(op).unwrap_or_default()
}

pub fn decode_op(bytes: &[u8]) -> Option<Op> {
    bincode::deserialize(bytes).ok()
}

/// One page's live editing state: the document plus who is currently
/// connected. The save/destroy timers are driven by generation counters
/// rather than cancellable `JoinHandle`s — simpler to reason about under
/// a lock-snapshot-release-then-blocking-write discipline.
pub struct NotebookEntry {
    pub doc: RgaDoc,
    pub peers: Vec<String>,
    pub save_generation: u64,
    pub destroy_generation: u64,
}

impl NotebookEntry {
    fn new(replica_id: u32, content: &str) -> Self {
        NotebookEntry { doc: RgaDoc::from_text(replica_id, content), peers: Vec::new(), save_generation: 0, destroy_generation: 0 }
    }
}

#[derive(Default)]
pub struct NotebookRegistry {
    docs: Mutex<HashMap<String, Arc<Mutex<NotebookEntry>>>>,
    next_replica_id: Mutex<u32>,
}

impl NotebookRegistry {
    pub fn new() -> Self {
        NotebookRegistry { docs: Mutex::new(HashMap::new()), next_replica_id: Mutex::new(1) }
    }

    fn fresh_replica_id(&self) -> u32 {
        let mut next = self.next_replica_id.lock().unwrap();
        let id = *next;
        *next += 1;
        id
    }

    /// Lazily allocates a doc entry seeded from `content` if none exists yet.
    /// Returns the entry handle; the caller is responsible for registering
    /// itself as a peer.
    pub fn get_or_create(&self, page_id: &str, content: &str) -> Arc<Mutex<NotebookEntry>> {
        let mut docs = self.docs.lock().unwrap();
        docs.entry(page_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(NotebookEntry::new(self.fresh_replica_id(), content))))
            .clone()
    }

    /// Removes the entry if it is still present and still empty. Called
    /// from the destroy timer; a racing reconnect within the 10s window
    /// bumps `destroy_generation` so this is a no-op.
    pub fn remove_if_empty(&self, page_id: &str, expected_generation: u64) {
        let mut docs = self.docs.lock().unwrap();
        if let Some(entry) = docs.get(page_id) {
            let guard = entry.lock().unwrap();
            if guard.peers.is_empty() && guard.destroy_generation == expected_generation {
                drop(guard);
                docs.remove(page_id);
            }
        }
    }
}

fn row_to_page(row: &Row) -> rusqlite::Result<NotebookPage> {
    Ok(NotebookPage {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_by: row.get(3)?,
        tagged_users: row.get(4)?,
        tags: row.get(5)?,
        locked: row.get(6)?,
        locked_by: row.get(7)?,
        expires_at: row.get(8)?,
        review_at: row.get(9)?,
        archived_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const PAGE_COLUMNS: &str = "id, title, content, created_by, tagged_users, tags, locked, locked_by, \
    expires_at, review_at, archived_at, updated_at";

/// Persisted notebook pages, keyed by the same `id` the WebSocket protocol
/// addresses via `?page=`. CRUD here is plain request/response; the live
/// collaborative document (`NotebookRegistry`) is a separate in-memory layer
/// seeded from `content` on first connect and flushed back to it on save.
pub fn create_page(db: &Db, creator: &str, input: &CreatePageInput) -> Result<NotebookPage, HiveError> {
    let conn = db.conn.lock().unwrap();
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let tagged_users = serde_json::to_string(&input.tagged_users).ok();
    let tags = serde_json::to_string(&input.tags).ok();

    conn.execute(
        "INSERT INTO notebook_pages (id, title, content, created_by, tagged_users, tags, locked, updated_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
        params![&id, &input.title, &input.content, creator, &tagged_users, &tags, &now],
    )?;
    conn.query_row(&format!("SELECT {PAGE_COLUMNS} FROM notebook_pages WHERE id = ?1"), params![&id], row_to_page)
        .map_err(|e| e.into())
}

pub fn list_pages(db: &Db, include_archived: bool) -> Result<Vec<NotebookPage>, HiveError> {
    let conn = db.conn.lock().unwrap();
    let sql = format!("SELECT {PAGE_COLUMNS} FROM notebook_pages WHERE ?1 OR archived_at IS NULL ORDER BY updated_at DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![include_archived], row_to_page)?.filter_map(|r| r.ok()).collect();
    Ok(rows)
}

pub fn get_page(db: &Db, id: &str) -> Result<NotebookPage, HiveError> {
    let conn = db.conn.lock().unwrap();
    conn.query_row(&format!("SELECT {PAGE_COLUMNS} FROM notebook_pages WHERE id = ?1"), params![id], row_to_page)
        .optional()?
        .ok_or_else(|| HiveError::NotFound("page not found".to_string()))
}

/// `locked` and `lockedBy` move together: setting `locked` to `false` always
/// clears `lockedBy`, setting it to `true` stamps the caller as the locker.
pub fn update_page(db: &Db, id: &str, actor: &str, input: &UpdatePageInput) -> Result<NotebookPage, HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    let tagged_users = input.tagged_users.as_ref().and_then(|v| serde_json::to_string(v).ok());
    let tags = input.tags.as_ref().and_then(|v| serde_json::to_string(v).ok());
    let locked_by = input.locked.map(|locked| if locked { Some(actor.to_string()) } else { None });

    let changed = conn.execute(
        "UPDATE notebook_pages SET
            title = COALESCE(?2, title), content = COALESCE(?3, content),
            locked = COALESCE(?4, locked), locked_by = ?5,
            tagged_users = COALESCE(?6, tagged_users), tags = COALESCE(?7, tags),
            expires_at = COALESCE(?8, expires_at), review_at = COALESCE(?9, review_at),
            updated_at = ?10
         WHERE id = ?1",
        params![id, input.title, input.content, input.locked, locked_by.flatten(), tagged_users, tags,
            input.expires_at, input.review_at, &now],
    )?;
    if changed == 0 {
        return Err(HiveError::NotFound("page not found".to_string()));
    }
    get_page(db, id)
}

pub fn archive_page(db: &Db, id: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute("UPDATE notebook_pages SET archived_at = ?1 WHERE id = ?2", params![now, id])?;
    if changed == 0 {
        return Err(HiveError::NotFound("page not found".to_string()));
    }
    Ok(())
}

/// Overwrites persisted content directly, bypassing the in-memory CRDT doc.
/// Racy against an active WebSocket session by design (see protocol notes):
/// the next save-debounce tick from that session will clobber this write.
pub fn save_content(db: &Db, id: &str, content: &str) -> Result<(), HiveError> {
    let conn = db.conn.lock().unwrap();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute("UPDATE notebook_pages SET content = ?1, updated_at = ?2 WHERE id = ?3", params![content, now, id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_round_trip_through_text() {
        let mut doc = RgaDoc::new(1);
        let op_h = doc.local_insert(None, 'h');
        let id_h = match op_h {
            Op::Insert { id, .. } => id,
            _ => unreachable!(),
        };
        doc.local_insert(Some(id_h), 'i');
        assert_eq!(doc.text(), "hi");

        doc.local_delete(id_h);
        assert_eq!(doc.text(), "i");
    }

    #[test]
    fn concurrent_inserts_at_same_anchor_converge() {
        let mut a = RgaDoc::from_text(1, "ab");
        let mut b = a.clone();

        let anchor = a.last_id();
        // Two replicas insert different characters after the same anchor,
        // concurrently, without seeing each other's op yet.
        let mut a2 = RgaDoc { replica_id: 2, counter: 0, ..a.clone() };
        let op_from_2 = a2.local_insert(anchor, 'x');
        let op_from_1 = a.local_insert(anchor, 'y');

        a.apply(&op_from_2);
        b.apply(&op_from_1);
        b.apply(&op_from_2);

        assert_eq!(a.text(), b.text());
    }

    #[test]
    fn snapshot_round_trips() {
        let doc = RgaDoc::from_text(1, "hello");
        let bytes = doc.encode_snapshot();
        let restored = RgaDoc::load_snapshot(1, &bytes).unwrap();
        assert_eq!(restored.text(), "hello");
    }

    #[test]
    fn op_encoding_round_trips() {
        let op = Op::Insert { id: CharId { replica: 1, counter: 0 }, after: None, ch: 'z' };
        let bytes = encode_op(&op);
        let decoded = decode_op(&bytes).unwrap();
        match decoded {
            Op::Insert { ch, .. } => assert_eq!(ch, 'z'),
            _ => panic!("wrong variant"),
        }
    }
}
