//! WebSocket protocol for the collaborative notebook, per §4.9: connect at
//! `…/api/notebook/ws?page=<id>&token=<bearer>`, exchange `sync`/`update`/
//! `viewers`/`error` frames.
//!
//! `rocket_ws` is the one realtime primitive in this codebase that isn't
//! Server-Sent Events: the gateway stream (`routes/stream.rs`) is one-way, but
//! the notebook channel needs peers to push edits to each other, so this
//! module owns its own per-page relay over the event bus rather than reusing
//! `routes/stream.rs`'s subscriptions.
use crate::auth::{self, AuthCache, AuthContext};
use crate::config::HiveConfig;
use crate::db::Db;
use crate::events::{notebook_channel, EventBus, HiveEvent};
use crate::notebook::{self, NotebookEntry, NotebookRegistry};
use futures::{SinkExt, StreamExt};
use rocket::{get, State};
use rocket_ws::frame::{CloseCode, CloseFrame};
use rocket_ws::{Message, WebSocket};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Update { update: Vec<u8> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    Error { message: &'a str },
    Sync { update: Vec<u8> },
    Viewers { viewers: Vec<String> },
    Update { update: Vec<u8> },
}

fn text(msg: &ServerMessage) -> Message {
    Message::Text(serde_json::to_string(msg).unwrap_or_default())
}

/// Sends the in-band JSON error frame, then a close frame carrying one of the
/// protocol's reserved codes (4000 missing params, 4001 unauthorized, 4004
/// page not found). This has to happen from inside the already-upgraded
/// channel: an `AuthContext` request guard would reject the HTTP upgrade
/// outright and never give the client a chance to read the JSON reason.
async fn reject<S>(stream: &mut S, message: &str, code: u16) -> rocket_ws::result::Result<()>
where
    S: futures::Sink<Message, Error = rocket_ws::result::Error> + Unpin,
{
    stream.send(text(&ServerMessage::Error { message })).await?;
    stream
        .send(Message::Close(Some(CloseFrame { code: CloseCode::Library(code), reason: message.into() })))
        .await?;
    Ok(())
}

fn dedup_viewers(peers: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    peers.iter().filter(|p| seen.insert((*p).clone())).cloned().collect()
}

#[get("/api/notebook/ws?<page>&<token>")]
pub fn notebook_ws(
    _rl: crate::routes::RateLimited,
    ws: WebSocket,
    db: &State<Arc<Db>>,
    config: &State<HiveConfig>,
    cache: &State<Arc<AuthCache>>,
    registry: &State<Arc<NotebookRegistry>>,
    bus: &State<Arc<EventBus>>,
    page: Option<String>,
    token: Option<String>,
) -> rocket_ws::Channel<'static> {
    let db = Arc::clone(db.inner());
    let config = config.inner().clone();
    let cache = Arc::clone(cache.inner());
    let registry = Arc::clone(registry.inner());
    let bus = Arc::clone(bus.inner());

    ws.channel(move |mut stream| {
        Box::pin(async move {
            let (Some(page_id), Some(token)) = (page, token) else {
                return reject(&mut stream, "page and token query parameters are required", 4000).await;
            };

            let Some(ctx) = auth::authenticate(&db, &config, &cache, &token) else {
                return reject(&mut stream, "Unauthorized", 4001).await;
            };

            let page_row = match notebook::get_page(&db, &page_id) {
                Ok(p) => p,
                Err(_) => return reject(&mut stream, "Page not found", 4004).await,
            };

            run_session(&mut stream, db, registry, bus, page_id, page_row.content, ctx).await
        })
    })
}

async fn run_session<S>(
    stream: &mut S,
    db: Arc<Db>,
    registry: Arc<NotebookRegistry>,
    bus: Arc<EventBus>,
    page_id: String,
    initial_content: String,
    ctx: AuthContext,
) -> rocket_ws::result::Result<()>
where
    S: futures::Stream<Item = rocket_ws::result::Result<Message>> + futures::Sink<Message, Error = rocket_ws::result::Error> + Unpin,
{
    let channel = notebook_channel(&page_id);
    let mut rx = bus.subscribe(&channel);
    let peer_id = uuid::Uuid::new_v4().to_string();

    let entry = registry.get_or_create(&page_id, &initial_content);

    let snapshot = {
        let mut guard = entry.lock().unwrap();
        guard.peers.push(ctx.identity.clone());
        guard.doc.encode_snapshot()
    };
    stream.send(text(&ServerMessage::Sync { update: snapshot })).await?;
    broadcast_viewers(&bus, &channel, &page_id, &entry);

    let result = session_loop(stream, &mut rx, &db, &bus, &channel, &page_id, &entry, &peer_id, &ctx).await;

    let remaining = {
        let mut guard = entry.lock().unwrap();
        if let Some(pos) = guard.peers.iter().position(|p| p == &ctx.identity) {
            guard.peers.remove(pos);
        }
        guard.peers.is_empty()
    };
    broadcast_viewers(&bus, &channel, &page_id, &entry);
    if remaining {
        schedule_destroy(db, registry, entry, page_id);
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn session_loop<S>(
    stream: &mut S,
    rx: &mut tokio::sync::broadcast::Receiver<HiveEvent>,
    db: &Arc<Db>,
    bus: &Arc<EventBus>,
    channel: &str,
    page_id: &str,
    entry: &Arc<Mutex<NotebookEntry>>,
    peer_id: &str,
    ctx: &AuthContext,
) -> rocket_ws::result::Result<()>
where
    S: futures::Stream<Item = rocket_ws::result::Result<Message>> + futures::Sink<Message, Error = rocket_ws::result::Error> + Unpin,
{
    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(raw))) => {
                        if let Ok(ClientMessage::Update { update }) = serde_json::from_str(&raw) {
                            handle_update(stream, db, bus, channel, page_id, entry, peer_id, ctx, update).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err),
                }
            }
            msg = rx.recv() => {
                match msg {
                    Ok(HiveEvent::NotebookUpdate { page_id: ref pid, ref update, ref from_peer })
                        if pid == page_id && from_peer != peer_id =>
                    {
                        stream.send(text(&ServerMessage::Update { update: update.clone() })).await?;
                    }
                    Ok(HiveEvent::NotebookViewers { page_id: ref pid, ref viewers }) if pid == page_id => {
                        stream.send(text(&ServerMessage::Viewers { viewers: viewers.clone() })).await?;
                    }
                    Err(RecvError::Closed) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_update<S>(
    stream: &mut S,
    db: &Arc<Db>,
    bus: &Arc<EventBus>,
    channel: &str,
    page_id: &str,
    entry: &Arc<Mutex<NotebookEntry>>,
    peer_id: &str,
    ctx: &AuthContext,
    update: Vec<u8>,
) -> rocket_ws::result::Result<()>
where
    S: futures::Sink<Message, Error = rocket_ws::result::Error> + Unpin,
{
    let page_row = match notebook::get_page(db, page_id) {
        Ok(p) => p,
        Err(_) => return Ok(()),
    };
    if page_row.archived_at.is_some() {
        stream.send(text(&ServerMessage::Error { message: "Page is archived" })).await?;
        return Ok(());
    }
    if page_row.locked && page_row.locked_by.as_deref() != Some(ctx.identity.as_str()) && !ctx.is_admin {
        stream.send(text(&ServerMessage::Error { message: "Page is locked" })).await?;
        return Ok(());
    }

    let Some(op) = notebook::decode_op(&update) else { return Ok(()) };
    {
        let mut guard = entry.lock().unwrap();
        guard.doc.apply(&op);
    }
    bus.emit(
        channel,
        HiveEvent::NotebookUpdate { page_id: page_id.to_string(), update, from_peer: peer_id.to_string() },
    );
    schedule_save(Arc::clone(db), Arc::clone(entry), page_id.to_string());
    Ok(())
}

fn broadcast_viewers(bus: &EventBus, channel: &str, page_id: &str, entry: &Arc<Mutex<NotebookEntry>>) {
    let viewers = {
        let guard = entry.lock().unwrap();
        dedup_viewers(&guard.peers)
    };
    bus.emit(channel, HiveEvent::NotebookViewers { page_id: page_id.to_string(), viewers });
}

/// Debounced persistence: restart-on-each-update is modeled with a
/// generation counter rather than a cancellable timer handle. Every update
/// bumps `save_generation` and spawns a 5s sleeper; when it wakes, only the
/// sleeper spawned by the *last* update still sees its own generation,
/// so only it performs the write.
fn schedule_save(db: Arc<Db>, entry: Arc<Mutex<NotebookEntry>>, page_id: String) {
    let generation = {
        let mut guard = entry.lock().unwrap();
        guard.save_generation += 1;
        guard.save_generation
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let (content, current) = {
            let guard = entry.lock().unwrap();
            (guard.doc.text(), guard.save_generation)
        };
        if current != generation {
            return;
        }
        if let Err(err) = notebook::save_content(&db, &page_id, &content) {
            tracing::warn!(error = %err, page_id = %page_id, "failed to persist notebook page");
        }
    });
}

/// Mirrors `schedule_save`'s generation-counter debounce: a peer count of
/// zero starts a 10s eviction timer. A reconnect within the window makes
/// `peers` non-empty again, so the timer's `remove_if_empty` check is a
/// no-op; it flushes one last save before evicting so a page that nobody is
/// editing never loses its last few keystrokes.
fn schedule_destroy(db: Arc<Db>, registry: Arc<NotebookRegistry>, entry: Arc<Mutex<NotebookEntry>>, page_id: String) {
    let generation = {
        let mut guard = entry.lock().unwrap();
        guard.destroy_generation += 1;
        guard.destroy_generation
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let (still_empty, text) = {
            let guard = entry.lock().unwrap();
            (guard.peers.is_empty() && guard.destroy_generation == generation, guard.doc.text())
        };
        if !still_empty {
            return;
        }
        if let Err(err) = notebook::save_content(&db, &page_id, &text) {
            tracing::warn!(error = %err, page_id = %page_id, "failed to flush notebook page before eviction");
        }
        registry.remove_if_empty(&page_id, generation);
    });
}
