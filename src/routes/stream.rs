use crate::auth::AuthContext;
use crate::clock::SystemClock;
use crate::config::HiveConfig;
use crate::db::Db;
use crate::events::{EventBus, HiveEvent, CHANNEL_BROADCAST, CHANNEL_CHAT, CHANNEL_SWARM, CHANNEL_WAKE};
use crate::presence::PresenceTracker;
use rocket::response::stream::{Event, EventStream};
use rocket::{get, State};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};

/// The gateway SSE connection: five subscriptions (the identity's own
/// channel plus the four reserved globals), a 30s heartbeat that also
/// refreshes presence, and a 30-minute wake pulse. `__wake__` events
/// targeting this identity trigger an out-of-band pulse on top of the
/// timer, so an ingest/mailbox write can wake a sleeping client immediately
/// instead of waiting out the interval.
/// `token` isn't a declared route parameter: `AuthContext`'s request guard
/// already reads `?token=` itself (see `bearer_token` in `auth.rs`), since
/// `EventSource` cannot attach an `Authorization` header.
#[get("/api/stream")]
pub fn stream(
    _rl: super::RateLimited,
    db: &State<std::sync::Arc<Db>>,
    bus: &State<std::sync::Arc<EventBus>>,
    presence: &State<std::sync::Arc<PresenceTracker>>,
    config: &State<HiveConfig>,
    ctx: AuthContext,
) -> EventStream![] {
    let identity = ctx.identity.clone();
    presence.touch(&identity, "sse");

    let mut rx_self = bus.subscribe(&identity);
    let mut rx_broadcast = bus.subscribe(CHANNEL_BROADCAST);
    let mut rx_swarm = bus.subscribe(CHANNEL_SWARM);
    let mut rx_chat = bus.subscribe(CHANNEL_CHAT);
    let mut rx_wake = bus.subscribe(CHANNEL_WAKE);

    let db = std::sync::Arc::clone(db.inner());
    let presence = std::sync::Arc::clone(presence.inner());
    let base_url = config.base_url.clone();
    let heartbeat_secs = config.sse_heartbeat_secs;
    let wake_pulse_secs = config.sse_wake_pulse_secs;

    EventStream! {
        yield Event::json(&serde_json::json!({"identity": identity})).event("connected");

        let mut heartbeat = interval(Duration::from_secs(heartbeat_secs));
        let mut wake_pulse = interval(Duration::from_secs(wake_pulse_secs));

        loop {
            tokio::select! {
                msg = rx_self.recv() => {
                    match msg {
                        Ok(HiveEvent::Message(m)) => yield Event::json(&m).event("message"),
                        Ok(HiveEvent::ChatMessage { ref message, .. }) => yield Event::json(message).event("chat_message"),
                        Ok(HiveEvent::WakePulse { .. }) => {
                            if let Ok(payload) = crate::wake::get_wake_items(&db, &presence, &SystemClock, base_url.as_deref(), &identity, false) {
                                yield Event::json(&payload).event("wake_pulse");
                            }
                        }
                        Err(RecvError::Closed) => break,
                        _ => {}
                    }
                }
                msg = rx_broadcast.recv() => {
                    if let Ok(HiveEvent::Broadcast(ref event)) = msg {
                        yield Event::json(event).event("broadcast");
                    } else if matches!(msg, Err(RecvError::Closed)) {
                        break;
                    }
                }
                msg = rx_swarm.recv() => {
                    match msg {
                        Ok(HiveEvent::SwarmTaskCreated(ref t)) => yield Event::json(t).event("swarm_task_created"),
                        Ok(HiveEvent::SwarmTaskUpdated(ref t)) => yield Event::json(t).event("swarm_task_updated"),
                        Ok(HiveEvent::SwarmTaskDeleted { ref id }) => yield Event::json(&serde_json::json!({"id": id})).event("swarm_task_deleted"),
                        Err(RecvError::Closed) => break,
                        _ => {}
                    }
                }
                msg = rx_chat.recv() => {
                    match msg {
                        Ok(HiveEvent::ChatMessage { ref recipient, ref message, .. }) if recipient == &identity => {
                            yield Event::json(message).event("chat_message");
                        }
                        Ok(HiveEvent::ChatTyping { ref channel_id, identity: ref typist }) => {
                            yield Event::json(&serde_json::json!({"channelId": channel_id, "identity": typist})).event("chat_typing");
                        }
                        Err(RecvError::Closed) => break,
                        _ => {}
                    }
                }
                msg = rx_wake.recv() => {
                    match msg {
                        Ok(HiveEvent::WakePulse { identity: ref target }) if target == &identity => {
                            if let Ok(payload) = crate::wake::get_wake_items(&db, &presence, &SystemClock, base_url.as_deref(), &identity, false) {
                                yield Event::json(&payload).event("wake_pulse");
                            }
                        }
                        Err(RecvError::Closed) => break,
                        _ => {}
                    }
                }
                _ = heartbeat.tick() => {
                    presence.touch(&identity, "sse");
                    yield Event::comment("heartbeat");
                }
                _ = wake_pulse.tick() => {
                    if let Ok(payload) = crate::wake::get_wake_items(&db, &presence, &SystemClock, base_url.as_deref(), &identity, false) {
                        yield Event::json(&payload).event("wake_pulse");
                    }
                }
            }
        }

        // Cleanup: dropping the receivers above (when the generator itself
        // drops at stream end) is the only unsubscribe step needed — a
        // `tokio::sync::broadcast::Receiver` deregisters on `Drop`.
    }
}
