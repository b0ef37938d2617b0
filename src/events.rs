use crate::models::{BroadcastEvent, ChatMessage, MailboxMessage, SwarmTask};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

pub const CHANNEL_BROADCAST: &str = "__broadcast__";
pub const CHANNEL_SWARM: &str = "__swarm__";
pub const CHANNEL_CHAT: &str = "__chat__";
pub const CHANNEL_WAKE: &str = "__wake__";

/// Closed set of event payloads the bus ever carries, represented as a
/// tagged variant rather than dynamically-typed JSON.
#[derive(Debug, Clone)]
pub enum HiveEvent {
    Message(MailboxMessage),
    ChatMessage { channel_id: String, recipient: String, message: ChatMessage },
    ChatTyping { channel_id: String, identity: String },
    Broadcast(BroadcastEvent),
    SwarmTaskCreated(SwarmTask),
    SwarmTaskUpdated(SwarmTask),
    SwarmTaskDeleted { id: String },
    WakePulse { identity: String },
    NotebookUpdate { page_id: String, update: Vec<u8>, from_peer: String },
    NotebookViewers { page_id: String, viewers: Vec<String> },
}

/// Per-page channel name for notebook peer relay, allocated on first
/// subscribe/emit the same way identity channels are: there is no dedicated
/// registration step, the bus just grows a new entry in its map.
pub fn notebook_channel(page_id: &str) -> String {
    format!("__notebook__:{page_id}")
}

/// In-process publish/subscribe hub: a channel-keyed registry of broadcast
/// senders, one per identity plus the four reserved globals (`__broadcast__`,
/// `__swarm__`, `__chat__`, `__wake__`). Per-channel delivery is FIFO from
/// the emitter's thread of control; there is no ordering guarantee across
/// channels.
pub struct EventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<HiveEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus { channels: Mutex::new(HashMap::new()) }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<HiveEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }

    /// Subscribe to a channel, allocating it on first use. Returns a receiver;
    /// dropping it is the "unsubscribe" — there is no separate unsubscribe
    /// handle because `tokio::sync::broadcast` receivers unregister on drop.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<HiveEvent> {
        self.sender_for(channel).subscribe()
    }

    /// Deliver an event to every current subscriber of `channel`. A channel
    /// with no subscribers yet is a no-op: the "no receivers" send error is
    /// swallowed.
    pub fn emit(&self, channel: &str, event: HiveEvent) {
        let channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(channel) {
            let _ = sender.send(event);
        }
    }

    pub fn emit_wake_trigger(&self, identity: &str) {
        self.emit(identity, HiveEvent::WakePulse { identity: identity.to_string() });
        self.emit(CHANNEL_WAKE, HiveEvent::WakePulse { identity: identity.to_string() });
    }
}
