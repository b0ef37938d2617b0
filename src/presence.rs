use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// One identity's presence state. `unread` is not tracked here — it's a
/// point-in-time mailbox query joined in by the route handler.
#[derive(Debug, Clone)]
struct PresenceEntry {
    online: bool,
    last_seen: DateTime<Utc>,
    source: String,
}

/// Flat per-identity presence map, global rather than room-scoped: any
/// authenticated REST call touches `(identity, source="api")`; SSE heartbeats
/// touch `(identity, source="sse")`. A background sweeper downgrades
/// `online=false` after `presence_stale_secs` of silence.
#[derive(Default)]
pub struct PresenceTracker {
    entries: RwLock<HashMap<String, PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        PresenceTracker { entries: RwLock::new(HashMap::new()) }
    }

    pub fn touch(&self, identity: &str, source: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            identity.to_string(),
            PresenceEntry { online: true, last_seen: Utc::now(), source: source.to_string() },
        );
    }

    pub fn status(&self, identity: &str) -> (bool, String, String) {
        let entries = self.entries.read().unwrap();
        match entries.get(identity) {
            Some(e) => (e.online, e.last_seen.to_rfc3339(), e.source.clone()),
            None => (false, Utc::now().to_rfc3339(), "none".to_string()),
        }
    }

    pub fn all(&self) -> HashMap<String, (bool, String, String)> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .map(|(identity, e)| (identity.clone(), (e.online, e.last_seen.to_rfc3339(), e.source.clone())))
            .collect()
    }

    /// Marks entries idle longer than `stale_secs` as offline. Does not
    /// remove them — `last_seen`/`source` remain queryable after going stale.
    pub fn sweep(&self, stale_secs: u64) {
        let mut entries = self.entries.write().unwrap();
        let now = Utc::now();
        for entry in entries.values_mut() {
            if entry.online && (now - entry.last_seen).num_seconds() as u64 > stale_secs {
                entry.online = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_then_status_reports_online() {
        let tracker = PresenceTracker::new();
        tracker.touch("alice", "api");
        let (online, _, source) = tracker.status("alice");
        assert!(online);
        assert_eq!(source, "api");
    }

    #[test]
    fn unknown_identity_reports_offline() {
        let tracker = PresenceTracker::new();
        let (online, _, source) = tracker.status("nobody");
        assert!(!online);
        assert_eq!(source, "none");
    }

    #[test]
    fn sweep_downgrades_stale_entries() {
        let tracker = PresenceTracker::new();
        tracker.touch("alice", "sse");
        {
            let mut entries = tracker.entries.write().unwrap();
            let e = entries.get_mut("alice").unwrap();
            e.last_seen = Utc::now() - chrono::Duration::seconds(999);
        }
        tracker.sweep(120);
        let (online, ..) = tracker.status("alice");
        assert!(!online);
    }
}
