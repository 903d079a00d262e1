//! C7: the trigger registry.
//!
//! Named subscriptions to MPD idle event classes and the internal
//! lifecycle events the idle loop itself emits. Grounded in the same
//! `examples/original_source/src/mympd_api/mympd_api_queue.c` idle-event
//! dispatch the idle loop follows: after handling a bit, every registered
//! trigger whose event class matches is invoked.
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Database,
    StoredPlaylist,
    Queue,
    Player,
    Mixer,
    Output,
    Options,
    Update,
    MympdConnected,
    MympdDisconnected,
    MympdScrobble,
}

#[derive(Debug, Clone)]
pub struct TriggerEntry {
    pub event: Event,
    /// Handler or script id — this core treats it as opaque, matching
    /// spec.md's "script or handler id" (the Lua bridge itself is out of
    /// scope).
    pub handler_id: String,
    pub partition: String,
}

#[derive(Default)]
pub struct TriggerRegistry {
    entries: Vec<TriggerEntry>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: TriggerEntry) {
        self.entries.push(entry);
    }

    pub fn remove(&mut self, handler_id: &str) {
        self.entries.retain(|e| e.handler_id != handler_id);
    }

    /// Returns every trigger scoped to `partition` whose event matches,
    /// in registration order.
    pub fn matching(&self, event: Event, partition: &str) -> Vec<&TriggerEntry> {
        self.entries
            .iter()
            .filter(|e| e.event == event && e.partition == partition)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_filters_by_event_and_partition() {
        let mut reg = TriggerRegistry::new();
        reg.register(TriggerEntry {
            event: Event::Database,
            handler_id: "rebuild-ui".into(),
            partition: "default".into(),
        });
        reg.register(TriggerEntry {
            event: Event::Player,
            handler_id: "scrobbler".into(),
            partition: "default".into(),
        });
        reg.register(TriggerEntry {
            event: Event::Database,
            handler_id: "other-partition".into(),
            partition: "kitchen".into(),
        });

        let hits = reg.matching(Event::Database, "default");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].handler_id, "rebuild-ui");
    }

    #[test]
    fn remove_drops_by_handler_id() {
        let mut reg = TriggerRegistry::new();
        reg.register(TriggerEntry {
            event: Event::Mixer,
            handler_id: "volume-osd".into(),
            partition: "default".into(),
        });
        reg.remove("volume-osd");
        assert!(reg.matching(Event::Mixer, "default").is_empty());
    }
}
