//! WebSocket event fan-out.
//!
//! The idle loop is the sole producer: every MPD idle event it decodes,
//! plus its own lifecycle events (`mpd_connected`, `mpd_disconnected`),
//! is turned into a [`Notification`] and broadcast here. `axum`'s
//! websocket handler (C12, `http::ws`) is the only consumer, one
//! `Receiver` per connected browser tab.
use crate::http::jsonrpc::Notification;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Owns the broadcast channel. Cloning is cheap (it clones the sender);
/// every clone can both send and subscribe.
#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        NotificationHub { tx }
    }

    /// Sends a notification to every currently-subscribed websocket. A
    /// send with no subscribers is not an error — a tab that isn't open
    /// simply doesn't see the event.
    pub fn send(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience constructors for each notification method name.
pub fn update_database() -> Notification {
    Notification::new("update_database", serde_json::json!({}))
}

pub fn update_stored_playlist() -> Notification {
    Notification::new("update_stored_playlist", serde_json::json!({}))
}

pub fn update_queue(version: u32, length: u32) -> Notification {
    Notification::new(
        "update_queue",
        serde_json::json!({ "version": version, "length": length }),
    )
}

pub fn update_outputs() -> Notification {
    Notification::new("update_outputs", serde_json::json!({}))
}

pub fn update_options() -> Notification {
    Notification::new("update_options", serde_json::json!({}))
}

pub fn update_last_played() -> Notification {
    Notification::new("update_last_played", serde_json::json!({}))
}

pub fn update_volume(volume: i64) -> Notification {
    Notification::new("update_volume", serde_json::json!({ "volume": volume }))
}

pub fn updatedb_state(state: &str) -> Notification {
    Notification::new("updatedb", serde_json::json!({ "state": state }))
}

pub fn mpd_connected() -> Notification {
    Notification::new("mpd_connected", serde_json::json!({}))
}

pub fn mpd_disconnected() -> Notification {
    Notification::new("mpd_disconnected", serde_json::json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_without_subscribers_does_not_panic() {
        let hub = NotificationHub::new();
        hub.send(update_database());
    }

    #[test]
    fn subscriber_receives_sent_notification() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();
        hub.send(mpd_connected());
        let got = rx.try_recv().unwrap();
        assert_eq!(got.method, "mpd_connected");
    }
}
