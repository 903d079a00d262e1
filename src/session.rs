//! C10: the PIN-login session store.
//!
//! Grounded in `examples/original_source/src/web_server/sessions.c` in
//! full: `session_new` (10 random bytes, hex-encoded), eviction of
//! expired entries on insert, oldest-entry eviction once over
//! `HTTP_SESSIONS_MAX`, and `session_validate` sliding the expiry forward
//! by 30 minutes on every successful match.
use crate::container::List;
use rand::RngCore;
use std::time::{Duration, SystemTime};

const SESSION_LIFETIME: Duration = Duration::from_secs(1800);

struct SessionEntry {
    hash: String,
    expires_at: SystemTime,
}

/// Session list, guarded by its own mutex ("protected by
/// its own mutex") — the HTTP frontend is the only caller, but it may run
/// handlers concurrently.
pub struct SessionStore {
    entries: std::sync::Mutex<List<SessionEntry>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        SessionStore {
            entries: std::sync::Mutex::new(List::new()),
            max_sessions,
        }
    }

    fn sweep_expired(list: &mut List<SessionEntry>, now: SystemTime) {
        list.retain_count(|e| e.expires_at <= now);
    }

    /// Generates a new 20-hex-char session token, sweeps expired entries,
    /// appends, and evicts the oldest if the list now exceeds the cap.
    pub fn new_session(&self) -> String {
        let mut bytes = [0u8; 10];
        rand::thread_rng().fill_bytes(&mut bytes);
        let hash = hex_encode(&bytes);

        let now = SystemTime::now();
        let mut list = self.entries.lock().unwrap();
        Self::sweep_expired(&mut list, now);
        list.push_back(SessionEntry {
            hash: hash.clone(),
            expires_at: now + SESSION_LIFETIME,
        });
        while list.len() > self.max_sessions {
            list.pop_front();
        }
        hash
    }

    /// Sweeps expired entries, then checks `hash`; on a match, slides the
    /// expiry forward by 30 minutes and returns `true`.
    pub fn validate(&self, hash: &str) -> bool {
        let now = SystemTime::now();
        let mut list = self.entries.lock().unwrap();
        Self::sweep_expired(&mut list, now);
        let found = list
            .iter()
            .position(|e| e.hash == hash)
            .is_some();
        if found {
            // List has no in-place mutate-by-predicate; remove and
            // re-insert with the extended expiry, preserving FIFO order
            // among the rest.
            if let Some(mut e) = list.remove_first(|e| e.hash == hash) {
                e.expires_at = now + SESSION_LIFETIME;
                list.push_back(e);
            }
        }
        found
    }

    pub fn remove(&self, hash: &str) {
        let mut list = self.entries.lock().unwrap();
        list.remove_first(|e| e.hash == hash);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_twenty_hex_chars() {
        let store = SessionStore::new(100);
        let h = store.new_session();
        assert_eq!(h.len(), 20);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_cap_evicts_oldest() {
        let store = SessionStore::new(3);
        let first = store.new_session();
        store.new_session();
        store.new_session();
        let newest = store.new_session();
        assert_eq!(store.len(), 3);
        assert!(!store.validate(&first));
        assert!(store.validate(&newest));
    }

    #[test]
    fn validate_slides_expiry() {
        let store = SessionStore::new(10);
        let h = store.new_session();
        let before = {
            let list = store.entries.lock().unwrap();
            list.iter().find(|e| e.hash == h).unwrap().expires_at
        };
        assert!(store.validate(&h));
        let after = {
            let list = store.entries.lock().unwrap();
            list.iter().find(|e| e.hash == h).unwrap().expires_at
        };
        assert!(after >= before);
    }

    #[test]
    fn remove_drops_session() {
        let store = SessionStore::new(10);
        let h = store.new_session();
        store.remove(&h);
        assert!(!store.validate(&h));
    }
}
