//! Jukebox refill triggering.
//!
//! Song *selection* is named an out-of-scope collaborator by spec.md §1
//! ("Jukebox selection itself is outside this core"). What belongs to
//! the idle loop is deciding *when* a refill is due and handing off to
//! that collaborator; this module is that decision plus the named seam
//! a real selection algorithm would plug into.
use std::time::{Duration, SystemTime};

/// `add_time = song_end_time - (crossfade + 10s)`. A refill is due once
/// `now >= add_time` and the queue has fallen to or below `target_length`.
pub fn refill_due(
    now: SystemTime,
    song_end_time: Option<SystemTime>,
    crossfade: Duration,
    queue_length: u32,
    target_length: u32,
) -> bool {
    if queue_length > target_length {
        return false;
    }
    let Some(end) = song_end_time else {
        return queue_length < target_length;
    };
    let add_time = end
        .checked_sub(crossfade + Duration::from_secs(10))
        .unwrap_or(end);
    now >= add_time
}

/// The selection seam: given how many songs are needed, returns the URIs
/// to enqueue. Real rule-based/random selection lives outside this core;
/// this default picks nothing; a deployment wires in its own selector.
pub trait JukeboxSelector {
    fn select(&mut self, needed: u32) -> Vec<String>;
}

pub struct NullSelector;

impl JukeboxSelector for NullSelector {
    fn select(&mut self, _needed: u32) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_once_within_ten_seconds_of_crossfade_adjusted_end() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let end = SystemTime::UNIX_EPOCH + Duration::from_secs(105);
        assert!(refill_due(now, Some(end), Duration::ZERO, 1, 2));
    }

    #[test]
    fn not_due_when_queue_above_target() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(200);
        let end = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        assert!(!refill_due(now, Some(end), Duration::ZERO, 5, 2));
    }

    #[test]
    fn not_due_before_add_time() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let end = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        assert!(!refill_due(now, Some(end), Duration::from_secs(5), 1, 2));
    }
}
