//! C6: the timer wheel.
//!
//! Driven entirely by the idle loop's own polling wake-ups — there is no
//! OS timer here, only a `tick(now)` the loop calls at each reentry.
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub struct TimerEntry<H> {
    pub fire_at: Instant,
    /// `None` means one-shot.
    pub period: Option<Duration>,
    pub handler: H,
}

/// Timers keyed by a stable id, `replace(id, ...)` overwrites in place.
///
/// Entries are kept in a `BTreeMap` so `tick` can visit due entries in
/// ascending id order without a separate sort, which keeps firing order
/// deterministic for tests.
pub struct TimerWheel<H> {
    entries: BTreeMap<i64, TimerEntry<H>>,
}

impl<H> Default for TimerWheel<H> {
    fn default() -> Self {
        TimerWheel {
            entries: BTreeMap::new(),
        }
    }
}

impl<H> TimerWheel<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, id: i64, timeout: Duration, period: Option<Duration>, handler: H) {
        self.entries.insert(
            id,
            TimerEntry {
                fire_at: Instant::now() + timeout,
                period,
                handler,
            },
        );
    }

    pub fn remove(&mut self, id: i64) {
        self.entries.remove(&id);
    }

    pub fn remove_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reports whether any entry is due at `now`, without rescheduling or
    /// removing anything. Used by the idle loop to decide whether to
    /// leave idle at all before calling the mutating [`TimerWheel::tick`].
    pub fn has_due(&self, now: Instant) -> bool {
        self.entries.values().any(|e| e.fire_at <= now)
    }

    /// Returns the ids of entries due at `now`, in ascending order,
    /// rescheduling interval entries and removing fired one-shots. Does
    /// *not* run handlers itself — the idle loop owns that so handlers can
    /// see the rest of its state.
    pub fn tick(&mut self, now: Instant) -> Vec<i64> {
        let due: Vec<i64> = self
            .entries
            .iter()
            .filter(|(_, e)| e.fire_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            let entry = self.entries.get_mut(id).unwrap();
            match entry.period {
                Some(period) => entry.fire_at = now + period,
                None => {
                    self.entries.remove(id);
                }
            }
        }
        due
    }

    pub fn handler(&self, id: i64) -> Option<&H> {
        self.entries.get(&id).map(|e| &e.handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_ascending_id_order() {
        let mut wheel: TimerWheel<&'static str> = TimerWheel::new();
        let past = Duration::from_secs(0);
        wheel.replace(5, past, None, "five");
        wheel.replace(1, past, None, "one");
        wheel.replace(3, past, None, "three");
        let due = wheel.tick(Instant::now() + Duration::from_millis(1));
        assert_eq!(due, vec![1, 3, 5]);
    }

    #[test]
    fn one_shot_removed_interval_rescheduled() {
        let mut wheel: TimerWheel<()> = TimerWheel::new();
        wheel.replace(1, Duration::ZERO, None, ());
        wheel.replace(2, Duration::ZERO, Some(Duration::from_secs(30)), ());
        let now = Instant::now() + Duration::from_millis(1);
        let due = wheel.tick(now);
        assert_eq!(due, vec![1, 2]);
        assert!(wheel.handler(1).is_none());
        assert!(wheel.handler(2).is_some());
        assert!(wheel.tick(now).is_empty());
    }

    #[test]
    fn replace_overwrites_existing_id() {
        let mut wheel: TimerWheel<&'static str> = TimerWheel::new();
        wheel.replace(1, Duration::ZERO, None, "first");
        wheel.replace(1, Duration::from_secs(60), None, "second");
        assert_eq!(wheel.tick(Instant::now() + Duration::from_millis(1)), Vec::<i64>::new());
        assert_eq!(*wheel.handler(1).unwrap(), "second");
    }
}
