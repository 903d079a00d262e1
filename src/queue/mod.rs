//! C2: bounded multi-producer/multi-consumer message queue.
//!
//! Connects the HTTP frontend, the idle loop and detached worker tasks. A
//! mutex + condvar protected `VecDeque`, shared via `Arc` between threads.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Entry<T> {
    item: T,
    id: i64,
    enqueued_at: Instant,
}

struct Inner<T> {
    items: VecDeque<Entry<T>>,
}

/// A FIFO queue, optionally id-tagged, shared via `Arc` between threads.
///
/// `shift` returns items in FIFO order *among items matching the requested
/// id*; it never reorders unmatched entries. Pushes never block and always
/// succeed (allocation failure is the only way `push` can fail, and that is
/// fatal to the caller, not to the queue). `id == 0` means "match any".
pub struct Queue<T> {
    name: &'static str,
    state: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> Queue<T> {
    pub fn new(name: &'static str) -> Self {
        Queue {
            name,
            state: Mutex::new(Inner {
                items: VecDeque::new(),
            }),
            not_empty: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Appends `item` tagged with `id`, timestamped now. Never blocks.
    pub fn push(&self, item: T, id: i64) {
        let mut inner = self.state.lock().unwrap();
        inner.items.push_back(Entry {
            item,
            id,
            enqueued_at: Instant::now(),
        });
        self.not_empty.notify_all();
    }

    /// Removes and returns the oldest item whose id matches (`0` = any),
    /// waiting up to `timeout` for one to arrive. Returns `None` on
    /// timeout.
    pub fn shift(&self, timeout: Duration, id: i64) -> Option<T> {
        let mut inner = self.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = inner
                .items
                .iter()
                .position(|e| id == 0 || e.id == id)
            {
                return Some(inner.items.remove(pos).unwrap().item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, timeout_result) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .unwrap();
            inner = guard;
            if timeout_result.timed_out() && inner.items.is_empty() {
                return None;
            }
        }
    }

    /// Returns the current length, waiting up to `timeout` for the queue to
    /// become non-empty first (a maintenance/poll primitive, not a true
    /// blocking read).
    pub fn length(&self, timeout: Duration) -> usize {
        let mut inner = self.state.lock().unwrap();
        if inner.items.is_empty() && !timeout.is_zero() {
            let (guard, _) = self.not_empty.wait_timeout(inner, timeout).unwrap();
            inner = guard;
        }
        inner.items.len()
    }

    /// Drops every entry older than `max_age`. Returns the number expired.
    /// A maintenance call the idle loop drives at each reentry — not a
    /// timer in its own right.
    pub fn expire(&self, max_age: Duration) -> usize {
        let mut inner = self.state.lock().unwrap();
        let now = Instant::now();
        let before = inner.items.len();
        inner
            .items
            .retain(|e| now.saturating_duration_since(e.enqueued_at) < max_age);
        before - inner.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_per_id() {
        let q: Queue<i32> = Queue::new("test");
        q.push(1, 42);
        q.push(2, 7);
        q.push(3, 42);
        assert_eq!(q.shift(Duration::from_millis(10), 42), Some(1));
        assert_eq!(q.shift(Duration::from_millis(10), 42), Some(3));
        assert_eq!(q.shift(Duration::from_millis(10), 7), Some(2));
    }

    #[test]
    fn shift_any_id_is_fifo() {
        let q: Queue<i32> = Queue::new("test");
        q.push(1, 1);
        q.push(2, 2);
        assert_eq!(q.shift(Duration::from_millis(10), 0), Some(1));
        assert_eq!(q.shift(Duration::from_millis(10), 0), Some(2));
    }

    #[test]
    fn shift_timeout_returns_none() {
        let q: Queue<i32> = Queue::new("test");
        let start = Instant::now();
        assert_eq!(q.shift(Duration::from_millis(30), 0), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn expire_bound() {
        let q: Queue<i32> = Queue::new("test");
        q.push(1, 0);
        thread::sleep(Duration::from_millis(20));
        q.push(2, 0);
        let expired = q.expire(Duration::from_millis(10));
        assert_eq!(expired, 1);
        assert_eq!(q.shift(Duration::from_millis(10), 0), Some(2));
    }

    #[test]
    fn push_wakes_waiter() {
        let q: Arc<Queue<i32>> = Arc::new(Queue::new("test"));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.shift(Duration::from_secs(2), 0));
        thread::sleep(Duration::from_millis(20));
        q.push(99, 0);
        assert_eq!(handle.join().unwrap(), Some(99));
    }
}
