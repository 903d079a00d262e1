//! The last-played ring and its append-only log.
//!
//! spec.md §3 "Last-played record", §4.10: an in-memory ring of up to N
//! entries, flushed to `state/last_played` once it exceeds 9 entries or
//! the configured keep-count. Resolves the Open Question in spec.md §9
//! about the original's unclear tail-append behavior on a truncated old
//! file: reimplemented here as a plain append-only log, corrupted lines
//! skipped on read (decision recorded in DESIGN.md).
use crate::state_files;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const RING_FLUSH_THRESHOLD: usize = 9;

#[derive(Debug, Clone)]
pub struct LastPlayedRecord {
    pub uri: String,
    pub played_at: SystemTime,
}

pub struct LastPlayedRing {
    ring: VecDeque<LastPlayedRecord>,
    keep_count: usize,
}

impl LastPlayedRing {
    pub fn new(keep_count: usize) -> Self {
        LastPlayedRing {
            ring: VecDeque::new(),
            keep_count,
        }
    }

    /// Appends a play event, flushing to `workdir/state/last_played` once
    /// the ring exceeds 9 entries or `keep_count`, whichever is smaller.
    pub fn push(&mut self, workdir: &Path, uri: &str, played_at: SystemTime) {
        self.ring.push_back(LastPlayedRecord {
            uri: uri.to_owned(),
            played_at,
        });
        let threshold = RING_FLUSH_THRESHOLD.min(self.keep_count.max(1));
        if self.ring.len() > threshold {
            self.flush(workdir);
        }
    }

    fn flush(&mut self, workdir: &Path) {
        while let Some(rec) = self.ring.pop_front() {
            let secs = rec
                .played_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let line = format!("{secs}::{}", rec.uri);
            if let Err(e) = state_files::append_line(workdir, "state", "last_played", &line) {
                log::warn!("failed to flush last-played entry for {}: {e}", rec.uri);
            }
        }
    }

    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }
}

/// Reads the persisted log, skipping corrupted lines, most recent first,
/// capped at `keep_count`.
pub fn read_log(workdir: &Path, keep_count: usize) -> Vec<LastPlayedRecord> {
    let path = workdir.join("state/last_played");
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    let mut out: Vec<LastPlayedRecord> = Vec::new();
    for line in content.lines() {
        let Some((secs, uri)) = line.split_once("::") else {
            log::warn!("skipping corrupted last-played line: {line:?}");
            continue;
        };
        let Ok(secs) = secs.parse::<u64>() else {
            log::warn!("skipping corrupted last-played line: {line:?}");
            continue;
        };
        out.push(LastPlayedRecord {
            uri: uri.to_owned(),
            played_at: UNIX_EPOCH + std::time::Duration::from_secs(secs),
        });
    }
    out.reverse();
    out.truncate(keep_count);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn flush_triggers_past_threshold() {
        let dir = tempdir().unwrap();
        let mut ring = LastPlayedRing::new(50);
        for i in 0..10 {
            ring.push(dir.path(), &format!("song{i}.mp3"), SystemTime::now());
        }
        assert_eq!(ring.ring_len(), 0);
        let log = read_log(dir.path(), 50);
        assert_eq!(log.len(), 10);
        assert_eq!(log[0].uri, "song9.mp3");
    }

    #[test]
    fn corrupted_lines_are_skipped() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("state")).unwrap();
        std::fs::write(
            dir.path().join("state/last_played"),
            "100::good.mp3\nnot-a-valid-line\n200::other.mp3\n",
        )
        .unwrap();
        let log = read_log(dir.path(), 10);
        assert_eq!(log.len(), 2);
    }
}
