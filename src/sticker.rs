//! The sticker backlog.
//!
//! Queued during idle-event handling (played-song scoring, skip
//! detection), drained synchronously inside the idle loop whenever idle
//! is broken. Writes are best-effort: a failed `sticker set` is logged
//! and the job dropped, matching the original's fire-and-forget
//! `mympd_api_sticker_*` calls.
use crate::mpd::MpdClient;
use log::warn;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub enum StickerKind {
    PlayCountIncrement,
    SkipCountIncrement,
    LastPlayedStamp(u64),
    LastSkippedStamp(u64),
}

#[derive(Debug, Clone)]
pub struct StickerJob {
    pub uri: String,
    pub kind: StickerKind,
}

#[derive(Default)]
pub struct StickerBacklog {
    jobs: VecDeque<StickerJob>,
}

impl StickerBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: StickerJob) {
        self.jobs.push_back(job);
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Drains every queued job, issuing one `sticker set` per job.
    /// Returns the number successfully applied.
    pub fn drain(&mut self, client: &mut MpdClient) -> usize {
        let mut applied = 0;
        while let Some(job) = self.jobs.pop_front() {
            let cmd = match &job.kind {
                StickerKind::PlayCountIncrement => {
                    format!("sticker inc \"{}\" \"playCount\" \"1\"", job.uri)
                }
                StickerKind::SkipCountIncrement => {
                    format!("sticker inc \"{}\" \"skipCount\" \"1\"", job.uri)
                }
                StickerKind::LastPlayedStamp(ts) => {
                    format!("sticker set \"{}\" \"lastPlayed\" \"{ts}\"", job.uri)
                }
                StickerKind::LastSkippedStamp(ts) => {
                    format!("sticker set \"{}\" \"lastSkipped\" \"{ts}\"", job.uri)
                }
            };
            match client.issue_command(&cmd) {
                Ok(_) => applied += 1,
                Err(e) => warn!("sticker job for {} failed, dropping: {e}", job.uri),
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_backlog_order() {
        let mut backlog = StickerBacklog::new();
        backlog.push(StickerJob {
            uri: "a.mp3".into(),
            kind: StickerKind::PlayCountIncrement,
        });
        backlog.push(StickerJob {
            uri: "b.mp3".into(),
            kind: StickerKind::SkipCountIncrement,
        });
        assert_eq!(backlog.len(), 2);
        assert!(!backlog.is_empty());
    }
}
