//! Deterministic debounce core.
//!
//! Events are keyed by (path, kind). The first event for a key starts a
//! window; every further event for the same key before it fires restarts
//! the window and replaces the pending event, so the coalesced trigger
//! carries the last event's timestamp. Time is always passed in, which keeps
//! the core free of timers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use phasegate_types::{FileEvent, FileEventKind};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceStats {
    pub received: u64,
    pub coalesced: u64,
    pub fired: u64,
}

#[derive(Debug, Clone)]
struct Pending {
    event: FileEvent,
    deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<(PathBuf, FileEventKind), Pending>,
    stats: DebounceStats,
}

impl Debouncer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            stats: DebounceStats::default(),
        }
    }

    pub fn push(&mut self, event: FileEvent, now: Instant) {
        self.stats.received += 1;
        let key = (event.path.clone(), event.kind);
        let next = Pending {
            event,
            deadline: now + self.window,
        };
        if self.pending.insert(key, next).is_some() {
            self.stats.coalesced += 1;
        }
    }

    /// Remove and return every event whose window has elapsed, ordered by
    /// path then kind.
    pub fn flush_ready(&mut self, now: Instant) -> Vec<FileEvent> {
        let mut ready: Vec<(PathBuf, FileEventKind)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        ready.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));

        let fired: Vec<FileEvent> = ready
            .into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .map(|pending| pending.event)
            .collect();
        self.stats.fired += fired.len() as u64;
        fired
    }

    /// Earliest pending deadline, if anything is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> DebounceStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
