//! Ticket Limiter.
//!
//! An open ticket is a marker file `tickets/<phase>/<ticket-id>`, created and
//! removed by whatever tool hands out work. Counting is a plain directory
//! listing with no locking, so two admissions racing each other may briefly
//! over-admit; the next scan sees the true count.

use std::fs;
use std::io;
use std::path::PathBuf;

use phasegate_config::TicketLimits;
use phasegate_types::{PhaseId, TicketId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub active: usize,
    pub max: u32,
}

impl Admission {
    #[must_use]
    pub fn admitted(&self) -> bool {
        self.active < self.max as usize
    }
}

#[derive(Debug, Clone)]
pub struct TicketLimiter {
    dir: PathBuf,
    limits: TicketLimits,
}

impl TicketLimiter {
    pub fn new(dir: impl Into<PathBuf>, limits: TicketLimits) -> Self {
        Self {
            dir: dir.into(),
            limits,
        }
    }

    /// Ids of the open tickets of `phase`, sorted. Unreadable or missing
    /// directories yield an empty list.
    #[must_use]
    pub fn open_tickets(&self, phase: &PhaseId) -> Vec<TicketId> {
        let dir = self.dir.join(phase.as_str());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %dir.display(), "cannot list tickets: {e}");
                }
                return Vec::new();
            }
        };
        let mut tickets: Vec<TicketId> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| TicketId::new(entry.file_name().to_string_lossy()).ok())
            .collect();
        tickets.sort();
        tickets
    }

    #[must_use]
    pub fn active_count(&self, phase: &PhaseId) -> usize {
        self.open_tickets(phase).len()
    }

    #[must_use]
    pub fn max_for(&self, phase: &PhaseId) -> u32 {
        self.limits.max_for(phase)
    }

    #[must_use]
    pub fn admission(&self, phase: &PhaseId) -> Admission {
        Admission {
            active: self.active_count(phase),
            max: self.max_for(phase),
        }
    }

    #[must_use]
    pub fn can_admit(&self, phase: &PhaseId) -> bool {
        self.admission(phase).admitted()
    }
}
