use std::collections::HashMap;

use phasegate_types::PhaseId;

/// Limit applied when `ticket_limits.toml` is absent or names no default.
pub const DEFAULT_TICKET_LIMIT: u32 = 1;

/// Per-phase maximum number of concurrently open tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketLimits {
    default: u32,
    per_phase: HashMap<PhaseId, u32>,
}

impl Default for TicketLimits {
    fn default() -> Self {
        Self::new(DEFAULT_TICKET_LIMIT, HashMap::new())
    }
}

impl TicketLimits {
    #[must_use]
    pub fn new(default: u32, per_phase: HashMap<PhaseId, u32>) -> Self {
        Self { default, per_phase }
    }

    #[must_use]
    pub fn max_for(&self, phase: &PhaseId) -> u32 {
        self.per_phase.get(phase).copied().unwrap_or(self.default)
    }
}
