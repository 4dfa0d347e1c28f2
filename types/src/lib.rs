//! Core domain types for phasegate.
//!
//! Pure domain types with no IO and no async: phases, gates, validation
//! results and file events. Everything here can be used from any layer.

mod event;
mod gate;
mod ids;
mod phase;
mod text;

pub use event::{FileEvent, FileEventKind};
pub use gate::{
    CommandGate, ContainsGate, CountGate, ExistsGate, Gate, GateKind, GateResult,
    NUMBERED_LINE_PATTERN, ValidationReport,
};
pub use ids::{IdError, PhaseId, TERMINAL_TOKEN, TicketId};
pub use phase::{Phase, PhaseSequence, Position, SequenceError};
pub use text::{tail_excerpt, truncate_with_ellipsis};
