use std::path::Path;

use phasegate_config::PhaseMatcher;
use phasegate_types::{PhaseId, Position};

/// Where a changed path belongs relative to the current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Owned by the current phase: validate it.
    Active(PhaseId),
    /// Owned by a phase that is not current; audited only.
    Inactive { owner: PhaseId },
    /// Matches no phase's patterns.
    Unowned,
}

#[must_use]
pub fn route(matcher: &PhaseMatcher, path: &Path, current: &Position) -> Route {
    match matcher.owner_of(path) {
        Some(owner) if current.phase() == Some(owner) => Route::Active(owner.clone()),
        Some(owner) => Route::Inactive {
            owner: owner.clone(),
        },
        None => Route::Unowned,
    }
}
