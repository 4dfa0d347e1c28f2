use serde::Serialize;

use crate::gate::Gate;
use crate::ids::PhaseId;

/// One stage of the delivery sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub id: PhaseId,
    /// 1-based position in the sequence.
    pub ordinal: u32,
    /// Glob patterns (relative to the repository root) owned by this phase.
    pub patterns: Vec<String>,
    pub auto_advance: bool,
    /// Gates in evaluation order.
    pub gates: Vec<Gate>,
}

/// The fixed, ordered phase sequence.
///
/// Construction guarantees at least one phase, unique ids and ordinals that
/// match positions, so lookups never need to re-check those properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSequence {
    phases: Vec<Phase>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("at least one phase must be configured")]
    Empty,
    #[error("phase `{0}` is declared more than once")]
    Duplicate(PhaseId),
}

impl PhaseSequence {
    /// Build a sequence, assigning ordinals from declaration order.
    pub fn new(mut phases: Vec<Phase>) -> Result<Self, SequenceError> {
        if phases.is_empty() {
            return Err(SequenceError::Empty);
        }
        for (idx, phase) in phases.iter().enumerate() {
            if phases[..idx].iter().any(|p| p.id == phase.id) {
                return Err(SequenceError::Duplicate(phase.id.clone()));
            }
        }
        for (idx, phase) in phases.iter_mut().enumerate() {
            phase.ordinal = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        }
        Ok(Self { phases })
    }

    #[must_use]
    pub fn first(&self) -> &Phase {
        &self.phases[0]
    }

    #[must_use]
    pub fn get(&self, id: &PhaseId) -> Option<&Phase> {
        self.phases.iter().find(|p| &p.id == id)
    }

    #[must_use]
    pub fn by_ordinal(&self, ordinal: u32) -> Option<&Phase> {
        let idx = usize::try_from(ordinal).ok()?.checked_sub(1)?;
        self.phases.get(idx)
    }

    /// The phase after `id`, or `None` when `id` is the last phase.
    #[must_use]
    pub fn next_after(&self, id: &PhaseId) -> Option<&Phase> {
        let phase = self.get(id)?;
        self.by_ordinal(phase.ordinal + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phase> {
        self.phases.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

/// Position of the workflow: a phase, or past the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    Active(PhaseId),
    Complete,
}

impl Position {
    #[must_use]
    pub fn phase(&self) -> Option<&PhaseId> {
        match self {
            Self::Active(id) => Some(id),
            Self::Complete => None,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active(id) => write!(f, "{id}"),
            Self::Complete => f.write_str(crate::ids::TERMINAL_TOKEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Phase, PhaseSequence, SequenceError};
    use crate::PhaseId;

    fn phase(id: &str) -> Phase {
        Phase {
            id: PhaseId::new(id).unwrap(),
            ordinal: 0,
            patterns: Vec::new(),
            auto_advance: false,
            gates: Vec::new(),
        }
    }

    #[test]
    fn ordinals_follow_declaration_order() {
        let seq = PhaseSequence::new(vec![phase("plan"), phase("build"), phase("ship")]).unwrap();
        let ordinals: Vec<u32> = seq.iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(seq.first().id.as_str(), "plan");
        assert_eq!(seq.by_ordinal(3).unwrap().id.as_str(), "ship");
        assert!(seq.by_ordinal(0).is_none());
        assert!(seq.by_ordinal(4).is_none());
    }

    #[test]
    fn next_after_stops_at_last_phase() {
        let seq = PhaseSequence::new(vec![phase("plan"), phase("build")]).unwrap();
        let plan = PhaseId::new("plan").unwrap();
        let build = PhaseId::new("build").unwrap();
        assert_eq!(seq.next_after(&plan).unwrap().id, build);
        assert!(seq.next_after(&build).is_none());
    }

    #[test]
    fn rejects_empty_and_duplicates() {
        assert_eq!(PhaseSequence::new(Vec::new()), Err(SequenceError::Empty));
        assert!(matches!(
            PhaseSequence::new(vec![phase("plan"), phase("plan")]),
            Err(SequenceError::Duplicate(_))
        ));
    }
}
