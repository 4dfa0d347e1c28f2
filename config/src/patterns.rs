use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use phasegate_types::{PhaseId, PhaseSequence};

/// Compiled watch patterns for every phase, in declaration order.
#[derive(Debug, Clone)]
pub struct PhaseMatcher {
    phases: Vec<(PhaseId, GlobSet)>,
}

impl PhaseMatcher {
    pub fn new(sequence: &PhaseSequence) -> Result<Self, globset::Error> {
        let phases = sequence
            .iter()
            .map(|phase| Ok((phase.id.clone(), compile_globs(&phase.patterns)?)))
            .collect::<Result<Vec<_>, globset::Error>>()?;
        Ok(Self { phases })
    }

    /// First phase (in declaration order) whose patterns match `path`.
    #[must_use]
    pub fn owner_of(&self, path: &Path) -> Option<&PhaseId> {
        let path = normalize(path);
        self.phases
            .iter()
            .find(|(_, globs)| globs.is_match(&path))
            .map(|(id, _)| id)
    }

    /// Whether `path` matches the watch patterns of `phase`.
    #[must_use]
    pub fn matches(&self, phase: &PhaseId, path: &Path) -> bool {
        let path = normalize(path);
        self.phases
            .iter()
            .find(|(id, _)| id == phase)
            .is_some_and(|(_, globs)| globs.is_match(&path))
    }
}

pub(crate) fn compile_globs(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern.trim())?);
    }
    builder.build()
}

/// Forward-slash form without a leading `./`, so globs match the same way on every platform.
fn normalize(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    raw.strip_prefix("./").map(str::to_string).unwrap_or(raw)
}
