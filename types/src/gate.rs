//! Gate definitions and evaluation results.
//!
//! `GateKind` is a closed set; each variant carries only the parameters its
//! check needs. Evaluation lives in `phasegate-gates`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::ids::PhaseId;

/// Default line pattern for count gates: a numbered list item (`1.` or `1)`).
pub const NUMBERED_LINE_PATTERN: &str = r"^\s*\d+[.)]\s+";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gate {
    pub name: String,
    pub kind: GateKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateKind {
    Exists(ExistsGate),
    Contains(ContainsGate),
    Count(CountGate),
    Command(CommandGate),
}

impl GateKind {
    /// Repository-relative file the gate inspects, if any.
    #[must_use]
    pub fn target_path(&self) -> Option<&str> {
        match self {
            Self::Exists(g) => Some(&g.path),
            Self::Contains(g) => Some(&g.path),
            Self::Count(g) => Some(&g.path),
            Self::Command(_) => None,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Exists(_) => "exists",
            Self::Contains(_) => "contains",
            Self::Count(_) => "count",
            Self::Command(_) => "command",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistsGate {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainsGate {
    pub path: String,
    pub pattern: String,
    /// Treat `pattern` as a regular expression instead of a literal substring.
    pub regex: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountGate {
    pub path: String,
    /// Regular expression a line must match to be counted.
    pub pattern: String,
    pub min: u32,
    /// Noun used in failure messages ("task count 0 < 3").
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandGate {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandGate {
    /// Command line as shown in failure messages.
    #[must_use]
    pub fn display(&self) -> String {
        let mut out = self.command.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Outcome of a single gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Pass,
    Fail { reason: String },
}

impl GateResult {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Fail { reason } => Some(reason),
        }
    }
}

/// Result of validating every gate of a phase.
///
/// Failures are accumulated in gate order; an empty list means the phase passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub phase: PhaseId,
    pub failures: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn new(phase: PhaseId, failures: Vec<String>) -> Self {
        Self { phase, failures }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(f, "phase {}: all gates passed", self.phase);
        }
        writeln!(
            f,
            "phase {}: {} gate(s) failed",
            self.phase,
            self.failures.len()
        )?;
        for failure in &self.failures {
            writeln!(f, "  - {failure}")?;
        }
        Ok(())
    }
}
