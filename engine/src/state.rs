//! Phase State Machine.
//!
//! `state/current_phase` holds a single token: a phase id, or `complete`
//! once the last phase has been left. A missing file means the workflow has
//! not started and the first phase is current. This module is the only
//! writer of that file and of the gate-completion markers; writers serialize
//! through one async lock held across the validation that guards an advance.

use std::fs;
use std::future::Future;
use std::io;
use std::path::PathBuf;

use phasegate_config::Layout;
use phasegate_types::{Phase, PhaseId, PhaseSequence, Position, TERMINAL_TOKEN, ValidationReport};
use phasegate_utils::{atomic_write, touch_marker};
use tokio::sync::Mutex;

use crate::audit::{AuditKind, AuditRecord, Logs};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("{} names unknown phase `{token}`", path.display())]
    UnknownPhase { path: PathBuf, token: String },
}

/// Result of an advance request. Only `Advanced` mutated anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced { from: PhaseId, to: Position },
    /// The current phase's gates do not pass.
    Rejected { phase: PhaseId, failures: Vec<String> },
    /// The caller expected a phase that is no longer current; someone else
    /// advanced first.
    Stale { current: Position },
    AlreadyComplete,
}

impl AdvanceOutcome {
    #[must_use]
    pub fn advanced(&self) -> bool {
        matches!(self, Self::Advanced { .. })
    }
}

#[derive(Debug)]
pub struct PhaseStateMachine {
    layout: Layout,
    phases: PhaseSequence,
    logs: Logs,
    writer: Mutex<()>,
}

impl PhaseStateMachine {
    #[must_use]
    pub fn new(layout: Layout, phases: PhaseSequence, logs: Logs) -> Self {
        Self {
            layout,
            phases,
            logs,
            writer: Mutex::new(()),
        }
    }

    /// Read the persisted position.
    pub fn current(&self) -> Result<Position, StateError> {
        let path = self.layout.current_phase_file();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Position::Active(self.phases.first().id.clone()));
            }
            Err(source) => return Err(StateError::Read { path, source }),
        };
        let token = raw.trim();
        if token.is_empty() {
            tracing::debug!(path = %path.display(), "empty current phase, using first phase");
            return Ok(Position::Active(self.phases.first().id.clone()));
        }
        if token == TERMINAL_TOKEN {
            return Ok(Position::Complete);
        }
        PhaseId::new(token)
            .ok()
            .and_then(|id| self.phases.get(&id))
            .map(|phase| Position::Active(phase.id.clone()))
            .ok_or_else(|| StateError::UnknownPhase {
                path,
                token: token.to_string(),
            })
    }

    /// Number of phases with a gate-completion marker.
    #[must_use]
    pub fn completed_gates(&self) -> usize {
        self.phases
            .iter()
            .filter(|phase| self.layout.gate_marker(phase.ordinal).is_file())
            .count()
    }

    #[must_use]
    pub fn phases(&self) -> &PhaseSequence {
        &self.phases
    }

    /// Advance past the current phase if `validate` reports that its gates
    /// pass.
    ///
    /// With `expected` set, the request only applies while that phase is
    /// still current; otherwise it is a `Stale` no-op. Concurrent callers
    /// for the same phase therefore advance at most once.
    pub async fn advance_from<F, Fut>(
        &self,
        expected: Option<&PhaseId>,
        validate: F,
    ) -> Result<AdvanceOutcome, StateError>
    where
        F: FnOnce(Phase) -> Fut,
        Fut: Future<Output = ValidationReport>,
    {
        let _writer = self.writer.lock().await;

        let position = self.current()?;
        if let Some(expected) = expected
            && position.phase() != Some(expected)
        {
            tracing::debug!(%expected, current = %position, "advance request is stale");
            return Ok(AdvanceOutcome::Stale { current: position });
        }
        let Position::Active(current) = position else {
            return Ok(AdvanceOutcome::AlreadyComplete);
        };
        let Some(phase) = self.phases.get(&current).cloned() else {
            return Err(StateError::UnknownPhase {
                path: self.layout.current_phase_file(),
                token: current.to_string(),
            });
        };

        let report = validate(phase.clone()).await;
        if !report.passed() {
            self.logs.audit(
                &AuditRecord::new(AuditKind::AdvanceRejected, report.failures.join("; "))
                    .with_phase(&phase.id),
            );
            return Ok(AdvanceOutcome::Rejected {
                phase: phase.id,
                failures: report.failures,
            });
        }

        let marker = self.layout.gate_marker(phase.ordinal);
        touch_marker(&marker).map_err(|source| StateError::Write {
            path: marker,
            source,
        })?;

        let next = self
            .phases
            .next_after(&phase.id)
            .map_or(Position::Complete, |p| Position::Active(p.id.clone()));
        self.persist(&next)?;

        tracing::info!(from = %phase.id, to = %next, "phase advanced");
        self.logs.audit(
            &AuditRecord::new(AuditKind::Advanced, format!("{} -> {next}", phase.id))
                .with_phase(&phase.id),
        );
        Ok(AdvanceOutcome::Advanced {
            from: phase.id,
            to: next,
        })
    }

    /// Remove every gate marker and return to the first phase.
    pub async fn reset(&self) -> Result<PhaseId, StateError> {
        let _writer = self.writer.lock().await;

        let markers = self.layout.gate_markers_dir();
        match fs::read_dir(&markers) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "done") {
                        fs::remove_file(&path)
                            .map_err(|source| StateError::Write { path, source })?;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StateError::Read {
                    path: markers,
                    source,
                });
            }
        }

        let first = self.phases.first().id.clone();
        self.persist(&Position::Active(first.clone()))?;
        tracing::info!(phase = %first, "workflow reset");
        self.logs.audit(
            &AuditRecord::new(AuditKind::Reset, format!("returned to {first}")).with_phase(&first),
        );
        Ok(first)
    }

    fn persist(&self, position: &Position) -> Result<(), StateError> {
        let path = self.layout.current_phase_file();
        atomic_write(&path, format!("{position}\n").as_bytes())
            .map_err(|source| StateError::Write { path, source })
    }
}
