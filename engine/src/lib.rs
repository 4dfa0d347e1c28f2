//! Phase-gated workflow engine.
//!
//! [`Engine`] wires the Gate Validator, the Validation Cache, the Ticket
//! Limiter and the Phase State Machine for one repository. The file watcher
//! in [`watch`] drives the same engine from change notifications.

mod audit;
mod state;
mod tickets;
pub mod watch;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use phasegate_cache::{CacheEntry, CacheKey, KeyInputs, PutOutcome, ValidationCache};
use phasegate_config::{ConfigError, EngineConfig};
use phasegate_gates::{GateCtx, Shutdown, Validator};
use phasegate_types::{Phase, PhaseId, Position, TicketId, ValidationReport};

pub use audit::{AuditKind, AuditRecord, Logs, MetricRecord};
pub use state::{AdvanceOutcome, PhaseStateMachine, StateError};
pub use tickets::{Admission, TicketLimiter};

/// Number of recent metrics records the cache hit rate is computed over.
pub const HIT_RATE_WINDOW: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("unknown phase `{0}`")]
    UnknownPhase(String),
    #[error("all phases are complete; no phase is active")]
    WorkflowComplete,
    #[error("failed to clear the cache: {0}")]
    CacheClear(#[source] io::Error),
    #[error("no watch root could be opened")]
    NoWatchRoots,
}

/// Outcome of one validation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub report: ValidationReport,
    pub cache_hit: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub position: Position,
    pub ordinal: Option<u32>,
    pub total_phases: usize,
    /// Ticket admission of the current phase; `None` once complete.
    pub tickets: Option<Admission>,
    pub completed_gates: usize,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(ordinal) => writeln!(
                f,
                "phase: {} ({ordinal}/{})",
                self.position, self.total_phases
            )?,
            None => writeln!(f, "phase: {}", self.position)?,
        }
        if let Some(tickets) = self.tickets {
            writeln!(f, "tickets: {}/{} open", tickets.active, tickets.max)?;
        }
        write!(
            f,
            "gates completed: {}/{}",
            self.completed_gates, self.total_phases
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheReport {
    pub entries: usize,
    pub bytes: u64,
    /// Validation calls considered for the hit rate.
    pub recent_calls: usize,
    pub recent_hits: usize,
}

impl CacheReport {
    #[must_use]
    pub fn hit_rate(&self) -> Option<f64> {
        (self.recent_calls > 0).then(|| self.recent_hits as f64 / self.recent_calls as f64)
    }
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entries: {}", self.entries)?;
        writeln!(f, "size: {} bytes", self.bytes)?;
        match self.hit_rate() {
            Some(rate) => write!(
                f,
                "hit rate: {:.1}% ({}/{} recent validations)",
                rate * 100.0,
                self.recent_hits,
                self.recent_calls
            ),
            None => write!(f, "hit rate: n/a (no recent validations)"),
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    validator: Validator,
    cache: ValidationCache,
    state: PhaseStateMachine,
    tickets: TicketLimiter,
    logs: Logs,
}

impl Engine {
    /// Load the configuration of the repository at `root` and build an engine.
    pub fn load(root: impl Into<PathBuf>, shutdown: Shutdown) -> Result<Self, EngineError> {
        Ok(Self::new(EngineConfig::load(root)?, shutdown))
    }

    #[must_use]
    pub fn new(config: EngineConfig, shutdown: Shutdown) -> Self {
        let layout = &config.layout;
        let logs = Logs::new(layout.events_log(), layout.metrics_log());
        let validator = Validator::new(GateCtx::new(
            layout.root(),
            config.settings.gates.output_excerpt_chars,
            shutdown,
        ));
        let cache = ValidationCache::new(layout.cache_dir(), config.settings.cache.clone());
        let state = PhaseStateMachine::new(layout.clone(), config.phases.clone(), logs.clone());
        let tickets = TicketLimiter::new(layout.tickets_dir(), config.limits.clone());
        Self {
            config,
            validator,
            cache,
            state,
            tickets,
            logs,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn logs(&self) -> &Logs {
        &self.logs
    }

    #[must_use]
    pub fn shutdown(&self) -> &Shutdown {
        self.validator.ctx().shutdown()
    }

    pub fn position(&self) -> Result<Position, EngineError> {
        Ok(self.state.current()?)
    }

    /// The named phase, or the current one when `phase` is `None`.
    pub fn resolve_phase(&self, phase: Option<&str>) -> Result<&Phase, EngineError> {
        let id = match phase {
            Some(raw) => {
                PhaseId::new(raw).map_err(|_| EngineError::UnknownPhase(raw.to_string()))?
            }
            None => match self.position()? {
                Position::Active(id) => id,
                Position::Complete => return Err(EngineError::WorkflowComplete),
            },
        };
        self.config
            .phases
            .get(&id)
            .ok_or_else(|| EngineError::UnknownPhase(id.to_string()))
    }

    /// Validate `phase`, going through the cache unless `use_cache` is off.
    ///
    /// Never fails: cache problems degrade to a miss and gate problems are
    /// reported as failures. Every call appends one metrics record.
    pub async fn validate(
        &self,
        phase: &Phase,
        ticket: Option<&TicketId>,
        use_cache: bool,
    ) -> Validation {
        let started = Instant::now();
        let inputs = KeyInputs {
            root: self.config.layout.root(),
            phase,
            matcher: &self.config.matcher,
        };
        let key = if use_cache && self.cache.enabled() {
            match inputs.compute(ticket) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::debug!(phase = %phase.id, "cache key unavailable, validating uncached: {e}");
                    None
                }
            }
        } else {
            None
        };

        let cached = key.as_ref().and_then(|key| self.cache.get(key));
        let (report, cache_hit) = match cached {
            Some(entry) => (ValidationReport::new(phase.id.clone(), entry.failures), true),
            None => {
                let report = self.validator.validate(phase).await;
                if let Some(key) = &key
                    && report.passed()
                {
                    self.store(&inputs, key, ticket, &report);
                }
                (report, false)
            }
        };

        let duration = started.elapsed();
        tracing::debug!(
            phase = %phase.id,
            passed = report.passed(),
            cache_hit,
            duration_ms = duration.as_millis() as u64,
            "validation finished"
        );
        self.logs.metric(&MetricRecord::new(
            &report,
            ticket,
            cache_hit,
            duration.as_millis() as u64,
        ));
        Validation {
            report,
            cache_hit,
            duration,
        }
    }

    /// Store a passing report, unless the inputs changed while the gates ran.
    fn store(
        &self,
        inputs: &KeyInputs<'_>,
        key: &CacheKey,
        ticket: Option<&TicketId>,
        report: &ValidationReport,
    ) {
        match inputs.compute(ticket) {
            Ok(after) if after == *key => {}
            Ok(_) => {
                tracing::debug!(phase = %key.phase, "inputs changed during validation, not caching");
                return;
            }
            Err(e) => {
                tracing::debug!(phase = %key.phase, "cache key unavailable after validation: {e}");
                return;
            }
        }
        let entry = CacheEntry::new(key, report, SystemTime::now());
        match self.cache.put(key, &entry) {
            Ok(PutOutcome::Stored { evicted }) => {
                tracing::debug!(phase = %key.phase, evicted, "validation cached");
            }
            Ok(PutOutcome::SkippedFailure) => {}
            Err(e) => tracing::debug!(phase = %key.phase, "cache write failed: {e}"),
        }
    }

    /// Advance past the current phase if its gates pass.
    pub async fn advance(&self) -> Result<AdvanceOutcome, EngineError> {
        self.advance_inner(None).await
    }

    /// Advance only while `expected` is still the current phase.
    pub async fn advance_from(&self, expected: &PhaseId) -> Result<AdvanceOutcome, EngineError> {
        self.advance_inner(Some(expected)).await
    }

    async fn advance_inner(
        &self,
        expected: Option<&PhaseId>,
    ) -> Result<AdvanceOutcome, EngineError> {
        let outcome = self
            .state
            .advance_from(expected, |phase| async move {
                self.validate(&phase, None, true).await.report
            })
            .await?;
        Ok(outcome)
    }

    /// Operator-invoked return to the first phase.
    pub async fn reset(&self) -> Result<PhaseId, EngineError> {
        Ok(self.state.reset().await?)
    }

    pub fn status(&self) -> Result<StatusReport, EngineError> {
        let position = self.position()?;
        let phase = position.phase().and_then(|id| self.config.phases.get(id));
        Ok(StatusReport {
            ordinal: phase.map(|p| p.ordinal),
            tickets: phase.map(|p| self.tickets.admission(&p.id)),
            total_phases: self.config.phases.len(),
            completed_gates: self.state.completed_gates(),
            position,
        })
    }

    #[must_use]
    pub fn admission(&self, phase: &PhaseId) -> Admission {
        self.tickets.admission(phase)
    }

    #[must_use]
    pub fn cache_report(&self) -> CacheReport {
        let stats = self.cache.stats();
        let recent = self
            .logs
            .recent_metrics(HIT_RATE_WINDOW)
            .unwrap_or_else(|e| {
                tracing::debug!("metrics log unreadable: {e}");
                Vec::new()
            });
        CacheReport {
            entries: stats.entries,
            bytes: stats.bytes,
            recent_calls: recent.len(),
            recent_hits: recent.iter().filter(|m| m.cache_hit).count(),
        }
    }

    pub fn clear_cache(&self) -> Result<usize, EngineError> {
        let removed = self.cache.clear().map_err(EngineError::CacheClear)?;
        tracing::info!(removed, "cache cleared");
        Ok(removed)
    }
}
