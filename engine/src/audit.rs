//! Audit and metrics records.
//!
//! Both logs are append-only JSON lines under `.phasegate/logs/`. Writing a
//! record is best-effort: a log that cannot be written is reported at `warn`
//! and never changes the outcome of the operation being recorded.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use phasegate_types::{FileEvent, PhaseId, TicketId, ValidationReport, truncate_with_ellipsis};
use phasegate_utils::JsonlLog;
use serde::{Deserialize, Serialize};

/// Longest `detail` kept in an audit record, in characters.
pub const AUDIT_DETAIL_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Validated,
    InactivePhase,
    Unowned,
    Advanced,
    AdvanceRejected,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: String,
    pub kind: AuditKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub detail: String,
}

impl AuditRecord {
    pub fn new(kind: AuditKind, detail: impl Into<String>) -> Self {
        Self {
            ts: now_rfc3339(),
            kind,
            path: None,
            event: None,
            phase: None,
            detail: truncate_with_ellipsis(&detail.into(), AUDIT_DETAIL_CHARS),
        }
    }

    #[must_use]
    pub fn with_event(mut self, event: &FileEvent) -> Self {
        self.path = Some(event.path.to_string_lossy().replace('\\', "/"));
        self.event = Some(event.kind.as_str().to_string());
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: &PhaseId) -> Self {
        self.phase = Some(phase.to_string());
        self
    }
}

impl std::fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = serde_json::to_value(self.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        write!(f, "{} {kind:<16}", self.ts)?;
        if let Some(phase) = &self.phase {
            write!(f, " [{phase}]")?;
        }
        if let (Some(path), Some(event)) = (&self.path, &self.event) {
            write!(f, " {event} {path}")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// One record per validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub ts: String,
    pub phase: String,
    #[serde(default)]
    pub ticket: Option<String>,
    pub passed: bool,
    pub cache_hit: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub failures: Vec<String>,
}

impl MetricRecord {
    #[must_use]
    pub fn new(
        report: &ValidationReport,
        ticket: Option<&TicketId>,
        cache_hit: bool,
        duration_ms: u64,
    ) -> Self {
        Self {
            ts: now_rfc3339(),
            phase: report.phase.to_string(),
            ticket: ticket.map(ToString::to_string),
            passed: report.passed(),
            cache_hit,
            duration_ms,
            failures: report.failures.clone(),
        }
    }
}

/// The two append-only logs of one repository.
#[derive(Debug, Clone)]
pub struct Logs {
    events: JsonlLog,
    metrics: JsonlLog,
}

impl Logs {
    pub fn new(events: impl AsRef<Path>, metrics: impl AsRef<Path>) -> Self {
        Self {
            events: JsonlLog::new(events.as_ref()),
            metrics: JsonlLog::new(metrics.as_ref()),
        }
    }

    pub fn audit(&self, record: &AuditRecord) {
        if let Err(e) = self.events.append(record) {
            tracing::warn!(path = %self.events.path().display(), "failed to append audit record: {e}");
        }
    }

    pub fn metric(&self, record: &MetricRecord) {
        if let Err(e) = self.metrics.append(record) {
            tracing::warn!(path = %self.metrics.path().display(), "failed to append metric record: {e}");
        }
    }

    pub fn recent_events(&self, limit: usize) -> std::io::Result<Vec<AuditRecord>> {
        self.events.tail(limit)
    }

    pub fn recent_metrics(&self, limit: usize) -> std::io::Result<Vec<MetricRecord>> {
        self.metrics.tail(limit)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
