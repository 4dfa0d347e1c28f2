//! File Watcher + Debouncer.
//!
//! One polling task per watched root feeds a single debounce loop. When a
//! debounce window fires, each event is routed to its owning phase; events
//! for the current phase trigger one validation (through the cache) per
//! flush, run as its own task so a slow command gate never delays timers.
//! Events owned by any other phase, or by none, are only audited.

mod classify;
mod debounce;
mod source;

use std::sync::Arc;
use std::time::Duration;

use phasegate_gates::Shutdown;
use phasegate_types::{FileEvent, PhaseId, Position};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

pub use classify::{Route, route};
pub use debounce::{DebounceStats, Debouncer};
pub use source::{ChangeSource, PollingSource};

use crate::{AuditKind, AuditRecord, Engine, EngineError};

const EVENT_QUEUE: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub roots: usize,
    pub debounce: DebounceStats,
    /// Events dropped by the ignore list before debouncing.
    pub ignored: u64,
    /// Validations started by fired events.
    pub triggers: u64,
    pub advances: u64,
}

pub struct Watcher {
    engine: Arc<Engine>,
    sources: Vec<Box<dyn ChangeSource>>,
}

impl Watcher {
    /// A watcher with no sources; see [`Watcher::add_source`].
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            sources: Vec::new(),
        }
    }

    /// A watcher polling every configured root. Roots that cannot be opened
    /// are skipped with a warning; it is an error only if none can.
    pub fn for_configured_roots(engine: Arc<Engine>) -> Result<Self, EngineError> {
        let mut watcher = Self::new(Arc::clone(&engine));
        let config = engine.config();
        for root in &config.settings.watch.roots {
            match PollingSource::open(config.layout.root(), root, &config.settings.watch) {
                Ok(source) => watcher.add_source(Box::new(source)),
                Err(e) => {
                    tracing::warn!(root = %root.display(), "skipping watch root: {e}");
                }
            }
        }
        if watcher.sources.is_empty() {
            return Err(EngineError::NoWatchRoots);
        }
        Ok(watcher)
    }

    pub fn add_source(&mut self, source: Box<dyn ChangeSource>) {
        self.sources.push(source);
    }

    /// Run until `shutdown` fires. Pending debounce windows are dropped and
    /// in-flight validations are awaited; their command gates observe the
    /// same shutdown and are cancelled.
    pub async fn run(self, shutdown: Shutdown) -> WatchSummary {
        let settings = &self.engine.config().settings.watch;
        let poll_interval = settings.poll_interval;
        let mut debouncer = Debouncer::new(settings.debounce);
        let mut summary = WatchSummary {
            roots: self.sources.len(),
            ..WatchSummary::default()
        };

        let (tx, mut rx) = mpsc::channel::<FileEvent>(EVENT_QUEUE);
        let mut pollers = JoinSet::new();
        for source in self.sources {
            tracing::info!(root = %source.root().display(), "watching");
            pollers.spawn(poll_root(source, poll_interval, tx.clone(), shutdown.clone()));
        }
        drop(tx);

        let mut validations: JoinSet<bool> = JoinSet::new();
        let mut stop = shutdown.clone();
        loop {
            let deadline = debouncer.next_deadline();
            tokio::select! {
                () = stop.wait() => break,
                received = rx.recv() => match received {
                    Some(event) if settings.is_ignored(&event.path, false) => {
                        tracing::trace!(path = %event.path.display(), "ignored change");
                        summary.ignored += 1;
                    }
                    Some(event) => debouncer.push(event, Instant::now()),
                    None => break,
                },
                () = sleep_until(deadline) => {
                    let fired = debouncer.flush_ready(Instant::now());
                    if let Some((phase, events)) = dispatch(&self.engine, fired) {
                        summary.triggers += 1;
                        validations.spawn(validate_and_advance(Arc::clone(&self.engine), phase, events));
                    }
                }
                Some(joined) = validations.join_next(), if !validations.is_empty() => {
                    if matches!(joined, Ok(true)) {
                        summary.advances += 1;
                    }
                }
            }
        }

        tracing::info!(pending = debouncer.pending(), ignored = summary.ignored, "watcher stopping");
        debouncer.clear();
        pollers.shutdown().await;
        while let Some(joined) = validations.join_next().await {
            if matches!(joined, Ok(true)) {
                summary.advances += 1;
            }
        }
        summary.debounce = debouncer.stats();
        summary
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn poll_root(
    mut source: Box<dyn ChangeSource>,
    every: Duration,
    tx: mpsc::Sender<FileEvent>,
    mut shutdown: Shutdown,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.wait() => return,
            _ = ticker.tick() => {}
        }
        let scanned = tokio::task::spawn_blocking(move || {
            let events = source.changes();
            (source, events)
        })
        .await;
        let events = match scanned {
            Ok((returned, events)) => {
                source = returned;
                events
            }
            Err(e) => {
                tracing::warn!("watch scan failed, root abandoned: {e}");
                return;
            }
        };
        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

/// Route a batch of fired events. Returns the current phase with the events
/// that belong to it, if any.
fn dispatch(engine: &Engine, fired: Vec<FileEvent>) -> Option<(PhaseId, Vec<FileEvent>)> {
    if fired.is_empty() {
        return None;
    }
    let position = match engine.position() {
        Ok(position) => position,
        Err(e) => {
            tracing::warn!("cannot read current phase, dropping {} events: {e}", fired.len());
            return None;
        }
    };

    let mut active: Option<(PhaseId, Vec<FileEvent>)> = None;
    for event in fired {
        match route(&engine.config().matcher, &event.path, &position) {
            Route::Active(phase) => {
                tracing::debug!(path = %event.path.display(), kind = %event.kind, %phase, "change in current phase");
                active
                    .get_or_insert_with(|| (phase, Vec::new()))
                    .1
                    .push(event);
            }
            Route::Inactive { owner } => {
                let detail = match &position {
                    Position::Active(current) => format!("current phase is {current}"),
                    Position::Complete => "workflow complete".to_string(),
                };
                engine.logs().audit(
                    &AuditRecord::new(AuditKind::InactivePhase, detail)
                        .with_event(&event)
                        .with_phase(&owner),
                );
            }
            Route::Unowned => {
                engine.logs().audit(
                    &AuditRecord::new(AuditKind::Unowned, "no phase owns this path")
                        .with_event(&event),
                );
            }
        }
    }
    active
}

/// Validate `phase` and auto-advance on pass when it is enabled. Returns
/// whether the phase advanced.
async fn validate_and_advance(engine: Arc<Engine>, phase: PhaseId, events: Vec<FileEvent>) -> bool {
    let Some(phase) = engine.config().phases.get(&phase).cloned() else {
        return false;
    };
    let validation = engine.validate(&phase, None, true).await;
    let passed = validation.report.passed();
    let detail = if passed {
        "passed".to_string()
    } else {
        validation.report.failures.join("; ")
    };
    for event in &events {
        engine.logs().audit(
            &AuditRecord::new(AuditKind::Validated, detail.clone())
                .with_event(event)
                .with_phase(&phase.id),
        );
    }
    tracing::info!(phase = %phase.id, passed, cache_hit = validation.cache_hit, "validated after change");

    if !passed || !phase.auto_advance || engine.shutdown().is_triggered() {
        return false;
    }
    match engine.advance_from(&phase.id).await {
        Ok(outcome) => {
            tracing::debug!(phase = %phase.id, ?outcome, "auto-advance");
            outcome.advanced()
        }
        Err(e) => {
            tracing::warn!(phase = %phase.id, "auto-advance failed: {e}");
            false
        }
    }
}
