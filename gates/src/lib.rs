//! Gate Validator.
//!
//! Every gate kind implements [`GateCheck`]; [`Validator::validate`]
//! evaluates all gates of a phase in declaration order and accumulates the
//! failure reasons. It never stops at the first failure and never returns an
//! error: a gate that cannot be evaluated is reported as a failed gate.

mod checks;
mod command;
pub mod process;
mod shutdown;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use phasegate_types::{GateKind, GateResult, Phase, ValidationReport};

pub use shutdown::{Shutdown, ShutdownTrigger, shutdown_channel};

/// Gate evaluation future type alias.
pub type GateFut<'a> = Pin<Box<dyn Future<Output = GateResult> + Send + 'a>>;

/// Everything a gate check may observe: the repository and the shutdown signal.
#[derive(Debug, Clone)]
pub struct GateCtx {
    root: PathBuf,
    excerpt_chars: usize,
    shutdown: Shutdown,
}

impl GateCtx {
    pub fn new(root: impl Into<PathBuf>, excerpt_chars: usize, shutdown: Shutdown) -> Self {
        Self {
            root: root.into(),
            excerpt_chars,
            shutdown,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn excerpt_chars(&self) -> usize {
        self.excerpt_chars
    }

    #[must_use]
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }
}

/// A precondition that can be checked against the current repository state.
pub trait GateCheck: Send + Sync {
    fn evaluate<'a>(&'a self, ctx: &'a GateCtx) -> GateFut<'a>;
}

impl GateCheck for GateKind {
    fn evaluate<'a>(&'a self, ctx: &'a GateCtx) -> GateFut<'a> {
        match self {
            Self::Exists(gate) => gate.evaluate(ctx),
            Self::Contains(gate) => gate.evaluate(ctx),
            Self::Count(gate) => gate.evaluate(ctx),
            Self::Command(gate) => gate.evaluate(ctx),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    ctx: GateCtx,
}

impl Validator {
    #[must_use]
    pub fn new(ctx: GateCtx) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub fn ctx(&self) -> &GateCtx {
        &self.ctx
    }

    /// Evaluate every gate of `phase` against the current on-disk state.
    pub async fn validate(&self, phase: &Phase) -> ValidationReport {
        let mut failures = Vec::new();
        for gate in &phase.gates {
            match gate.kind.evaluate(&self.ctx).await {
                GateResult::Pass => {
                    tracing::trace!(phase = %phase.id, gate = %gate.name, "gate passed");
                }
                GateResult::Fail { reason } => {
                    tracing::debug!(phase = %phase.id, gate = %gate.name, %reason, "gate failed");
                    failures.push(reason);
                }
            }
        }
        ValidationReport::new(phase.id.clone(), failures)
    }
}
