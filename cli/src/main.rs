//! phasegate CLI - operator and CI entry point.
//!
//! Exit codes:
//!
//! - `0`: the command succeeded (gates pass, phase advanced, ticket admitted)
//! - `1`: an expected negative outcome (gates fail, advance rejected,
//!   admission refused)
//! - `2`: configuration or state errors, and refused operations

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use phasegate_engine::watch::Watcher;
use phasegate_engine::{AdvanceOutcome, Engine, EngineError};
use phasegate_gates::{Shutdown, shutdown_channel};
use phasegate_types::{PhaseId, TicketId};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_ENV: &str = "PHASEGATE_LOG";
const DEFAULT_STATUS_LIMIT: usize = 20;

#[derive(Parser)]
#[command(name = "phasegate", version)]
#[command(about = "Validate, advance and watch phase-gated delivery workflows")]
struct Cli {
    /// Repository root (the directory containing `.phasegate/`)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the gates of a phase (exit 1 if any fail)
    Validate {
        /// Phase to validate; defaults to the current phase
        #[arg(long)]
        phase: Option<String>,
        /// Ticket the validation is scoped to
        #[arg(long)]
        ticket: Option<String>,
        /// Bypass the validation cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Move to the next phase if the current phase's gates pass
    Advance,
    /// Show the current phase, open tickets and completed gates
    Status,
    /// Show cache size and recent hit rate
    CacheStats,
    /// Remove every cached validation
    CacheClear,
    /// Clear all gate markers and return to the first phase
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Check whether a phase may admit another ticket (exit 1 if full)
    Admit {
        /// Phase to check; defaults to the current phase
        #[arg(long)]
        phase: Option<String>,
    },
    /// Watch the repository and re-validate on changes
    Watch {
        /// Print recent audit records instead of watching
        #[arg(long)]
        status: bool,
        /// Number of audit records to print with --status
        #[arg(long, default_value_t = DEFAULT_STATUS_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let watching = matches!(cli.command, Command::Watch { status: false, .. });
    init_tracing(if watching { "info" } else { "warn" });

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Filter from `PHASEGATE_LOG`, then `RUST_LOG`, then `default_level`.
/// Logs go to stderr; stdout carries command output only.
fn init_tracing(default_level: &str) {
    let env_filter = env::var(LOG_ENV)
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let root = std::path::absolute(&cli.root)
        .with_context(|| format!("invalid repository root {}", cli.root.display()))?;

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            trigger.trigger();
        }
    });

    let engine = Engine::load(&root, shutdown.clone())?;

    match cli.command {
        Command::Validate {
            phase,
            ticket,
            no_cache,
        } => validate(&engine, phase.as_deref(), ticket.as_deref(), !no_cache).await,
        Command::Advance => advance(&engine).await,
        Command::Status => {
            println!("{}", engine.status()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::CacheStats => {
            println!("{}", engine.cache_report());
            Ok(ExitCode::SUCCESS)
        }
        Command::CacheClear => {
            let removed = engine.clear_cache()?;
            println!("removed {removed} cache entries");
            Ok(ExitCode::SUCCESS)
        }
        Command::Reset { yes } => {
            if !yes {
                eprintln!("refusing to reset without --yes");
                return Ok(ExitCode::from(2));
            }
            let first = engine.reset().await?;
            println!("reset to {first}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Admit { phase } => admit(&engine, phase.as_deref()),
        Command::Watch { status: true, limit } => {
            for record in engine.logs().recent_events(limit)? {
                println!("{record}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch { status: false, .. } => watch(engine, shutdown).await,
    }
}

async fn validate(
    engine: &Engine,
    phase: Option<&str>,
    ticket: Option<&str>,
    use_cache: bool,
) -> Result<ExitCode> {
    let phase = match engine.resolve_phase(phase) {
        Ok(phase) => phase,
        Err(EngineError::WorkflowComplete) => {
            println!("all phases complete");
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => return Err(e.into()),
    };
    let ticket = ticket
        .map(TicketId::new)
        .transpose()
        .context("invalid --ticket")?;

    let validation = engine.validate(phase, ticket.as_ref(), use_cache).await;
    let cached = if validation.cache_hit { " (cached)" } else { "" };
    if validation.report.passed() {
        println!("{}{cached}", validation.report);
        Ok(ExitCode::SUCCESS)
    } else {
        print!("{}", validation.report);
        Ok(ExitCode::FAILURE)
    }
}

async fn advance(engine: &Engine) -> Result<ExitCode> {
    match engine.advance().await? {
        AdvanceOutcome::Advanced { from, to } => {
            println!("advanced {from} -> {to}");
            Ok(ExitCode::SUCCESS)
        }
        AdvanceOutcome::Rejected { phase, failures } => {
            println!("cannot advance from {phase}:");
            for failure in failures {
                println!("  - {failure}");
            }
            Ok(ExitCode::FAILURE)
        }
        AdvanceOutcome::Stale { current } => {
            println!("already advanced; current phase is {current}");
            Ok(ExitCode::SUCCESS)
        }
        AdvanceOutcome::AlreadyComplete => {
            println!("all phases complete");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn admit(engine: &Engine, phase: Option<&str>) -> Result<ExitCode> {
    let phase: PhaseId = engine.resolve_phase(phase)?.id.clone();
    let admission = engine.admission(&phase);
    let verdict = if admission.admitted() {
        "admitted"
    } else {
        "full"
    };
    println!(
        "{phase}: {}/{} open tickets, {verdict}",
        admission.active, admission.max
    );
    Ok(if admission.admitted() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn watch(engine: Engine, shutdown: Shutdown) -> Result<ExitCode> {
    let engine = Arc::new(engine);
    let watcher = Watcher::for_configured_roots(Arc::clone(&engine))?;
    tracing::info!(position = %engine.position()?, "watch started, Ctrl-C to stop");
    let summary = watcher.run(shutdown).await;
    tracing::info!(
        roots = summary.roots,
        events = summary.debounce.received,
        ignored = summary.ignored,
        triggers = summary.triggers,
        advances = summary.advances,
        "watch stopped"
    );
    Ok(ExitCode::SUCCESS)
}
