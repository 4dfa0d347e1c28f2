//! Configuration loading for phasegate.
//!
//! Four documents under `.phasegate/` describe a repository's workflow:
//! `phases.toml` (ordered phases and the paths they own), `gates.toml`
//! (preconditions per phase), `ticket_limits.toml` and the optional engine
//! `config.toml`. Everything is loaded and validated once at startup; any
//! problem is a [`ConfigError`] and is fatal for the process.

mod documents;
mod layout;
mod limits;
mod patterns;
mod settings;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use phasegate_types::{
    CommandGate, ContainsGate, CountGate, ExistsGate, Gate, GateKind, NUMBERED_LINE_PATTERN,
    Phase, PhaseId, PhaseSequence,
};
use serde::de::DeserializeOwned;

use documents::{GateDoc, GatesDoc, PhasesDoc, TicketLimitsDoc};
pub use layout::{Layout, STATE_DIR_NAME};
pub use limits::{DEFAULT_TICKET_LIMIT, TicketLimits};
pub use patterns::PhaseMatcher;
pub use settings::{
    CacheSettings, DEFAULT_CACHE_TTL, DEFAULT_COMMAND_TIMEOUT, DEFAULT_DEBOUNCE, DEFAULT_IGNORE,
    GateSettings, MAX_COMMAND_TIMEOUT_SECS, Settings, WatchSettings,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration in {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } | Self::Invalid { path, .. } => path,
        }
    }

    fn invalid(path: &Path, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Fully validated configuration for one repository.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub layout: Layout,
    pub phases: PhaseSequence,
    pub matcher: PhaseMatcher,
    pub limits: TicketLimits,
    pub settings: Settings,
}

impl EngineConfig {
    /// Load every configuration document for the repository at `root`.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let layout = Layout::new(root);

        let settings_path = layout.settings_file();
        let settings = read_optional::<settings::RawSettings>(&settings_path)?
            .unwrap_or_default()
            .resolve()
            .map_err(|msg| ConfigError::invalid(&settings_path, msg))?;

        let phases_path = layout.phases_file();
        let phases_doc: PhasesDoc = read_required(&phases_path)?;
        let gates_path = layout.gates_file();
        let gates_doc: GatesDoc = read_required(&gates_path)?;

        let phases = build_sequence(phases_doc, gates_doc, &settings, &phases_path, &gates_path)?;
        let matcher = PhaseMatcher::new(&phases)
            .map_err(|e| ConfigError::invalid(&phases_path, format!("bad watch pattern: {e}")))?;

        let limits_path = layout.ticket_limits_file();
        let limits = match read_optional::<TicketLimitsDoc>(&limits_path)? {
            Some(doc) => build_limits(doc, &phases, &limits_path)?,
            None => TicketLimits::default(),
        };

        tracing::debug!(
            root = %layout.root().display(),
            phases = phases.len(),
            "configuration loaded"
        );

        Ok(Self {
            layout,
            phases,
            matcher,
            limits,
            settings,
        })
    }
}

fn read_required<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    read_optional(path)?.ok_or_else(|| ConfigError::Read {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::NotFound, "required document is missing"),
    })
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn build_sequence(
    phases_doc: PhasesDoc,
    mut gates_doc: GatesDoc,
    settings: &Settings,
    phases_path: &Path,
    gates_path: &Path,
) -> Result<PhaseSequence, ConfigError> {
    let mut phases = Vec::with_capacity(phases_doc.phases.len());
    for doc in phases_doc.phases {
        let id = PhaseId::new(doc.id).map_err(|e| ConfigError::invalid(phases_path, e.to_string()))?;
        if let Err(e) = patterns::compile_globs(&doc.patterns) {
            return Err(ConfigError::invalid(
                phases_path,
                format!("phase `{id}`: bad watch pattern: {e}"),
            ));
        }
        let gates = gates_doc
            .gates
            .remove(id.as_str())
            .unwrap_or_default()
            .into_iter()
            .map(|g| build_gate(g, settings))
            .collect::<Result<Vec<_>, String>>()
            .map_err(|msg| ConfigError::invalid(gates_path, format!("phase `{id}`: {msg}")))?;
        phases.push(Phase {
            id,
            ordinal: 0,
            patterns: doc.patterns,
            auto_advance: doc.auto_advance,
            gates,
        });
    }

    if let Some(unknown) = gates_doc.gates.keys().next() {
        return Err(ConfigError::invalid(
            gates_path,
            format!("gates declared for unknown phase `{unknown}`"),
        ));
    }

    PhaseSequence::new(phases).map_err(|e| ConfigError::invalid(phases_path, e.to_string()))
}

fn build_gate(doc: GateDoc, settings: &Settings) -> Result<Gate, String> {
    let (name, kind) = match doc {
        GateDoc::Exists { name, path } => {
            let path = check_relative(path)?;
            (name, GateKind::Exists(ExistsGate { path }))
        }
        GateDoc::Contains {
            name,
            path,
            pattern,
            regex,
        } => {
            let path = check_relative(path)?;
            if pattern.is_empty() {
                return Err(format!("contains gate on `{path}` has an empty pattern"));
            }
            if regex {
                check_regex(&pattern)?;
            }
            (
                name,
                GateKind::Contains(ContainsGate {
                    path,
                    pattern,
                    regex,
                }),
            )
        }
        GateDoc::Count {
            name,
            path,
            pattern,
            min,
            label,
        } => {
            let path = check_relative(path)?;
            let pattern = pattern.unwrap_or_else(|| NUMBERED_LINE_PATTERN.to_string());
            check_regex(&pattern)?;
            (
                name,
                GateKind::Count(CountGate {
                    path,
                    pattern,
                    min,
                    label: label.unwrap_or_else(|| "task".to_string()),
                }),
            )
        }
        GateDoc::Command {
            name,
            command,
            args,
            timeout_secs,
        } => {
            if command.trim().is_empty() {
                return Err("command gate has an empty command".to_string());
            }
            let timeout = match timeout_secs {
                Some(secs) => settings::check_timeout(secs)?,
                None => settings.gates.default_timeout,
            };
            (
                name,
                GateKind::Command(CommandGate {
                    command,
                    args,
                    timeout,
                }),
            )
        }
    };

    let name = name.unwrap_or_else(|| default_gate_name(&kind));
    Ok(Gate { name, kind })
}

fn default_gate_name(kind: &GateKind) -> String {
    match kind {
        GateKind::Command(cmd) => format!("command:{}", cmd.display()),
        other => format!("{}:{}", other.label(), other.target_path().unwrap_or_default()),
    }
}

/// Gate targets must stay inside the repository.
fn check_relative(path: String) -> Result<String, String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("gate path must not be empty".to_string());
    }
    let escapes = Path::new(trimmed).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(format!(
            "gate path `{trimmed}` must be relative to the repository root"
        ));
    }
    Ok(trimmed.to_string())
}

fn check_regex(pattern: &str) -> Result<(), String> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| format!("invalid pattern `{pattern}`: {e}"))
}

fn build_limits(
    doc: TicketLimitsDoc,
    phases: &PhaseSequence,
    path: &Path,
) -> Result<TicketLimits, ConfigError> {
    let mut per_phase = HashMap::with_capacity(doc.limits.len());
    for (raw_id, max) in doc.limits {
        let id = PhaseId::new(raw_id).map_err(|e| ConfigError::invalid(path, e.to_string()))?;
        if phases.get(&id).is_none() {
            return Err(ConfigError::invalid(
                path,
                format!("ticket limit declared for unknown phase `{id}`"),
            ));
        }
        per_phase.insert(id, max);
    }
    Ok(TicketLimits::new(
        doc.default.unwrap_or(DEFAULT_TICKET_LIMIT),
        per_phase,
    ))
}
