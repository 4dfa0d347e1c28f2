use std::path::{Path, PathBuf};

/// Directory (under the repository root) holding all engine state.
pub const STATE_DIR_NAME: &str = ".phasegate";

/// Resolved on-disk locations for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    state_dir: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR_NAME);
        Self { root, state_dir }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.state_dir.join("config.toml")
    }

    #[must_use]
    pub fn phases_file(&self) -> PathBuf {
        self.state_dir.join("phases.toml")
    }

    #[must_use]
    pub fn gates_file(&self) -> PathBuf {
        self.state_dir.join("gates.toml")
    }

    #[must_use]
    pub fn ticket_limits_file(&self) -> PathBuf {
        self.state_dir.join("ticket_limits.toml")
    }

    #[must_use]
    pub fn current_phase_file(&self) -> PathBuf {
        self.state_dir.join("state").join("current_phase")
    }

    #[must_use]
    pub fn gate_markers_dir(&self) -> PathBuf {
        self.state_dir.join("state").join("gates")
    }

    #[must_use]
    pub fn gate_marker(&self, ordinal: u32) -> PathBuf {
        self.gate_markers_dir().join(format!("{ordinal}.done"))
    }

    #[must_use]
    pub fn tickets_dir(&self) -> PathBuf {
        self.state_dir.join("tickets")
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir.join("cache")
    }

    #[must_use]
    pub fn events_log(&self) -> PathBuf {
        self.state_dir.join("logs").join("events.jsonl")
    }

    #[must_use]
    pub fn metrics_log(&self) -> PathBuf {
        self.state_dir.join("logs").join("metrics.jsonl")
    }

    /// Resolve a repository-relative path.
    #[must_use]
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}
