use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Serde helper for fields that default to `true`.
const fn default_true() -> bool {
    true
}

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Path fragments ignored by the watcher when no list is configured.
pub const DEFAULT_IGNORE: &[&str] = &[
    ".git/",
    "target/",
    "node_modules/",
    "__pycache__",
    ".swp",
    "~",
    ".phasegate/",
];

/// Engine settings from `.phasegate/config.toml`.
///
/// ```toml
/// [cache]
/// ttl_secs = 300
///
/// [watch]
/// debounce_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub watch: WatchSettings,
    pub gates: GateSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
            max_entries: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// Watched roots, relative to the repository root.
    pub roots: Vec<PathBuf>,
    pub debounce: Duration,
    pub poll_interval: Duration,
    /// Substrings; a path containing any of them is never reported.
    pub ignore: Vec<String>,
}

impl WatchSettings {
    /// Whether a repository-relative path falls under an ignore-list fragment.
    ///
    /// Directories are tested with a trailing `/` so `target/` also excludes
    /// the `target` directory entry itself.
    #[must_use]
    pub fn is_ignored(&self, relative: &Path, is_dir: bool) -> bool {
        let mut raw = relative.to_string_lossy().replace('\\', "/");
        if is_dir && !raw.ends_with('/') {
            raw.push('/');
        }
        self.ignore.iter().any(|fragment| raw.contains(fragment.as_str()))
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: Duration::from_millis(250),
            ignore: DEFAULT_IGNORE.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    pub default_timeout: Duration,
    /// Maximum characters of command output quoted in a failure reason.
    pub output_excerpt_chars: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
            output_excerpt_chars: 400,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawSettings {
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    watch: RawWatch,
    #[serde(default)]
    gates: RawGateSettings,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCache {
    #[serde(default = "default_true")]
    enabled: bool,
    ttl_secs: Option<u64>,
    max_entries: Option<usize>,
}

impl Default for RawCache {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
            max_entries: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWatch {
    roots: Option<Vec<PathBuf>>,
    debounce_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    ignore: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGateSettings {
    default_timeout_secs: Option<u64>,
    output_excerpt_chars: Option<usize>,
}

impl RawSettings {
    /// Apply defaults and range checks. Returns a message on invalid values.
    pub(crate) fn resolve(self) -> Result<Settings, String> {
        let defaults = Settings::default();

        let cache = CacheSettings {
            enabled: self.cache.enabled,
            ttl: self
                .cache
                .ttl_secs
                .map_or(defaults.cache.ttl, Duration::from_secs),
            max_entries: self
                .cache
                .max_entries
                .unwrap_or(defaults.cache.max_entries),
        };
        if cache.max_entries == 0 {
            return Err("cache.max_entries must be at least 1".to_string());
        }

        let mut ignore = self.watch.ignore.unwrap_or(defaults.watch.ignore);
        ignore.retain(|s| !s.is_empty());
        // The state directory is always excluded, or every persisted marker
        // would trigger another validation.
        if !ignore.iter().any(|s| s == ".phasegate/") {
            ignore.push(".phasegate/".to_string());
        }
        let watch = WatchSettings {
            roots: self.watch.roots.unwrap_or(defaults.watch.roots),
            debounce: self
                .watch
                .debounce_ms
                .map_or(defaults.watch.debounce, Duration::from_millis),
            poll_interval: self
                .watch
                .poll_interval_ms
                .map_or(defaults.watch.poll_interval, Duration::from_millis),
            ignore,
        };
        if watch.roots.is_empty() {
            return Err("watch.roots must list at least one root".to_string());
        }
        if watch.debounce.is_zero() || watch.poll_interval.is_zero() {
            return Err("watch.debounce_ms and watch.poll_interval_ms must be positive".to_string());
        }

        let default_timeout = match self.gates.default_timeout_secs {
            None => defaults.gates.default_timeout,
            Some(secs) => check_timeout(secs)?,
        };
        let gates = GateSettings {
            default_timeout,
            output_excerpt_chars: self
                .gates
                .output_excerpt_chars
                .unwrap_or(defaults.gates.output_excerpt_chars),
        };

        Ok(Settings {
            cache,
            watch,
            gates,
        })
    }
}

pub(crate) fn check_timeout(secs: u64) -> Result<Duration, String> {
    if secs == 0 || secs > MAX_COMMAND_TIMEOUT_SECS {
        return Err(format!(
            "command timeout {secs}s out of range (1..={MAX_COMMAND_TIMEOUT_SECS})"
        ));
    }
    Ok(Duration::from_secs(secs))
}
