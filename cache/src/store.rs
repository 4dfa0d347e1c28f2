//! On-disk validation cache with TTL.
//!
//! - Path layout: `{cache_dir}/{first2}/{key_id}.json`
//! - Versioned entry format
//! - Only passing results are stored
//! - Expired entries are deleted lazily on lookup (no background sweep)
//! - Capacity pressure evicts the oldest entries on `put`
//! - Atomic writes (temp + rename)
//!
//! The disk is the only state, so one instance can be shared across tasks
//! without locking. Read failures are treated as a miss.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use phasegate_config::CacheSettings;
use phasegate_types::ValidationReport;
use phasegate_utils::{AtomicWriteOptions, atomic_write_with_options};
use serde::{Deserialize, Serialize};

use crate::key::CacheKey;

/// Current cache entry format version.
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub phase: String,
    pub ticket: Option<String>,
    pub digest: String,
    pub passed: bool,
    pub failures: Vec<String>,
    /// Creation time in Unix milliseconds; the TTL is measured from here.
    pub created_at_ms: u64,
    /// Creation time, RFC 3339, for people reading the file.
    pub created_at: String,
}

impl CacheEntry {
    #[must_use]
    pub fn new(key: &CacheKey, report: &ValidationReport, now: SystemTime) -> Self {
        Self {
            version: CACHE_VERSION,
            phase: key.phase.to_string(),
            ticket: key.ticket.as_ref().map(ToString::to_string),
            digest: key.digest.clone(),
            passed: report.passed(),
            failures: report.failures.clone(),
            created_at_ms: unix_ms(now),
            created_at: chrono::DateTime::<chrono::Utc>::from(now).to_rfc3339(),
        }
    }

    /// Valid only while `0 <= now - created_at < ttl`. An entry stamped in
    /// the future (the clock stepped backwards) is expired.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: SystemTime) -> bool {
        let Some(age_ms) = unix_ms(now).checked_sub(self.created_at_ms) else {
            return true;
        };
        u128::from(age_ms) >= ttl.as_millis()
    }

    fn matches(&self, key: &CacheKey) -> bool {
        self.phase == key.phase.as_str()
            && self.ticket.as_deref() == key.ticket.as_ref().map(|t| t.as_str())
            && self.digest == key.digest
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheWriteError {
    #[error("cache is disabled")]
    Disabled,
    #[error("failed to serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// What `put` did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored { evicted: usize },
    /// Failing results are never cached.
    SkippedFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ValidationCache {
    dir: PathBuf,
    settings: CacheSettings,
}

impl ValidationCache {
    pub fn new(dir: impl Into<PathBuf>, settings: CacheSettings) -> Self {
        Self {
            dir: dir.into(),
            settings,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.get_at(key, SystemTime::now())
    }

    /// Look up `key` as of `now`. Corrupt, foreign-version and expired
    /// entries are deleted and reported as a miss.
    pub fn get_at(&self, key: &CacheKey, now: SystemTime) -> Option<CacheEntry> {
        if !self.settings.enabled {
            return None;
        }
        let path = self.entry_path(&key.id());
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), "cache read failed, treating as miss: {e}");
                }
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(path = %path.display(), "corrupt cache entry removed: {e}");
                remove_quietly(&path);
                return None;
            }
        };

        if entry.version != CACHE_VERSION || !entry.matches(key) || !entry.passed {
            remove_quietly(&path);
            return None;
        }

        if entry.is_expired(self.settings.ttl, now) {
            tracing::debug!(phase = %entry.phase, "cache entry expired");
            remove_quietly(&path);
            return None;
        }

        Some(entry)
    }

    /// Store a passing entry. Failing entries are skipped.
    pub fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<PutOutcome, CacheWriteError> {
        if !self.settings.enabled {
            return Err(CacheWriteError::Disabled);
        }
        if !entry.passed {
            return Ok(PutOutcome::SkippedFailure);
        }
        let content = serde_json::to_vec_pretty(entry)?;
        atomic_write_with_options(
            self.entry_path(&key.id()),
            &content,
            AtomicWriteOptions::SCRATCH,
        )?;
        let evicted = self.evict_over_capacity();
        Ok(PutOutcome::Stored { evicted })
    }

    /// Entry count and total size on disk.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for (_, meta) in self.scan() {
            stats.entries += 1;
            stats.bytes += meta.len();
        }
        stats
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> io::Result<usize> {
        let entries = self.scan();
        let count = entries.len();
        for (path, _) in entries {
            fs::remove_file(&path)?;
        }
        Ok(count)
    }

    fn evict_over_capacity(&self) -> usize {
        let mut entries = self.scan();
        if entries.len() <= self.settings.max_entries {
            return 0;
        }
        entries.sort_by_key(|(_, meta)| meta.modified().unwrap_or(UNIX_EPOCH));
        let excess = entries.len() - self.settings.max_entries;
        let mut evicted = 0;
        for (path, _) in entries.into_iter().take(excess) {
            if fs::remove_file(&path).is_ok() {
                evicted += 1;
            }
        }
        tracing::debug!(evicted, "cache evicted entries over capacity");
        evicted
    }

    /// All `*.json` entries under the two-level layout.
    fn scan(&self) -> Vec<(PathBuf, fs::Metadata)> {
        let mut out = Vec::new();
        let Ok(subdirs) = fs::read_dir(&self.dir) else {
            return out;
        };
        for subdir in subdirs.flatten() {
            let subdir_path = subdir.path();
            if !subdir_path.is_dir() {
                continue;
            }
            let Ok(files) = fs::read_dir(&subdir_path) else {
                continue;
            };
            for file in files.flatten() {
                let path = file.path();
                if path.extension().is_some_and(|ext| ext == "json")
                    && let Ok(meta) = file.metadata()
                {
                    out.push((path, meta));
                }
            }
        }
        out
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        let prefix = id.get(..2).unwrap_or("00");
        self.dir.join(prefix).join(format!("{id}.json"))
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::debug!(path = %path.display(), "failed to remove cache entry: {e}");
    }
}

fn unix_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
