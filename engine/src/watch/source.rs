//! Change notification sources.
//!
//! A [`ChangeSource`] reports what changed under one watched root since it
//! was last asked. Delivery is at-least-once: reporting a change twice is
//! harmless because validation re-reads the full repository state.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use ignore::WalkBuilder;
use phasegate_config::WatchSettings;
use phasegate_types::{FileEvent, FileEventKind};
use sha2::{Digest, Sha256};

/// Files up to this size are content-hashed while their mtime is recent.
const HASH_LIMIT_BYTES: u64 = 64 * 1024;

/// Coarsest filesystem timestamp granularity we expect to meet.
const TIMESTAMP_SLACK: Duration = Duration::from_secs(2);

pub trait ChangeSource: Send + 'static {
    /// The watched root, relative to the repository root.
    fn root(&self) -> &Path;

    /// Changes observed since the previous call. Blocking.
    fn changes(&mut self) -> Vec<FileEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: Option<SystemTime>,
    len: u64,
    /// Content digest, taken only while `modified` is too recent to tell a
    /// same-length rewrite within one timestamp tick apart.
    digest: Option<[u8; 32]>,
}

impl Stamp {
    fn same_contents(&self, other: &Self) -> bool {
        if self.modified != other.modified || self.len != other.len {
            return false;
        }
        match (self.digest, other.digest) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Polls one root and diffs (mtime, length) snapshots. Recently modified
/// small files are also compared by content.
#[derive(Debug)]
pub struct PollingSource {
    repo_root: PathBuf,
    root: PathBuf,
    watch: WatchSettings,
    snapshot: HashMap<PathBuf, Stamp>,
}

impl PollingSource {
    /// Open `root` (relative to `repo_root`), creating it when missing. The
    /// current tree becomes the baseline: pre-existing files are not
    /// reported.
    pub fn open(repo_root: &Path, root: &Path, watch: &WatchSettings) -> io::Result<Self> {
        let abs = repo_root.join(root);
        if !abs.exists() {
            fs::create_dir_all(&abs)?;
            tracing::info!(root = %root.display(), "created missing watch root");
        } else if !abs.is_dir() {
            return Err(io::Error::other(format!(
                "{} is not a directory",
                abs.display()
            )));
        }
        let mut source = Self {
            repo_root: repo_root.to_path_buf(),
            root: root.to_path_buf(),
            watch: watch.clone(),
            snapshot: HashMap::new(),
        };
        source.snapshot = source.scan();
        Ok(source)
    }

    fn scan(&self) -> HashMap<PathBuf, Stamp> {
        let repo_root = self.repo_root.clone();
        let watch = self.watch.clone();
        let mut builder = WalkBuilder::new(self.repo_root.join(&self.root));
        builder.standard_filters(false);
        builder.filter_entry(move |entry| {
            let Ok(rel) = entry.path().strip_prefix(&repo_root) else {
                return true;
            };
            if rel.as_os_str().is_empty() {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !watch.is_ignored(rel, is_dir)
        });

        let now = SystemTime::now();
        let racy_window = self.watch.poll_interval + TIMESTAMP_SLACK;
        let mut snapshot = HashMap::new();
        for entry in builder.build().flatten() {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.repo_root) else {
                continue;
            };
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let modified = meta.modified().ok();
            // A future mtime counts as recent.
            let recent = modified.is_some_and(|m| {
                now.duration_since(m).map_or(true, |age| age <= racy_window)
            });
            let digest = if recent && meta.len() <= HASH_LIMIT_BYTES {
                fs::read(entry.path())
                    .ok()
                    .map(|bytes| Sha256::digest(&bytes).into())
            } else {
                None
            };
            snapshot.insert(
                normalize(rel),
                Stamp {
                    modified,
                    len: meta.len(),
                    digest,
                },
            );
        }
        snapshot
    }
}

impl ChangeSource for PollingSource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn changes(&mut self) -> Vec<FileEvent> {
        let next = self.scan();
        let events = diff(&self.snapshot, &next);
        self.snapshot = next;
        events
    }
}

/// Events turning `before` into `after`. A deleted and a created path with
/// identical stamps in the same scan are reported as a rename of the new
/// path (plus the deletion of the old one).
fn diff(before: &HashMap<PathBuf, Stamp>, after: &HashMap<PathBuf, Stamp>) -> Vec<FileEvent> {
    let mut deleted: Vec<(&PathBuf, &Stamp)> = before
        .iter()
        .filter(|(path, _)| !after.contains_key(*path))
        .collect();
    deleted.sort_by(|a, b| a.0.cmp(b.0));

    let mut created: Vec<(&PathBuf, &Stamp)> = Vec::new();
    let mut events = Vec::new();
    for (path, stamp) in after {
        match before.get(path) {
            None => created.push((path, stamp)),
            Some(old) if !old.same_contents(stamp) => {
                events.push(FileEvent::new(path.clone(), FileEventKind::Modified));
            }
            Some(_) => {}
        }
    }
    created.sort_by(|a, b| a.0.cmp(b.0));

    let mut rename_sources: Vec<&Stamp> = deleted.iter().map(|(_, s)| *s).collect();
    for (path, stamp) in created {
        let kind = match rename_sources.iter().position(|s| s.same_contents(stamp)) {
            Some(i) => {
                rename_sources.swap_remove(i);
                FileEventKind::Renamed
            }
            None => FileEventKind::Created,
        };
        events.push(FileEvent::new(path.clone(), kind));
    }
    for (path, _) in deleted {
        events.push(FileEvent::new(path.clone(), FileEventKind::Deleted));
    }
    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

fn normalize(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy().replace('\\', "/");
    PathBuf::from(raw.strip_prefix("./").unwrap_or(&raw))
}
