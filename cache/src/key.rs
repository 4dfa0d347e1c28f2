//! Content-addressed cache keys.
//!
//! The digest covers, in sorted path order, every file matched by the
//! phase's watch patterns plus each gate's target path, each concatenated
//! with its full byte content. Traversal order therefore never changes the
//! key, and any content change (including a file appearing or disappearing)
//! produces a different key. A fingerprint of the phase's gate definitions is
//! mixed in so editing a gate also invalidates earlier passes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use phasegate_config::{PhaseMatcher, STATE_DIR_NAME};
use phasegate_types::{Phase, PhaseId, TicketId};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub phase: PhaseId,
    pub ticket: Option<TicketId>,
    /// Hex SHA-256 over the watched file set.
    pub digest: String,
}

impl CacheKey {
    /// File-name-safe identifier combining all three key components.
    #[must_use]
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.phase.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.ticket.as_ref().map_or("", TicketId::as_str).as_bytes());
        hasher.update([0]);
        hasher.update(self.digest.as_bytes());
        hex(&hasher.finalize())
    }
}

/// Inputs needed to derive a key for one phase.
pub struct KeyInputs<'a> {
    pub root: &'a Path,
    pub phase: &'a Phase,
    pub matcher: &'a PhaseMatcher,
}

impl KeyInputs<'_> {
    /// Repository-relative paths of every file the phase's watch patterns match,
    /// sorted. The watcher's ignore list does not apply here; only the
    /// engine's own state directory is skipped.
    pub fn watched_files(&self) -> Vec<PathBuf> {
        let root = self.root;
        let state_dir = root.join(STATE_DIR_NAME);
        let mut builder = WalkBuilder::new(root);
        builder.standard_filters(false);
        builder.filter_entry(move |entry| entry.path() != state_dir.as_path());

        let mut files = Vec::new();
        for entry in builder.build().flatten() {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            if self.matcher.matches(&self.phase.id, rel) {
                files.push(rel.to_path_buf());
            }
        }
        files.sort();
        files
    }

    /// Compute the key. Any read failure is returned so the caller can treat
    /// it as a cache miss.
    pub fn compute(&self, ticket: Option<&TicketId>) -> io::Result<CacheKey> {
        let mut hasher = Sha256::new();

        let fingerprint = serde_json::to_vec(&self.phase.gates).map_err(io::Error::other)?;
        hasher.update(b"gates\0");
        hasher.update((fingerprint.len() as u64).to_le_bytes());
        hasher.update(&fingerprint);

        // Watched files first, then gate targets that are not already covered.
        // BTreeMap keeps both groups in sorted order.
        let mut inputs: BTreeMap<PathBuf, bool> = BTreeMap::new();
        for path in self.watched_files() {
            inputs.insert(path, true);
        }
        for gate in &self.phase.gates {
            if let Some(target) = gate.kind.target_path() {
                inputs.entry(PathBuf::from(target)).or_insert(false);
            }
        }

        for (rel, watched) in inputs {
            hasher.update(if watched { b"file\0" } else { b"gate\0" });
            hasher.update(rel.to_string_lossy().replace('\\', "/").as_bytes());
            hasher.update([0]);
            match fs::read(self.root.join(&rel)) {
                Ok(bytes) => {
                    hasher.update([1]);
                    hasher.update((bytes.len() as u64).to_le_bytes());
                    hasher.update(&bytes);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => hasher.update([0]),
                // A directory target (exists gate on a dir) has no content to hash.
                Err(_) if self.root.join(&rel).is_dir() => hasher.update([2]),
                Err(e) => return Err(e),
            }
        }

        Ok(CacheKey {
            phase: self.phase.id.clone(),
            ticket: ticket.cloned(),
            digest: hex(&hasher.finalize()),
        })
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use phasegate_config::{PhaseMatcher, STATE_DIR_NAME};
    use phasegate_types::{
        ExistsGate, Gate, GateKind, Phase, PhaseId, PhaseSequence, TicketId,
    };

    use super::KeyInputs;

    fn sequence() -> PhaseSequence {
        sequence_watching(&["docs/**/*.md"])
    }

    fn sequence_watching(patterns: &[&str]) -> PhaseSequence {
        PhaseSequence::new(vec![Phase {
            id: PhaseId::new("plan").unwrap(),
            ordinal: 0,
            patterns: patterns.iter().map(ToString::to_string).collect(),
            auto_advance: false,
            gates: vec![Gate {
                name: "plan".into(),
                kind: GateKind::Exists(ExistsGate {
                    path: "PLAN.md".into(),
                }),
            }],
        }])
        .unwrap()
    }

    fn digest(root: &Path, seq: &PhaseSequence) -> String {
        let matcher = PhaseMatcher::new(seq).unwrap();
        KeyInputs {
            root,
            phase: seq.first(),
            matcher: &matcher,
        }
        .compute(None)
        .unwrap()
        .digest
    }

    #[test]
    fn watched_files_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs/b")).unwrap();
        fs::write(dir.path().join("docs/b/z.md"), "z").unwrap();
        fs::write(dir.path().join("docs/a.md"), "a").unwrap();
        fs::write(dir.path().join("docs/a.txt"), "t").unwrap();

        let seq = sequence();
        let matcher = PhaseMatcher::new(&seq).unwrap();
        let inputs = KeyInputs {
            root: dir.path(),
            phase: seq.first(),
            matcher: &matcher,
        };
        assert_eq!(
            inputs.watched_files(),
            vec![PathBuf::from("docs/a.md"), PathBuf::from("docs/b/z.md")]
        );
    }

    #[test]
    fn watcher_ignore_fragments_do_not_hide_watched_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("build/target")).unwrap();
        fs::write(dir.path().join("build/target/report.txt"), "ok").unwrap();
        fs::write(dir.path().join("build/notes.md~"), "draft").unwrap();
        let seq = sequence_watching(&["build/**"]);
        let matcher = PhaseMatcher::new(&seq).unwrap();
        let inputs = KeyInputs {
            root: dir.path(),
            phase: seq.first(),
            matcher: &matcher,
        };
        assert_eq!(
            inputs.watched_files(),
            vec![
                PathBuf::from("build/notes.md~"),
                PathBuf::from("build/target/report.txt"),
            ]
        );

        let before = digest(dir.path(), &seq);
        fs::write(dir.path().join("build/target/report.txt"), "FAILED").unwrap();
        assert_ne!(before, digest(dir.path(), &seq));
    }

    #[test]
    fn state_directory_is_never_hashed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".phasegate/cache")).unwrap();
        fs::write(dir.path().join("README.md"), "r").unwrap();
        fs::write(dir.path().join(".phasegate/cache/entry.md"), "one").unwrap();
        let seq = sequence_watching(&["**/*.md"]);

        let before = digest(dir.path(), &seq);
        fs::write(dir.path().join(".phasegate/cache/entry.md"), "two").unwrap();
        assert_eq!(before, digest(dir.path(), &seq));
    }

    #[test]
    fn digest_tracks_content_not_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.md"), "one").unwrap();
        let seq = sequence();

        let first = digest(dir.path(), &seq);
        fs::write(dir.path().join("docs/a.md"), "one").unwrap();
        assert_eq!(first, digest(dir.path(), &seq), "rewrite with same bytes");

        fs::write(dir.path().join("docs/a.md"), "two").unwrap();
        assert_ne!(first, digest(dir.path(), &seq));
    }

    #[test]
    fn gate_target_outside_patterns_is_covered() {
        let dir = tempfile::tempdir().unwrap();
        let seq = sequence();
        let absent = digest(dir.path(), &seq);
        fs::write(dir.path().join("PLAN.md"), "").unwrap();
        let present = digest(dir.path(), &seq);
        assert_ne!(absent, present);
    }

    #[test]
    fn ticket_changes_key_id_but_not_digest() {
        let dir = tempfile::tempdir().unwrap();
        let seq = sequence();
        let matcher = PhaseMatcher::new(&seq).unwrap();
        let inputs = KeyInputs {
            root: dir.path(),
            phase: seq.first(),
            matcher: &matcher,
        };
        let ticket = TicketId::new("T-1").unwrap();
        let plain = inputs.compute(None).unwrap();
        let scoped = inputs.compute(Some(&ticket)).unwrap();
        assert_eq!(plain.digest, scoped.digest);
        assert_ne!(plain.id(), scoped.id());
    }
}
