//! Append-only JSON-lines logs.
//!
//! One serialized record per line. Readers skip lines that fail to parse so a
//! torn final write never makes the whole log unreadable.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. The line is written with a single `write_all` so
    /// concurrent appenders do not interleave within a record.
    pub fn append<T: Serialize>(&self, record: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)
    }

    /// Read the last `limit` parseable records, oldest first.
    ///
    /// A missing log reads as empty.
    pub fn tail<T: DeserializeOwned>(&self, limit: usize) -> io::Result<Vec<T>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut window = VecDeque::with_capacity(limit.min(1024));
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => {
                    if window.len() == limit {
                        window.pop_front();
                    }
                    window.push_back(record);
                }
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), "skipping malformed log line: {e}");
                }
            }
        }
        Ok(window.into_iter().collect())
    }
}
