// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Quick-cache side log
//!
//! `quick` has to return as fast as a key press, so it only appends one
//! JSON line to a side log and never loads the library. `sync` (or the
//! watcher in `sync --watch`) later reconciles the log into the store.
//!
//! ```text
//! {"keys":["t","h"],"output":"the","timestamp":"2025-10-10T22:15:00Z"}
//! {"keys":["a","n","d"],"output":"and","category":"words","timestamp":"..."}
//! ```
//!
//! Lines that fail to apply stay in the log for the next attempt. Lines
//! appended while a reconcile is running are kept too.

pub mod watcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::transaction::write_atomically;
use crate::config::ConfigError;
use crate::core::store::{ChordStore, StoreError};
use crate::core::types::{Chord, OutputSpec};

pub use watcher::CacheWatcher;

/// Category for quick chords that did not name one
pub const QUICK_CATEGORY: &str = "quick_impulse";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Quick cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot encode quick chord: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Write(#[from] ConfigError),

    #[error("Cannot watch quick cache: {0}")]
    Watch(#[from] notify::Error),
}

/// One queued chord, as written by `quick`
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PendingChord {
    pub keys: Vec<String>,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A line of the side log
#[derive(Clone, Debug, PartialEq)]
pub enum PendingLine {
    Entry { raw: String, chord: PendingChord },
    Malformed { raw: String, message: String },
}

impl PendingLine {
    fn parse(raw: &str) -> Self {
        match serde_json::from_str::<PendingChord>(raw) {
            Ok(chord) => PendingLine::Entry {
                raw: raw.to_string(),
                chord,
            },
            Err(e) => PendingLine::Malformed {
                raw: raw.to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            PendingLine::Entry { raw, .. } | PendingLine::Malformed { raw, .. } => raw,
        }
    }
}

/// What a reconcile did
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub added: Vec<Chord>,
    /// Entries that could not be added, left in the log
    pub failed: Vec<(PendingChord, StoreError)>,
    /// Unparseable raw lines, left in the log
    pub malformed: Vec<String>,
    /// Lines left in the log afterwards (including late appends)
    pub remaining: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.failed.is_empty() && self.malformed.is_empty()
    }
}

/// Store changes made from a log snapshot, not yet trimmed from the log
#[derive(Debug)]
pub struct Reconciliation {
    report: ReconcileReport,
    snapshot: String,
    keep: Vec<String>,
}

impl Reconciliation {
    pub fn report(&self) -> &ReconcileReport {
        &self.report
    }
}

/// The side log at a fixed path
#[derive(Clone, Debug)]
pub struct QuickCache {
    path: PathBuf,
}

impl QuickCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues a chord; never touches the library
    ///
    /// Keys are stored as given. Validation happens on reconcile.
    pub fn append<S: AsRef<str>>(
        &self,
        keys: &[S],
        output: &str,
        category: Option<&str>,
    ) -> Result<PendingChord, CacheError> {
        let pending = PendingChord {
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
            output: output.to_string(),
            category: category.map(str::to_string),
            timestamp: Utc::now(),
        };
        let line = format!("{}\n", serde_json::to_string(&pending)?);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // One write call per line so concurrent appenders don't interleave
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;

        debug!(path = %self.path.display(), keys = ?pending.keys, "Quick chord queued");
        Ok(pending)
    }

    fn read(&self) -> Result<String, CacheError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Queued lines, oldest first
    pub fn pending(&self) -> Result<Vec<PendingLine>, CacheError> {
        Ok(parse_lines(&self.read()?))
    }

    /// Applies every queued chord to `store`
    ///
    /// Consumed lines are removed from the log; failed and malformed lines
    /// stay, as does anything appended since the log was read. An empty log
    /// is deleted.
    pub fn reconcile(&self, store: &mut ChordStore) -> Result<ReconcileReport, CacheError> {
        let reconciliation = self.apply(store)?;
        self.settle(reconciliation)
    }

    /// First half of [`reconcile`](Self::reconcile): mutates the store only
    ///
    /// The log is left untouched until [`settle`](Self::settle), so a caller
    /// that fails to persist the store loses nothing.
    pub fn apply(&self, store: &mut ChordStore) -> Result<Reconciliation, CacheError> {
        let snapshot = self.read()?;
        let mut report = ReconcileReport::default();
        let mut keep: Vec<String> = Vec::new();

        for line in parse_lines(&snapshot) {
            match line {
                PendingLine::Entry { raw, chord } => {
                    let category = chord
                        .category
                        .clone()
                        .unwrap_or_else(|| QUICK_CATEGORY.to_string());
                    let output = OutputSpec::text(chord.output.clone());
                    match store.add(&chord.keys, output, Some(category)) {
                        Ok(added) => {
                            for overlap in &added.warnings {
                                warn!(chord = %added.chord, %overlap, "Quick chord overlaps");
                            }
                            report.added.push(added.chord);
                        }
                        Err(e) => {
                            warn!(keys = ?chord.keys, error = %e, "Quick chord not applied");
                            keep.push(raw);
                            report.failed.push((chord, e));
                        }
                    }
                }
                PendingLine::Malformed { raw, message } => {
                    warn!(line = %raw, %message, "Malformed quick cache line");
                    keep.push(raw.clone());
                    report.malformed.push(raw);
                }
            }
        }

        Ok(Reconciliation {
            report,
            snapshot,
            keep,
        })
    }

    /// Second half of [`reconcile`](Self::reconcile): trims the log
    pub fn settle(&self, reconciliation: Reconciliation) -> Result<ReconcileReport, CacheError> {
        let Reconciliation {
            mut report,
            snapshot,
            mut keep,
        } = reconciliation;

        keep.extend(self.appended_since(&snapshot)?);
        report.remaining = keep.len();

        if keep.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
        } else if !report.added.is_empty() {
            // Otherwise the log already holds exactly `keep`
            let mut content = keep.join("\n");
            content.push('\n');
            write_atomically(&self.path, &content)?;
        }

        info!(
            added = report.added.len(),
            failed = report.failed.len(),
            malformed = report.malformed.len(),
            remaining = report.remaining,
            "Quick cache reconciled"
        );
        Ok(report)
    }

    /// Lines another process appended after `snapshot` was read
    fn appended_since(&self, snapshot: &str) -> Result<Vec<String>, CacheError> {
        let current = self.read()?;

        if let Some(tail) = current.strip_prefix(snapshot) {
            return Ok(non_blank_lines(tail).map(str::to_string).collect());
        }

        // Rewritten underneath us: keep only lines the snapshot did not hold
        warn!(path = %self.path.display(), "Quick cache rewritten during reconcile");
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for line in non_blank_lines(snapshot) {
            *seen.entry(line).or_default() += 1;
        }

        Ok(non_blank_lines(&current)
            .filter(|line| match seen.get_mut(line) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    false
                }
                _ => true,
            })
            .map(str::to_string)
            .collect())
    }
}

fn non_blank_lines(content: &str) -> impl Iterator<Item = &str> {
    content.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn parse_lines(content: &str) -> Vec<PendingLine> {
    non_blank_lines(content).map(PendingLine::parse).collect()
}

#[cfg(test)]
mod tests;
