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

//! Persisted chord library
//!
//! The library is a versioned JSON document:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "metadata": { "saved_at": "2025-10-10T22:15:00Z", "chord_count": 2 },
//!   "chords": [ ... ],
//!   "history": [ "<chord id>", ... ]
//! }
//! ```
//!
//! The undo history is stored alongside the chords so `undo` works across
//! separate CLI invocations. Other versions are refused; there is no
//! migration path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{ConfigError, ConfigManager};
use crate::core::store::ChordStore;
use crate::core::types::{Chord, ChordId};

/// The only document version this build reads and writes
pub const LIBRARY_VERSION: &str = "1.0";

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LibraryMetadata {
    pub saved_at: DateTime<Utc>,
    pub chord_count: usize,
}

/// On-disk shape of the library
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LibraryDocument {
    pub version: String,
    pub metadata: LibraryMetadata,
    #[serde(default)]
    pub chords: Vec<Chord>,
    #[serde(default)]
    pub history: Vec<ChordId>,
}

impl LibraryDocument {
    pub fn from_store(store: &ChordStore) -> Self {
        Self {
            version: LIBRARY_VERSION.to_string(),
            metadata: LibraryMetadata {
                saved_at: Utc::now(),
                chord_count: store.len(),
            },
            chords: store.snapshot(),
            history: store.history(),
        }
    }

    /// Rebuilds the store, checking version and chord invariants
    pub fn into_store(self) -> Result<ChordStore, ConfigError> {
        if self.version != LIBRARY_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                expected: LIBRARY_VERSION.to_string(),
            });
        }

        Ok(ChordStore::from_parts(self.chords, self.history)?)
    }
}

/// Reads a library without opening it for writing
///
/// A missing file is an empty library. Nothing is created on disk.
pub fn read_library(path: &Path) -> Result<ChordStore, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_library(&content, path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChordStore::new()),
        Err(e) => Err(e.into()),
    }
}

fn parse_library(content: &str, path: &Path) -> Result<ChordStore, ConfigError> {
    if content.trim().is_empty() {
        debug!(path = %path.display(), "Empty library");
        return Ok(ChordStore::new());
    }

    let document: LibraryDocument =
        serde_json::from_str(content).map_err(|e| ConfigError::InvalidLibrary {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let store = document.into_store()?;
    debug!(chords = store.len(), "Library loaded");
    Ok(store)
}

/// The library file on disk, written through atomic transactions
#[derive(Debug)]
pub struct LibraryFile {
    manager: ConfigManager,
}

impl LibraryFile {
    /// Opens (or creates empty) the library at `path`
    pub fn open(
        path: PathBuf,
        backup_dir: Option<PathBuf>,
        backup_limit: usize,
    ) -> Result<Self, ConfigError> {
        let mut manager = ConfigManager::open_or_create(path, "")?.with_backup_limit(backup_limit);
        if let Some(dir) = backup_dir {
            manager = manager.with_backup_dir(dir)?;
        }

        Ok(Self { manager })
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    /// Reads the library into a fresh store
    ///
    /// An empty (just created) file is an empty library.
    pub fn load(&self) -> Result<ChordStore, ConfigError> {
        parse_library(&self.manager.read_config()?, self.manager.path())
    }

    /// Writes the whole store atomically, keeping a backup of the old file
    pub fn save(&self, store: &ChordStore) -> Result<(), ConfigError> {
        let document = LibraryDocument::from_store(store);
        let content =
            serde_json::to_string_pretty(&document).map_err(|e| ConfigError::InvalidLibrary {
                path: self.manager.path().to_path_buf(),
                message: e.to_string(),
            })?;

        self.manager.begin_transaction()?.commit(&content)?;
        info!(chords = store.len(), "Library saved");
        Ok(())
    }
}
