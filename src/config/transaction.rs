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

//! File transaction management with automatic backups
//!
//! Provides atomic write operations: the file is either entirely the old
//! content or entirely the new content, never a mix.

use atomic_write_file::AtomicWriteFile;
use std::{io::Write, path::{Path, PathBuf}};
use tracing::{info, warn};

use crate::config::{ConfigError, ConfigManager};

/// Atomic file transaction with automatic backup.
///
/// # Lifecycle
///
/// 1. `begin()` - Creates timestamped backup immediately
/// 2. Caller prepares new content (in memory)
/// 3. `commit()` - Writes atomically; dropping the transaction instead
///    leaves the file untouched
///
/// # Example
///
/// ```no_run
/// use karabiner_chord_manager::config::{ConfigManager, ConfigTransaction};
/// use std::path::PathBuf;
///
/// let manager = ConfigManager::new(PathBuf::from("karabiner.json"))?;
/// let tx = ConfigTransaction::begin(&manager)?;
///
/// match tx.commit("{}") {
///     Ok(()) => println!("Changes applied"),
///     Err(e) => eprintln!("Commit failed: {}", e),
/// }
/// # Ok::<(), karabiner_chord_manager::config::ConfigError>(())
/// ```
pub struct ConfigTransaction<'a> {
    manager: &'a ConfigManager,
    backup_path: Option<PathBuf>,
}

pub(crate) fn write_atomically(path: &Path, content: &str) -> Result<(), ConfigError> {
    let mut file = AtomicWriteFile::options().open(path).map_err(|e| {
        ConfigError::WriteFailed(format!("Failed to open for atomic write: {}", e))
    })?;

    file.write_all(content.as_bytes())
        .map_err(|e| ConfigError::WriteFailed(format!("Failed to write content: {}", e)))?;

    file.commit()
        .map_err(|e| ConfigError::WriteFailed(format!("Failed to commit atomic write: {}", e)))
}

impl<'a> ConfigTransaction<'a> {
    /// Begins a new transaction by creating a timestamped backup.
    ///
    /// The transaction cannot outlive the manager (lifetime `'a`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the backup cannot be
    /// written. Nothing has been modified in that case.
    pub fn begin(manager: &'a ConfigManager) -> Result<Self, ConfigError> {
        let backup_path = manager.create_timestamped_backup()?;

        Ok(Self {
            manager,
            backup_path: Some(backup_path),
        })
    }

    /// Path of the backup taken by `begin()`
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    /// Atomically replaces the file content, then prunes old backups.
    ///
    /// Consumes the transaction, preventing double commits. If the write
    /// fails the original file is untouched and the backup is still there.
    /// A failed prune is logged, not returned: the new content is already
    /// in place at that point.
    pub fn commit(self, new_content: &str) -> Result<(), ConfigError> {
        write_atomically(&self.manager.config_path, new_content)?;

        info!(
            path = %self.manager.config_path.display(),
            backup = ?self.backup_path(),
            bytes = new_content.len(),
            "Committed"
        );

        if let Err(e) = self.manager.cleanup_old_backups() {
            warn!(error = %e, "Failed to prune old backups");
        }

        Ok(())
    }
}
