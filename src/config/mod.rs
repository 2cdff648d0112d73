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

//! File management with atomic writes and backup support.
//!
//! Every file this tool owns or edits (the chord library, the settings
//! file, Karabiner's `karabiner.json`) goes through a [`ConfigManager`].
//! Key features:
//!
//! - **Atomic writes**: Uses temp-file-then-rename to prevent corruption
//! - **Automatic backups**: Every write creates a timestamped backup
//! - **Bounded history**: Only the newest `backup_limit` backups are kept
//! - **Symlink warnings**: Logged, but symlinked files are allowed
//!
//! # Example
//!
//! ```no_run
//! use karabiner_chord_manager::config::{ConfigManager, ConfigTransaction};
//!
//! let manager = ConfigManager::open_or_create("/tmp/chords.json".into(), "{}")?;
//! let tx = ConfigTransaction::begin(&manager)?;
//! tx.commit("{\"version\": \"1.0\"}")?;
//! # Ok::<(), karabiner_chord_manager::config::ConfigError>(())
//! ```

pub mod error;
pub mod library;
pub mod settings;
pub mod transaction;

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use error::ConfigError;
pub use library::{read_library, LibraryDocument, LibraryFile, LIBRARY_VERSION};
pub use settings::{Settings, TimingUpdate};
pub use transaction::ConfigTransaction;

/// Default number of backups kept per file
pub const DEFAULT_BACKUP_LIMIT: usize = 5;

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S_%3f";

/// Manages one file with safe atomic operations.
///
/// Provides read-only access and transactional writes with automatic
/// backup creation. All writes go through [`ConfigTransaction`].
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
    backup_dir: PathBuf,
    backup_limit: usize,
}

impl ConfigManager {
    /// Creates a new ConfigManager for an existing file.
    ///
    /// Backups go to a `backups/` directory next to the file, which is
    /// created if missing.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the file doesn't exist.
    /// Returns `ConfigError::BackupDirNotWritable` if the backup directory
    /// cannot be created.
    pub fn new(config_path: PathBuf) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }

        if config_path.read_link().is_ok() {
            warn!(path = %config_path.display(), "File is a symlink; writes replace the link target's content");
        }

        // e.g. ~/.config/karabiner-chords/chords.json → ~/.config/karabiner-chords/backups/
        let backup_dir = config_path
            .parent()
            .ok_or_else(|| {
                ConfigError::BackupDirNotWritable(PathBuf::from(
                    "File has no parent directory",
                ))
            })?
            .join("backups");

        Self::prepare_backup_dir(&backup_dir)?;

        Ok(Self {
            config_path,
            backup_dir,
            backup_limit: DEFAULT_BACKUP_LIMIT,
        })
    }

    /// Like [`ConfigManager::new`], but creates the file (and its parent
    /// directories) with `initial` content first if it does not exist.
    pub fn open_or_create(config_path: PathBuf, initial: &str) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&config_path, initial)?;
            debug!(path = %config_path.display(), "Created file");
        }

        Self::new(config_path)
    }

    /// Moves backups to another directory, creating it if needed
    pub fn with_backup_dir(mut self, backup_dir: PathBuf) -> Result<Self, ConfigError> {
        Self::prepare_backup_dir(&backup_dir)?;
        self.backup_dir = backup_dir;
        Ok(self)
    }

    /// Number of backups kept after each commit (at least one)
    pub fn with_backup_limit(mut self, limit: usize) -> Self {
        self.backup_limit = limit.max(1);
        self
    }

    fn prepare_backup_dir(backup_dir: &Path) -> Result<(), ConfigError> {
        if !backup_dir.exists() {
            fs::create_dir_all(backup_dir)
                .map_err(|_| ConfigError::BackupDirNotWritable(backup_dir.to_path_buf()))?;
        }

        if backup_dir.metadata()?.permissions().readonly() {
            return Err(ConfigError::BackupDirNotWritable(backup_dir.to_path_buf()));
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Reads the current file content.
    pub fn read_config(&self) -> Result<String, ConfigError> {
        Ok(fs::read_to_string(&self.config_path)?)
    }

    fn file_name(&self) -> Result<String, ConfigError> {
        self.config_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ConfigError::BackupFailed(format!(
                    "Path has no UTF-8 file name: {}",
                    self.config_path.display()
                ))
            })
    }

    pub(crate) fn create_timestamped_backup(&self) -> Result<PathBuf, ConfigError> {
        let content = fs::read(&self.config_path)?;

        // e.g. chords.json.2025-10-10_221500_042
        let timestamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT);
        let backup_path = self
            .backup_dir
            .join(format!("{}.{}", self.file_name()?, timestamp));

        fs::write(&backup_path, content)
            .map_err(|e| ConfigError::BackupFailed(format!("{}: {}", backup_path.display(), e)))?;

        debug!(backup = %backup_path.display(), "Created backup");
        Ok(backup_path)
    }

    /// Lists this file's backups, oldest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let prefix = format!("{}.", self.file_name()?);

        let mut backups: Vec<PathBuf> = fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect();

        // Timestamp suffix sorts chronologically
        backups.sort();
        Ok(backups)
    }

    /// Deletes all but the newest `backup_limit` backups.
    ///
    /// Returns the number of files removed.
    pub fn cleanup_old_backups(&self) -> Result<usize, ConfigError> {
        let backups = self.list_backups()?;
        let excess = backups.len().saturating_sub(self.backup_limit);

        for old in &backups[..excess] {
            fs::remove_file(old)?;
        }

        if excess > 0 {
            debug!(removed = excess, "Pruned old backups");
        }
        Ok(excess)
    }

    /// Restores the file from a backup, itself backing up the current state
    pub fn restore_backup(&self, backup_path: &Path) -> Result<(), ConfigError> {
        let content = fs::read_to_string(backup_path)
            .map_err(|_| ConfigError::NotFound(backup_path.to_path_buf()))?;

        ConfigTransaction::begin(self)?.commit(&content)
    }

    /// Starts a transactional write.
    pub fn begin_transaction(&self) -> Result<ConfigTransaction<'_>, ConfigError> {
        ConfigTransaction::begin(self)
    }
}

/// Expands `~` in user-supplied paths
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests;
