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

use std::path::PathBuf;
use thiserror::Error;

use crate::core::store::StoreError;

/// Errors that can occur during file and settings management.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File does not exist.
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    /// Backup directory cannot be created or written to.
    #[error("Backup directory not writable: {0}")]
    BackupDirNotWritable(PathBuf),
    /// Failed to create backup file.
    #[error("Failed to create backup: {0}")]
    BackupFailed(String),
    /// Atomic write operation failed.
    #[error("Atomic write failed: {0}")]
    WriteFailed(String),
    /// Settings file is not valid TOML or has wrong types.
    #[error("Invalid settings in {path}: {message}")]
    InvalidSettings { path: PathBuf, message: String },
    /// A setting value is out of range.
    #[error("Invalid setting: {0}")]
    InvalidValue(String),
    /// Library document is not valid JSON or has the wrong shape.
    #[error("Invalid chord library {path}: {message}")]
    InvalidLibrary { path: PathBuf, message: String },
    /// Library document written by an unknown format version.
    #[error("Unsupported library version '{found}' (expected '{expected}')")]
    UnsupportedVersion { found: String, expected: String },
    /// Library content breaks chord invariants.
    #[error("Chord library is inconsistent: {0}")]
    Library(#[from] StoreError),
    /// Generic I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
