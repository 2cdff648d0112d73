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

//! User settings (`settings.toml`)
//!
//! Every field has a default, so a missing file, a missing section or a
//! missing key all fall back silently. Paths may start with `~`.
//!
//! ```toml
//! [storage]
//! library_path = "~/.config/karabiner-chords/chords.json"
//! backup_count = 5
//!
//! [engine]
//! profile_name = "Chords"
//! reload_command = "karabiner_cli --reload-karabiner-config"
//! launcher_key = "control+option+backspace"
//!
//! [timing]
//! three_keys = 80
//!
//! [groups]
//! disabled = ["code"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::compiler::{CompilePolicy, TimingTable};
use crate::config::{expand_path, ConfigError, ConfigManager, DEFAULT_BACKUP_LIMIT};

const SETTINGS_DIR: &str = "~/.config/karabiner-chords";

fn default_library_path() -> String {
    format!("{}/chords.json", SETTINGS_DIR)
}
fn default_quick_cache_path() -> String {
    format!("{}/.quick_chords_cache", SETTINGS_DIR)
}
fn default_backup_dir() -> String {
    format!("{}/backups", SETTINGS_DIR)
}
fn default_backup_count() -> usize {
    DEFAULT_BACKUP_LIMIT
}
fn default_karabiner_config() -> String {
    "~/.config/karabiner/karabiner.json".to_string()
}
fn default_profile_name() -> String {
    "Chords".to_string()
}
fn default_rule_prefix() -> String {
    "Chords: ".to_string()
}
fn default_launcher_command() -> String {
    concat!(
        "osascript -e 'tell application \"Terminal\" to do script \"karabiner-chords capture\"' ",
        "-e 'tell application \"Terminal\" to activate'"
    )
    .to_string()
}
fn default_true() -> bool {
    true
}
fn default_two_keys() -> u64 {
    TimingTable::default().two_keys
}
fn default_three_keys() -> u64 {
    TimingTable::default().three_keys
}
fn default_four_keys() -> u64 {
    TimingTable::default().four_keys
}
fn default_five_plus_keys() -> u64 {
    TimingTable::default().five_plus_keys
}
fn default_chord_timeout() -> u64 {
    100
}
fn default_capture_timeout() -> u64 {
    100
}
fn default_min_chord_size() -> usize {
    2
}
fn default_exit_key() -> String {
    "escape".to_string()
}
fn default_tick() -> u64 {
    10
}

/// Where chord data lives
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_library_path")]
    pub library_path: String,
    #[serde(default = "default_quick_cache_path")]
    pub quick_cache_path: String,
    /// Backups of the library and of karabiner.json
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
}

/// Karabiner-Elements integration
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EngineSettings {
    #[serde(default = "default_karabiner_config")]
    pub karabiner_config: String,
    /// Profile that holds the compiled rules
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
    /// Description prefix marking rules this tool owns
    #[serde(default = "default_rule_prefix")]
    pub rule_prefix: String,
    /// Run after each write, e.g. `karabiner_cli --reload-karabiner-config`
    #[serde(default)]
    pub reload_command: Option<String>,
    /// Type a space after text outputs
    #[serde(default = "default_true")]
    pub trailing_space: bool,
    /// Hotkey that opens capture mode, e.g. `control+option+backspace`
    #[serde(default)]
    pub launcher_key: Option<String>,
    /// Shell command the launcher hotkey runs
    #[serde(default = "default_launcher_command")]
    pub launcher_command: String,
}

/// Simultaneous-press windows, in milliseconds
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TimingSettings {
    #[serde(default = "default_two_keys")]
    pub two_keys: u64,
    #[serde(default = "default_three_keys")]
    pub three_keys: u64,
    #[serde(default = "default_four_keys")]
    pub four_keys: u64,
    #[serde(default = "default_five_plus_keys")]
    pub five_plus_keys: u64,
    /// Profile-wide `basic.simultaneous_threshold_milliseconds`
    #[serde(default = "default_chord_timeout")]
    pub chord_timeout_ms: u64,
}

impl TimingSettings {
    pub fn table(&self) -> TimingTable {
        TimingTable::new(self.two_keys, self.three_keys, self.four_keys, self.five_plus_keys)
    }
}

/// Timing changes for `config`; `None` keeps the current value
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimingUpdate {
    pub chord_timeout_ms: Option<u64>,
    pub two_keys: Option<u64>,
    pub three_keys: Option<u64>,
    pub four_keys: Option<u64>,
    pub five_plus_keys: Option<u64>,
}

impl TimingUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Interactive capture mode
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CaptureSettings {
    /// Quiet interval after which a candidate freezes
    #[serde(default = "default_capture_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_min_chord_size")]
    pub min_chord_size: usize,
    #[serde(default = "default_exit_key")]
    pub exit_key: String,
    /// Poll interval while waiting for events
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GroupSettings {
    /// Categories left out of the compiled rules
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// All user settings
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub groups: GroupSettings,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            library_path: default_library_path(),
            quick_cache_path: default_quick_cache_path(),
            backup_dir: default_backup_dir(),
            backup_count: default_backup_count(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            karabiner_config: default_karabiner_config(),
            profile_name: default_profile_name(),
            rule_prefix: default_rule_prefix(),
            reload_command: None,
            trailing_space: true,
            launcher_key: None,
            launcher_command: default_launcher_command(),
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        let table = TimingTable::default();
        Self {
            two_keys: table.two_keys,
            three_keys: table.three_keys,
            four_keys: table.four_keys,
            five_plus_keys: table.five_plus_keys,
            chord_timeout_ms: default_chord_timeout(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_capture_timeout(),
            min_chord_size: default_min_chord_size(),
            exit_key: default_exit_key(),
            tick_ms: default_tick(),
        }
    }
}

impl Settings {
    /// `~/.config/karabiner-chords/settings.toml`
    pub fn default_path() -> PathBuf {
        expand_path(&format!("{}/settings.toml", SETTINGS_DIR))
    }

    /// Load settings from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings =
            toml::from_str(&content).map_err(|e| ConfigError::InvalidSettings {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        info!(path = %path.display(), profile = %settings.engine.profile_name, "Settings loaded");
        Ok(settings)
    }

    /// Write settings atomically, with a backup of the previous file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidSettings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let manager = ConfigManager::open_or_create(path.to_path_buf(), "")?
            .with_backup_limit(self.storage.backup_count);
        manager.begin_transaction()?.commit(&content)
    }

    pub fn library_path(&self) -> PathBuf {
        expand_path(&self.storage.library_path)
    }

    pub fn quick_cache_path(&self) -> PathBuf {
        expand_path(&self.storage.quick_cache_path)
    }

    pub fn backup_dir(&self) -> PathBuf {
        expand_path(&self.storage.backup_dir)
    }

    pub fn karabiner_config_path(&self) -> PathBuf {
        expand_path(&self.engine.karabiner_config)
    }

    /// Compiler policy from the timing table and disabled groups
    pub fn compile_policy(&self) -> CompilePolicy {
        CompilePolicy::new(self.timing.table()).with_disabled(self.groups.disabled.iter().cloned())
    }

    /// Applies a timing change; returns false if nothing changed
    ///
    /// The table itself is checked when it is compiled. Only the profile
    /// threshold is checked here.
    pub fn apply_timing(&mut self, update: &TimingUpdate) -> Result<bool, ConfigError> {
        if update.chord_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue(
                "chord timeout must be greater than 0 ms".to_string(),
            ));
        }

        let before = self.timing.clone();
        let timing = &mut self.timing;
        let fields = [
            (&mut timing.chord_timeout_ms, update.chord_timeout_ms),
            (&mut timing.two_keys, update.two_keys),
            (&mut timing.three_keys, update.three_keys),
            (&mut timing.four_keys, update.four_keys),
            (&mut timing.five_plus_keys, update.five_plus_keys),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }

        Ok(self.timing != before)
    }

    /// Enables or disables a category; returns false if nothing changed
    pub fn set_group_enabled(&mut self, category: &str, enabled: bool) -> bool {
        let present = self.groups.disabled.iter().any(|c| c == category);

        match (enabled, present) {
            (true, true) => {
                self.groups.disabled.retain(|c| c != category);
                true
            }
            (false, false) => {
                self.groups.disabled.push(category.to_string());
                self.groups.disabled.sort();
                true
            }
            _ => false,
        }
    }
}
