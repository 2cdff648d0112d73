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

//! Karabiner-Elements as a [`RuleEngine`]
//!
//! Karabiner watches `karabiner.json` and reloads it on change, so
//! publishing is just an atomic rewrite of that file. Rule sets are
//! profiles: pausing chords means selecting some other profile.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::compiler::RuleSequence;
use crate::config::{ConfigManager, Settings, DEFAULT_BACKUP_LIMIT};
use crate::core::parser::parse_key_sequence;
use crate::core::types::KeyStroke;
use crate::engine::document::{self, KarabinerDocument};
use crate::engine::{EngineError, EngineMode, RuleEngine};

/// Profile created to pause chords when no other profile exists
pub const NEUTRAL_PROFILE: &str = "Chords (paused)";

/// Hotkey bound to a shell command that opens capture mode
#[derive(Clone, Debug, PartialEq)]
pub struct Launcher {
    pub stroke: KeyStroke,
    pub command: String,
}

impl Launcher {
    /// The launcher configured in `settings`, if any
    ///
    /// A key that does not parse as a single key stroke is logged and
    /// ignored.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let raw = settings.engine.launcher_key.as_deref()?;

        match parse_key_sequence(raw) {
            Ok(strokes) if strokes.len() == 1 => {
                let stroke = strokes.into_iter().next()?;
                Some(Self {
                    stroke,
                    command: settings.engine.launcher_command.clone(),
                })
            }
            Ok(_) => {
                warn!(key = %raw, "Launcher key must be a single key stroke, ignoring");
                None
            }
            Err(e) => {
                warn!(key = %raw, error = %e, "Invalid launcher key, ignoring");
                None
            }
        }
    }
}

/// How chords are laid out in `karabiner.json`
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    /// Profile that receives the compiled rules
    pub profile_name: String,
    /// Description prefix marking rules this tool owns
    pub rule_prefix: String,
    /// Profile-wide simultaneous threshold
    pub chord_timeout_ms: u64,
    /// Type a space after text outputs
    pub trailing_space: bool,
    /// Run through `sh -c` after every write
    pub reload_command: Option<String>,
    /// Published as one extra managed rule
    pub launcher: Option<Launcher>,
    pub backup_dir: Option<PathBuf>,
    pub backup_limit: usize,
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            profile_name: settings.engine.profile_name.clone(),
            rule_prefix: settings.engine.rule_prefix.clone(),
            chord_timeout_ms: settings.timing.chord_timeout_ms,
            trailing_space: settings.engine.trailing_space,
            reload_command: settings.engine.reload_command.clone(),
            launcher: Launcher::from_settings(settings),
            backup_dir: Some(settings.backup_dir()),
            backup_limit: settings.storage.backup_count,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            backup_dir: None,
            backup_limit: DEFAULT_BACKUP_LIMIT,
            ..Self::from_settings(&settings)
        }
    }
}

/// Karabiner-Elements engine with safety modes
///
/// In `Live` mode every operation re-reads `karabiner.json` first, since
/// the Karabiner UI may have changed it in the meantime. In `DryRun` mode
/// the document lives in memory only.
#[derive(Debug)]
pub struct KarabinerEngine {
    mode: EngineMode,
    options: EngineOptions,
    /// Present in Live mode only
    manager: Option<ConfigManager>,
    /// Last document read or written
    document: KarabinerDocument,
}

impl KarabinerEngine {
    /// Opens the engine config at `path`
    ///
    /// Live mode creates the file if it does not exist. DryRun mode reads
    /// it if present and otherwise starts from an empty document.
    pub fn new(
        path: PathBuf,
        options: EngineOptions,
        mode: EngineMode,
    ) -> Result<Self, EngineError> {
        let (manager, document) = match mode {
            EngineMode::Live => {
                let mut manager = ConfigManager::open_or_create(path, "")?
                    .with_backup_limit(options.backup_limit);
                if let Some(dir) = &options.backup_dir {
                    manager = manager.with_backup_dir(dir.clone())?;
                }
                let document = KarabinerDocument::parse(&manager.read_config()?)?;
                (Some(manager), document)
            }
            EngineMode::DryRun => {
                let document = if path.exists() {
                    KarabinerDocument::parse(&fs::read_to_string(&path)?)?
                } else {
                    KarabinerDocument::default()
                };
                (None, document)
            }
        };

        debug!(?mode, profile = %options.profile_name, "Karabiner engine ready");
        Ok(Self {
            mode,
            options,
            manager,
            document,
        })
    }

    /// The document as last read or written
    pub fn document(&self) -> &KarabinerDocument {
        &self.document
    }

    /// Renders the rules as they would be published, launcher last
    pub fn render(&self, rules: &RuleSequence) -> Vec<Value> {
        let mut rendered =
            document::render_rules(rules, &self.options.rule_prefix, self.options.trailing_space);
        if let Some(launcher) = &self.options.launcher {
            rendered.push(document::render_launcher(
                &launcher.stroke,
                &launcher.command,
                &self.options.rule_prefix,
            ));
        }
        rendered
    }

    /// Writes the rules as a standalone complex-modification file
    pub fn export(&self, rules: &RuleSequence, path: &Path) -> Result<(), EngineError> {
        let exported = document::export_document(
            rules,
            self.options.profile_name.trim(),
            &self.options.rule_prefix,
            self.options.trailing_space,
        );

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, format!("{}\n", serde_json::to_string_pretty(&exported)?))?;

        info!(path = %path.display(), rules = rules.len(), "Exported chord rules");
        Ok(())
    }

    fn load(&self) -> Result<KarabinerDocument, EngineError> {
        match &self.manager {
            Some(manager) => KarabinerDocument::parse(&manager.read_config()?),
            None => Ok(self.document.clone()),
        }
    }

    /// Read, edit, write, reload
    ///
    /// Nothing is written if `edit` fails.
    fn apply<F>(&mut self, edit: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut KarabinerDocument) -> Result<(), EngineError>,
    {
        let mut document = self.load()?;
        edit(&mut document)?;

        if let Some(manager) = &self.manager {
            manager.begin_transaction()?.commit(&document.to_json()?)?;
            self.reload()?;
        }

        self.document = document;
        Ok(())
    }

    fn reload(&self) -> Result<(), EngineError> {
        let Some(command) = &self.options.reload_command else {
            return Ok(());
        };

        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .map_err(|e| EngineError::Unavailable(format!("Failed to run reload command: {}", e)))?;

        if !status.success() {
            return Err(EngineError::Unavailable(format!(
                "Reload command '{}' failed with {}",
                command, status
            )));
        }

        debug!(%command, "Reload command succeeded");
        Ok(())
    }
}

impl RuleEngine for KarabinerEngine {
    fn active_rule_set(&self) -> Result<String, EngineError> {
        self.load()?
            .selected_profile()
            .ok_or_else(|| EngineError::Unavailable("No Karabiner profile is selected".to_string()))
    }

    fn select_neutral(&mut self) -> Result<String, EngineError> {
        let managed = self.options.profile_name.clone();
        let prefix = self.options.rule_prefix.clone();
        let threshold = self.options.chord_timeout_ms;
        let mut chosen = String::new();

        self.apply(|doc| {
            let neutral = match doc.profile_names().into_iter().find(|n| *n != managed) {
                Some(name) => name,
                None => {
                    doc.ensure_profile(NEUTRAL_PROFILE, threshold)?;
                    // The copy must not carry chord rules
                    doc.replace_managed_rules(NEUTRAL_PROFILE, &prefix, Vec::new())?;
                    NEUTRAL_PROFILE.to_string()
                }
            };
            doc.select_profile(&neutral)?;
            chosen = neutral;
            Ok(())
        })?;

        info!(profile = %chosen, "Chords paused");
        Ok(chosen)
    }

    fn select(&mut self, name: &str) -> Result<(), EngineError> {
        self.apply(|doc| doc.select_profile(name))?;
        info!(profile = %name, "Profile selected");
        Ok(())
    }

    fn publish(&mut self, rules: &RuleSequence) -> Result<(), EngineError> {
        let profile = self.options.profile_name.clone();
        let prefix = self.options.rule_prefix.clone();
        let threshold = self.options.chord_timeout_ms;
        let rendered = self.render(rules);
        let managed = rendered.len();

        self.apply(|doc| {
            if doc.ensure_profile(&profile, threshold)? {
                info!(profile = %profile, "Created Karabiner profile");
            }
            let removed = doc.replace_managed_rules(&profile, &prefix, rendered)?;
            doc.set_simultaneous_threshold(&profile, threshold)?;
            debug!(removed, managed, "Managed rules replaced");
            Ok(())
        })?;

        info!(
            rules = rules.len(),
            managed,
            skipped = rules.skipped(),
            dry_run = self.mode == EngineMode::DryRun,
            "Chord rules published"
        );
        Ok(())
    }

    fn reconfigure(&mut self, settings: &Settings) {
        self.options.chord_timeout_ms = settings.timing.chord_timeout_ms;
        self.options.launcher = Launcher::from_settings(settings);
        debug!(threshold = self.options.chord_timeout_ms, "Engine reconfigured");
    }
}
