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

//! Controller layer coordinating store, library, engine and capture
//!
//! Every front-end operation goes through [`Controller`]. It owns the chord
//! store and the engine behind one lock, and runs each mutation as a single
//! transaction:
//!
//! ```text
//! lock → mutate → compile from the store → persist library → publish
//! ```
//!
//! A failure at any step puts the previous store back. If the library was
//! already written when publishing fails, the previous library is written
//! again.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, QuickCache, ReconcileReport};
use crate::capture::{
    CaptureOptions, CapturePrompt, CaptureSession, CaptureSummary, KeyEvent, SessionError,
    SessionSlot,
};
use crate::compiler::{compile, CompileError, RuleSequence};
use crate::config::{read_library, ConfigError, LibraryFile, Settings, TimingUpdate};
use crate::core::conflict::{find_similar, Overlap};
use crate::core::parser::{BatchEntry, ParseError};
use crate::core::search::SearchScope;
use crate::core::store::{Added, ChordSelector, ChordStore, StoreError, StoreStats};
use crate::core::types::{Chord, ChordId, KeySet, OutputSpec};
use crate::engine::{EngineError, EngineMode, KarabinerEngine, RuleEngine};

/// Everything a front end can get back from the controller
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A previous operation panicked while holding the lock
    #[error("Chord store lock poisoned")]
    Poisoned,
}

/// Sort order for [`Controller::list`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ListOrder {
    /// Canonical key label
    Input,
    /// Output text
    Output,
    /// Oldest first
    #[default]
    Created,
}

/// Result of a batch add
#[derive(Debug, Default)]
pub struct BatchReport {
    pub added: Vec<Added>,
    pub failed: Vec<(BatchEntry, StoreError)>,
}

/// A category and whether its chords are compiled
#[derive(Clone, Debug, PartialEq)]
pub struct GroupStatus {
    pub name: String,
    pub chords: usize,
    pub enabled: bool,
}

struct Inner<E> {
    store: ChordStore,
    engine: E,
    settings: Settings,
}

/// Coordinates the chord store with its persistence and the engine
pub struct Controller<E: RuleEngine> {
    inner: Mutex<Inner<E>>,
    /// Present in Live mode only
    library: Option<LibraryFile>,
    settings_path: Option<PathBuf>,
    mode: EngineMode,
    slot: SessionSlot,
    cache: QuickCache,
}

impl<E: RuleEngine> Controller<E> {
    /// Loads the library named in `settings` and takes over `engine`
    ///
    /// In `DryRun` mode nothing is created or written: a missing library is
    /// an empty one, and settings changes stay in memory.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use karabiner_chord_manager::config::Settings;
    /// use karabiner_chord_manager::controller::Controller;
    /// use karabiner_chord_manager::engine::{EngineMode, EngineOptions, KarabinerEngine};
    ///
    /// let settings = Settings::default();
    /// let engine = KarabinerEngine::new(
    ///     settings.karabiner_config_path(),
    ///     EngineOptions::from_settings(&settings),
    ///     EngineMode::Live,
    /// )?;
    /// let controller = Controller::open(settings, None, engine, EngineMode::Live)?;
    /// println!("{} chords", controller.stats()?.total);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(
        settings: Settings,
        settings_path: Option<PathBuf>,
        engine: E,
        mode: EngineMode,
    ) -> Result<Self, ControllerError> {
        let (library, store) = match mode {
            EngineMode::Live => {
                let library = LibraryFile::open(
                    settings.library_path(),
                    Some(settings.backup_dir()),
                    settings.storage.backup_count,
                )?;
                let store = library.load()?;
                (Some(library), store)
            }
            EngineMode::DryRun => (None, read_library(&settings.library_path())?),
        };

        let cache = QuickCache::new(settings.quick_cache_path());
        debug!(?mode, chords = store.len(), "Controller ready");

        Ok(Self {
            inner: Mutex::new(Inner {
                store,
                engine,
                settings,
            }),
            library,
            settings_path,
            mode,
            slot: SessionSlot::new(),
            cache,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<E>>, ControllerError> {
        self.inner.lock().map_err(|_| ControllerError::Poisoned)
    }

    pub fn quick_cache(&self) -> &QuickCache {
        &self.cache
    }

    /// Current settings (including group changes made through this controller)
    pub fn settings(&self) -> Result<Settings, ControllerError> {
        Ok(self.lock()?.settings.clone())
    }

    fn persist(&self, store: &ChordStore) -> Result<(), ControllerError> {
        if let Some(library) = &self.library {
            library.save(store)?;
        }
        Ok(())
    }

    /// Runs `mutate` as one transaction on an already locked controller
    fn transact_locked<T, F>(&self, inner: &mut Inner<E>, mutate: F) -> Result<T, ControllerError>
    where
        F: FnOnce(&mut ChordStore) -> Result<T, ControllerError>,
    {
        let before = inner.store.clone();

        let value = match mutate(&mut inner.store) {
            Ok(value) => value,
            Err(e) => {
                inner.store = before;
                return Err(e);
            }
        };

        let compiled = compile(inner.store.all(), &inner.settings.compile_policy());
        let rules = match compiled {
            Ok(rules) => rules,
            Err(e) => {
                inner.store = before;
                return Err(e.into());
            }
        };

        if let Err(e) = self.persist(&inner.store) {
            inner.store = before;
            return Err(e);
        }

        if let Err(e) = inner.engine.publish(&rules) {
            warn!(error = %e, "Publish failed, restoring previous library");
            inner.store = before;
            if let Err(restore) = self.persist(&inner.store) {
                warn!(error = %restore, "Could not restore previous library");
            }
            return Err(e.into());
        }

        info!(chords = inner.store.len(), rules = rules.len(), "Chords published");
        Ok(value)
    }

    fn transact<T, F>(&self, mutate: F) -> Result<T, ControllerError>
    where
        F: FnOnce(&mut ChordStore) -> Result<T, ControllerError>,
    {
        let mut inner = self.lock()?;
        self.transact_locked(&mut inner, mutate)
    }

    /// Validation and conflict check without adding (`add --dry-run`)
    pub fn check(&self, keys: &[String]) -> Result<Vec<Overlap>, ControllerError> {
        Ok(self.lock()?.store.check(keys)?)
    }

    pub fn add(
        &self,
        keys: &[String],
        output: OutputSpec,
        category: Option<String>,
    ) -> Result<Added, ControllerError> {
        self.transact(|store| Ok(store.add(keys, output, category)?))
    }

    /// Adds every valid entry in one transaction
    ///
    /// Entries that fail are reported and skipped; they do not stop the
    /// rest of the batch.
    pub fn add_batch(
        &self,
        entries: &[BatchEntry],
        category: Option<String>,
    ) -> Result<BatchReport, ControllerError> {
        self.transact(|store| {
            let mut report = BatchReport::default();

            for entry in entries {
                match store.add(&entry.keys, OutputSpec::text(entry.output.clone()), category.clone()) {
                    Ok(added) => report.added.push(added),
                    Err(e) => {
                        debug!(line = entry.line, error = %e, "Batch entry skipped");
                        report.failed.push((entry.clone(), e));
                    }
                }
            }

            Ok(report)
        })
    }

    pub fn remove(&self, selector: &ChordSelector) -> Result<Chord, ControllerError> {
        self.transact(|store| Ok(store.remove(selector)?))
    }

    /// Changes a chord's output and/or category
    ///
    /// `category: Some(None)` clears it.
    pub fn edit(
        &self,
        id: &ChordId,
        output: Option<OutputSpec>,
        category: Option<Option<String>>,
    ) -> Result<Chord, ControllerError> {
        self.transact(|store| Ok(store.edit(id, output, category)?))
    }

    /// Removes the `n` most recently added chords
    ///
    /// Nothing is written when the history is empty.
    pub fn undo(&self, n: usize) -> Result<Vec<Chord>, ControllerError> {
        let mut inner = self.lock()?;
        if inner.store.history().is_empty() {
            return Ok(Vec::new());
        }
        self.transact_locked(&mut inner, |store| Ok(store.undo(n)))
    }

    /// Reconciles the quick-cache log into the library
    ///
    /// The log is only trimmed after the library has been persisted and
    /// published, so a failed sync leaves every queued chord in place.
    pub fn sync(&self) -> Result<ReconcileReport, ControllerError> {
        let mut inner = self.lock()?;

        let mut staged = inner.store.clone();
        let reconciliation = self.cache.apply(&mut staged)?;

        if !reconciliation.report().added.is_empty() {
            self.transact_locked(&mut inner, |store| {
                *store = staged;
                Ok(())
            })?;
        }

        Ok(self.cache.settle(reconciliation)?)
    }

    /// Republishes the library with the current settings
    pub fn refresh(&self) -> Result<RuleSequence, ControllerError> {
        let mut inner = self.lock()?;
        let rules = compile(inner.store.all(), &inner.settings.compile_policy())?;
        inner.engine.publish(&rules)?;
        info!(rules = rules.len(), skipped = rules.skipped(), "Chords refreshed");
        Ok(rules)
    }

    /// The rule sequence the library currently compiles to
    pub fn compiled(&self) -> Result<RuleSequence, ControllerError> {
        let inner = self.lock()?;
        Ok(compile(inner.store.all(), &inner.settings.compile_policy())?)
    }

    /// Selects the managed rule set in the engine
    pub fn activate(&self) -> Result<String, ControllerError> {
        let mut inner = self.lock()?;
        let name = inner.settings.engine.profile_name.clone();
        inner.engine.select(&name)?;
        info!(profile = %name, "Chords activated");
        Ok(name)
    }

    /// Runs an interactive capture session fed by `events`
    ///
    /// The lock is held for the whole session. The library is written
    /// before the rules are published; if that write fails the captured
    /// chords are dropped and nothing is published. Chords accepted before
    /// a failed publish stay in the library.
    pub fn capture<P: CapturePrompt>(
        &self,
        events: &Receiver<KeyEvent>,
        prompt: &mut P,
    ) -> Result<CaptureSummary, ControllerError> {
        let mut inner = self.lock()?;
        let options = CaptureOptions::from_settings(&inner.settings);
        let library = self.library.as_ref();

        let Inner { store, engine, .. } = &mut *inner;
        let summary = CaptureSession::new(engine, store, &self.slot, options)
            .persist_with(move |store| match library {
                Some(library) => library.save(store),
                None => Ok(()),
            })
            .run(events, prompt)?;

        Ok(summary)
    }

    /// Applies `change` to the settings, saves them and republishes
    ///
    /// Returns false (and does nothing) when `change` reports no change.
    /// If publishing fails the previous settings file is written back.
    fn update_settings<F>(&self, change: F) -> Result<bool, ControllerError>
    where
        F: FnOnce(&mut Settings) -> Result<bool, ControllerError>,
    {
        let mut inner = self.lock()?;

        let previous = inner.settings.clone();
        let mut updated = previous.clone();
        if !change(&mut updated)? {
            return Ok(false);
        }

        let rules = compile(inner.store.all(), &updated.compile_policy())?;
        self.save_settings(&updated)?;
        inner.engine.reconfigure(&updated);

        if let Err(e) = inner.engine.publish(&rules) {
            inner.engine.reconfigure(&previous);
            if let Err(restore) = self.save_settings(&previous) {
                warn!(error = %restore, "Could not restore previous settings");
            }
            return Err(e.into());
        }

        inner.settings = updated;
        Ok(true)
    }

    /// Enables or disables a category and republishes
    ///
    /// Returns false if the category was already in the requested state.
    pub fn set_group_enabled(&self, category: &str, enabled: bool) -> Result<bool, ControllerError> {
        let changed = self.update_settings(|settings| Ok(settings.set_group_enabled(category, enabled)))?;
        if changed {
            info!(%category, enabled, "Group updated");
        }
        Ok(changed)
    }

    /// Changes the timing windows and republishes every chord with them
    ///
    /// Returns false if every value was already in place. A table that
    /// would not compile is refused before anything is written.
    pub fn set_timing(&self, update: &TimingUpdate) -> Result<bool, ControllerError> {
        let changed = self.update_settings(|settings| Ok(settings.apply_timing(update)?))?;
        if changed {
            info!(?update, "Timing recalibrated");
        }
        Ok(changed)
    }

    /// Library backups, oldest first (Live mode only)
    pub fn backups(&self) -> Result<Vec<PathBuf>, ControllerError> {
        match &self.library {
            Some(library) => Ok(library.manager().list_backups()?),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the library with a backup and republishes
    ///
    /// The backup is parsed first, so a damaged backup changes nothing.
    /// The current library is itself backed up before it is overwritten.
    /// Returns the number of chords restored.
    pub fn restore_backup(&self, backup: &Path) -> Result<usize, ControllerError> {
        let mut inner = self.lock()?;
        let restored = read_library(backup)?;
        let rules = compile(restored.all(), &inner.settings.compile_policy())?;

        let Some(library) = &self.library else {
            // DryRun: validate only
            return Ok(restored.len());
        };
        library.manager().restore_backup(backup)?;

        if let Err(e) = inner.engine.publish(&rules) {
            warn!(error = %e, "Publish failed, restoring previous library");
            if let Err(restore) = self.persist(&inner.store) {
                warn!(error = %restore, "Could not restore previous library");
            }
            return Err(e.into());
        }

        info!(backup = %backup.display(), chords = restored.len(), "Library restored");
        let count = restored.len();
        inner.store = restored;
        Ok(count)
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), ControllerError> {
        match (&self.settings_path, self.mode) {
            (Some(path), EngineMode::Live) => Ok(settings.save(path)?),
            _ => Ok(()),
        }
    }

    /// Every category in use or disabled, alphabetically
    pub fn groups(&self) -> Result<Vec<GroupStatus>, ControllerError> {
        let inner = self.lock()?;
        let disabled = &inner.settings.groups.disabled;

        let mut names = inner.store.categories();
        names.extend(disabled.iter().cloned());
        names.sort();
        names.dedup();

        Ok(names
            .into_iter()
            .map(|name| GroupStatus {
                chords: inner.store.by_category(&name).len(),
                enabled: !disabled.contains(&name),
                name,
            })
            .collect())
    }

    pub fn list(&self, category: Option<&str>, order: ListOrder) -> Result<Vec<Chord>, ControllerError> {
        let inner = self.lock()?;

        let mut chords: Vec<Chord> = match category {
            Some(category) => inner.store.by_category(category).into_iter().cloned().collect(),
            None => inner.store.snapshot(),
        };

        match order {
            ListOrder::Input => chords.sort_by(|a, b| a.input_keys.cmp(&b.input_keys)),
            ListOrder::Output => chords.sort_by_key(|c| c.output.value_text().to_lowercase()),
            ListOrder::Created => chords.sort_by_key(|c| c.created_at),
        }

        Ok(chords)
    }

    pub fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<Chord>, ControllerError> {
        let inner = self.lock()?;
        Ok(inner.store.search(query, scope).into_iter().cloned().collect())
    }

    /// Chords sharing at least half of `keys`, most similar first
    pub fn similar(&self, keys: &KeySet) -> Result<Vec<Chord>, ControllerError> {
        let inner = self.lock()?;
        Ok(find_similar(keys, inner.store.all()).into_iter().cloned().collect())
    }

    pub fn stats(&self) -> Result<StoreStats, ControllerError> {
        Ok(self.lock()?.store.stats())
    }
}

impl Controller<KarabinerEngine> {
    /// Writes the compiled rules as a standalone complex-modification file
    ///
    /// Returns the number of rules written.
    pub fn export(&self, path: &Path) -> Result<usize, ControllerError> {
        let inner = self.lock()?;
        let rules = compile(inner.store.all(), &inner.settings.compile_policy())?;
        inner.engine.export(&rules, path)?;
        info!(path = %path.display(), rules = rules.len(), "Rules exported");
        Ok(rules.len())
    }
}
