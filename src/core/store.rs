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

//! src/core/store.rs
//!
//! In-memory chord collection
//!
//! `ChordStore` owns every chord and keeps two indices in step with it:
//! - `KeySet → ChordId` (injective, so exact conflicts are O(1) to detect)
//! - `category → {ChordId}`
//!
//! Every mutating operation either succeeds completely or leaves the store
//! untouched. Persistence is somebody else's job (see `config::library`).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::core::conflict::{find_overlaps, ConflictDetector, Overlap};
use crate::core::search::{self, SearchScope};
use crate::core::types::{Chord, ChordId, KeySet, OutputSpec};
use crate::core::validator::{self, ValidationError};

/// Number of additions remembered for `undo`
pub const UNDO_LIMIT: usize = 10;

/// Chords listed under "recently added" in [`StoreStats`]
pub const RECENT_LIMIT: usize = 5;

/// Chord store errors
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Canonical key-set already in use
    #[error("Chord {keys} already exists (id {existing})")]
    Conflict { keys: KeySet, existing: ChordId },

    #[error("No chord matches {0}")]
    NotFound(String),

    /// Loaded library contains the same key-set twice
    #[error("Library contains key-set {0} more than once")]
    DuplicateOnLoad(KeySet),
}

/// How a chord is picked for removal
#[derive(Clone, Debug, PartialEq)]
pub enum ChordSelector {
    Id(ChordId),
    Keys(KeySet),
    /// Oldest chord whose output text equals this string
    Output(String),
}

impl std::fmt::Display for ChordSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChordSelector::Id(id) => write!(f, "id {}", id),
            ChordSelector::Keys(keys) => write!(f, "keys {}", keys),
            ChordSelector::Output(text) => write!(f, "output '{}'", text),
        }
    }
}

/// Result of a successful `add`
#[derive(Clone, Debug, PartialEq)]
pub struct Added {
    pub chord: Chord,
    /// Subset/superset relationships with existing chords
    pub warnings: Vec<Overlap>,
}

/// Library statistics
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreStats {
    pub total: usize,
    /// Chord count per effective key-count
    pub by_key_count: BTreeMap<usize, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub uncategorised: usize,
    pub total_usage: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Up to [`RECENT_LIMIT`] chords, newest first
    pub recent: Vec<Chord>,
}

/// The chord collection and its indices
#[derive(Clone, Debug, Default)]
pub struct ChordStore {
    chords: HashMap<ChordId, Chord>,
    by_keys: HashMap<KeySet, ChordId>,
    by_category: HashMap<String, HashSet<ChordId>>,
    /// Most recent addition at the back
    history: VecDeque<ChordId>,
}

fn clean_category(category: Option<String>) -> Option<String> {
    category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

impl ChordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from persisted chords and undo history
    ///
    /// History entries that no longer point at a chord are dropped, and
    /// only the last [`UNDO_LIMIT`] are kept.
    ///
    /// # Errors
    /// - `StoreError::DuplicateOnLoad` if two chords share a key-set
    /// - `StoreError::Validation` if a chord breaks the chord rules
    pub fn from_parts(chords: Vec<Chord>, history: Vec<ChordId>) -> Result<Self, StoreError> {
        let mut detector = ConflictDetector::new();
        for chord in &chords {
            detector.add_chord(chord);
        }

        if let Some(conflict) = detector.find_conflicts().into_iter().next() {
            return Err(StoreError::DuplicateOnLoad(conflict.keys));
        }

        let mut store = Self::new();
        for chord in chords {
            validator::validate_key_set(&chord.input_keys)?;
            validator::validate_output(&chord.output)?;
            store.index(chord);
        }

        for id in history {
            if store.chords.contains_key(&id) {
                store.push_history(id);
            }
        }

        debug!(
            chords = store.len(),
            history = store.history.len(),
            "Rebuilt chord store"
        );
        Ok(store)
    }

    fn index(&mut self, chord: Chord) {
        self.by_keys.insert(chord.input_keys.clone(), chord.id);
        if let Some(category) = &chord.category {
            self.by_category
                .entry(category.clone())
                .or_default()
                .insert(chord.id);
        }
        self.chords.insert(chord.id, chord);
    }

    fn unindex(&mut self, id: &ChordId) -> Option<Chord> {
        let chord = self.chords.remove(id)?;
        self.by_keys.remove(&chord.input_keys);

        if let Some(category) = &chord.category {
            if let Some(ids) = self.by_category.get_mut(category) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_category.remove(category);
                }
            }
        }

        self.history.retain(|h| h != id);
        Some(chord)
    }

    fn push_history(&mut self, id: ChordId) {
        self.history.push_back(id);
        while self.history.len() > UNDO_LIMIT {
            self.history.pop_front();
        }
    }

    /// Validates a canonical key-set against the chord rules and the
    /// existing chords
    pub fn check_set(&self, keys: &KeySet) -> Result<Vec<Overlap>, StoreError> {
        validator::validate_key_set(keys)?;

        if let Some(existing) = self.by_keys.get(keys) {
            return Err(StoreError::Conflict {
                keys: keys.clone(),
                existing: *existing,
            });
        }

        Ok(find_overlaps(keys, self.chords.values()))
    }

    /// Dry-run of `add` for raw key names
    pub fn check<I, S>(&self, keys: I) -> Result<Vec<Overlap>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.check_set(&KeySet::new(keys)?)
    }

    /// Adds a new chord
    ///
    /// Keys are normalised (aliases, case, order, duplicates). Overlaps with
    /// existing chords come back as warnings. The chord is pushed onto the
    /// undo history.
    ///
    /// # Errors
    /// - `ValidationError` for unknown keys, fewer than two keys,
    ///   modifier-only sets and empty or oversize output
    /// - `StoreError::Conflict` if the key-set is taken
    pub fn add<I, S>(
        &mut self,
        keys: I,
        output: OutputSpec,
        category: Option<String>,
    ) -> Result<Added, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = KeySet::new(keys)?;
        let warnings = self.check_set(&keys)?;
        validator::validate_output(&output)?;

        let chord = Chord::new(keys, output, clean_category(category));
        debug!(keys = %chord.input_keys, id = %chord.id, "Adding chord");

        self.push_history(chord.id);
        self.index(chord.clone());

        Ok(Added { chord, warnings })
    }

    /// Puts back a chord that was removed earlier, keeping its id and
    /// timestamps
    ///
    /// Not recorded in the undo history.
    pub fn restore(&mut self, chord: Chord) -> Result<(), StoreError> {
        if self.chords.contains_key(&chord.id) {
            return Err(StoreError::Conflict {
                keys: chord.input_keys.clone(),
                existing: chord.id,
            });
        }

        self.check_set(&chord.input_keys)?;
        validator::validate_output(&chord.output)?;
        self.index(chord);
        Ok(())
    }

    /// Removes one chord
    pub fn remove(&mut self, selector: &ChordSelector) -> Result<Chord, StoreError> {
        let id = match selector {
            ChordSelector::Id(id) => self.chords.contains_key(id).then_some(*id),
            ChordSelector::Keys(keys) => self.by_keys.get(keys).copied(),
            ChordSelector::Output(text) => {
                let text = text.trim();
                self.chords
                    .values()
                    .filter(|c| c.output.value_text() == text)
                    .min_by(|a, b| {
                        a.created_at
                            .cmp(&b.created_at)
                            .then_with(|| a.input_keys.cmp(&b.input_keys))
                    })
                    .map(|c| c.id)
            }
        };

        let removed = id
            .and_then(|id| self.unindex(&id))
            .ok_or_else(|| StoreError::NotFound(selector.to_string()))?;

        debug!(keys = %removed.input_keys, "Removed chord");
        Ok(removed)
    }

    /// Changes a chord's output and/or category
    ///
    /// `category: Some(None)` clears the category. `modified_at` is bumped
    /// whenever anything is passed, even an identical value.
    pub fn edit(
        &mut self,
        id: &ChordId,
        output: Option<OutputSpec>,
        category: Option<Option<String>>,
    ) -> Result<Chord, StoreError> {
        if let Some(output) = &output {
            validator::validate_output(output)?;
        }

        let mut chord = self
            .chords
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("id {}", id)))?;

        if output.is_none() && category.is_none() {
            return Ok(chord);
        }

        if let Some(output) = output {
            chord.output = output;
        }
        if let Some(category) = category {
            chord.category = clean_category(category);
        }
        chord.modified_at = chrono::Utc::now();

        // Re-index in place without touching the undo history
        let history = self.history.clone();
        self.unindex(id);
        self.index(chord.clone());
        self.history = history;

        Ok(chord)
    }

    /// Removes the `n` most recently added chords, most recent first
    ///
    /// Returns fewer than `n` chords when the history is shorter.
    pub fn undo(&mut self, n: usize) -> Vec<Chord> {
        let mut undone = Vec::new();

        while undone.len() < n {
            let Some(id) = self.history.pop_back() else {
                break;
            };
            if let Some(chord) = self.unindex(&id) {
                undone.push(chord);
            }
        }

        debug!(requested = n, undone = undone.len(), "Undo");
        undone
    }

    /// Ranked search, best match first
    pub fn search(&self, query: &str, scope: SearchScope) -> Vec<&Chord> {
        search::search(self.chords.values(), query, scope)
    }

    pub fn get(&self, id: &ChordId) -> Option<&Chord> {
        self.chords.get(id)
    }

    pub fn find_by_keys(&self, keys: &KeySet) -> Option<&Chord> {
        self.by_keys.get(keys).and_then(|id| self.chords.get(id))
    }

    /// Every chord, oldest first
    pub fn all(&self) -> Vec<&Chord> {
        let mut chords: Vec<&Chord> = self.chords.values().collect();
        chords.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.input_keys.cmp(&b.input_keys))
        });
        chords
    }

    pub fn by_category(&self, category: &str) -> Vec<&Chord> {
        let mut chords: Vec<&Chord> = self
            .by_category
            .get(category)
            .map(|ids| ids.iter().filter_map(|id| self.chords.get(id)).collect())
            .unwrap_or_default();
        chords.sort_by(|a, b| a.input_keys.cmp(&b.input_keys));
        chords
    }

    /// Category names in use, sorted
    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_category.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    /// Undo history, oldest first
    pub fn history(&self) -> Vec<ChordId> {
        self.history.iter().copied().collect()
    }

    /// Owned copy of every chord, oldest first
    pub fn snapshot(&self) -> Vec<Chord> {
        self.all().into_iter().cloned().collect()
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total: self.chords.len(),
            ..StoreStats::default()
        };

        for chord in self.chords.values() {
            *stats
                .by_key_count
                .entry(chord.input_keys.effective_len())
                .or_default() += 1;

            match &chord.category {
                Some(category) => *stats.by_category.entry(category.clone()).or_default() += 1,
                None => stats.uncategorised += 1,
            }

            stats.total_usage += chord.usage_count;
        }

        let mut by_age: Vec<&Chord> = self.chords.values().collect();
        by_age.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.input_keys.cmp(&b.input_keys))
        });
        stats.newest = by_age.first().map(|c| c.created_at);
        stats.oldest = by_age.last().map(|c| c.created_at);
        stats.recent = by_age.into_iter().take(RECENT_LIMIT).cloned().collect();

        stats
    }
}
