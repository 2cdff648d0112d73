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

//! Chord conflict and overlap detection
//!
//! Two kinds of relationship matter between key-sets:
//! - **Conflict**: identical canonical key-sets. The engine could not tell
//!   the chords apart, so the store refuses the second one.
//! - **Overlap**: one key-set strictly contains the other (`a+s` inside
//!   `a+d+s`). Both can coexist because the compiler orders the larger
//!   chord first, but the user is warned.
//!
//! `ConflictDetector` indexes key-sets in a HashMap for O(1) exact-match
//! lookups, the same way bindings used to be indexed by key combo.

use std::collections::HashMap;
use std::fmt;

use crate::core::types::{Chord, ChordId, KeySet};

/// How an existing chord relates to a candidate key-set
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverlapKind {
    /// Existing chord's keys are all part of the candidate
    Subset,
    /// Candidate's keys are all part of the existing chord
    Superset,
}

/// A non-blocking overlap warning
#[derive(Clone, Debug, PartialEq)]
pub struct Overlap {
    pub kind: OverlapKind,
    pub existing_id: ChordId,
    pub existing_keys: KeySet,
}

impl fmt::Display for Overlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OverlapKind::Subset => {
                write!(f, "existing chord {} is contained in this chord", self.existing_keys)
            }
            OverlapKind::Superset => {
                write!(f, "this chord is contained in existing chord {}", self.existing_keys)
            }
        }
    }
}

/// Finds every chord whose key-set strictly contains, or is strictly
/// contained in, `candidate`
///
/// Exact matches are not overlaps; they are conflicts and are reported by
/// the store. Results come back ordered by key label for stable output.
pub fn find_overlaps<'a, I>(candidate: &KeySet, chords: I) -> Vec<Overlap>
where
    I: IntoIterator<Item = &'a Chord>,
{
    let mut overlaps: Vec<Overlap> = chords
        .into_iter()
        .filter_map(|chord| {
            let kind = if chord.input_keys.is_strict_subset(candidate) {
                OverlapKind::Subset
            } else if candidate.is_strict_subset(&chord.input_keys) {
                OverlapKind::Superset
            } else {
                return None;
            };

            Some(Overlap {
                kind,
                existing_id: chord.id,
                existing_keys: chord.input_keys.clone(),
            })
        })
        .collect();

    overlaps.sort_by(|a, b| a.existing_keys.cmp(&b.existing_keys));
    overlaps
}

/// Chords sharing at least half of the candidate's keys
///
/// Exact matches are excluded. Used for the "similar chords" hint when
/// adding interactively. Most similar first.
pub fn find_similar<'a, I>(candidate: &KeySet, chords: I) -> Vec<&'a Chord>
where
    I: IntoIterator<Item = &'a Chord>,
{
    if candidate.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &Chord)> = chords
        .into_iter()
        .filter(|chord| chord.input_keys != *candidate)
        .filter_map(|chord| {
            let shared = candidate
                .keys()
                .iter()
                .filter(|k| chord.input_keys.contains(k))
                .count();

            // shared / len >= 0.5 without floats
            (shared * 2 >= candidate.len() && shared > 0).then_some((shared, chord))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| a.1.input_keys.cmp(&b.1.input_keys))
    });

    scored.into_iter().map(|(_, chord)| chord).collect()
}

/// Detects duplicate key-sets in O(1) time using HashMap-based indexing.
///
/// Used when loading a library from disk, where a hand-edited file may
/// contain the same key-set twice.
pub struct ConflictDetector {
    /// Maps each key-set to every chord id using it
    chords: HashMap<KeySet, Vec<ChordId>>,
}

/// A key-set claimed by more than one chord
#[derive(Clone, Debug, PartialEq)]
pub struct Conflict {
    pub keys: KeySet,

    /// Always 2 or more
    pub chord_ids: Vec<ChordId>,
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self {
            chords: HashMap::new(),
        }
    }

    /// Tracks a chord. Time complexity: O(1) average case
    pub fn add_chord(&mut self, chord: &Chord) {
        self.chords
            .entry(chord.input_keys.clone())
            .or_default()
            .push(chord.id);
    }

    /// All key-sets used by two or more chords, ordered by key label
    pub fn find_conflicts(&self) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = self
            .chords
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(keys, ids)| Conflict {
                keys: keys.clone(),
                chord_ids: ids.clone(),
            })
            .collect();

        conflicts.sort_by(|a, b| a.keys.cmp(&b.keys));
        conflicts
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}
