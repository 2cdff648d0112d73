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

//! Ranked chord search
//!
//! Results are bucketed into three tiers and sorted by tier, then by most
//! recently modified:
//! 1. Exact: same canonical key-set, or output text equal to the query
//! 2. Containment: key-set subset/superset, or output containing the query
//! 3. Fuzzy: normalised edit-distance similarity of at least
//!    [`FUZZY_THRESHOLD`]
//!
//! Matching is case-insensitive throughout.

use std::cmp::Reverse;

use crate::core::parser::parse_key_spec;
use crate::core::types::{Chord, KeySet};

/// Minimum similarity ratio for a fuzzy hit
pub const FUZZY_THRESHOLD: f64 = 0.6;

/// Which side of a chord a query is matched against
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SearchScope {
    Input,
    Output,
    #[default]
    Both,
}

/// Match quality, best first
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum MatchTier {
    Exact,
    Containment,
    Fuzzy,
}

/// Similarity ratio in `[0, 1]` based on Levenshtein distance
///
/// `1 - distance / max(len_a, len_b)`, computed over chars. Two empty
/// strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    // Single-row dynamic programming
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;

        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }

    1.0 - row[b.len()] as f64 / longest as f64
}

/// Prepared query, parsed once and matched against many chords
struct Query {
    text: String,
    keys: Option<KeySet>,
}

impl Query {
    fn new(raw: &str) -> Self {
        let text = raw.trim().to_lowercase();
        let keys = parse_key_spec(&text)
            .ok()
            .and_then(|keys| KeySet::new(keys).ok())
            .filter(|keys| !keys.is_empty());

        Self { text, keys }
    }

    fn match_input(&self, chord: &Chord) -> Option<MatchTier> {
        let chord_keys = &chord.input_keys;

        if let Some(keys) = &self.keys {
            if keys == chord_keys {
                return Some(MatchTier::Exact);
            }
            if keys.is_strict_subset(chord_keys) || chord_keys.is_strict_subset(keys) {
                return Some(MatchTier::Containment);
            }
        }

        let label = chord_keys.label();
        if label.contains(&self.text) {
            return Some(MatchTier::Containment);
        }

        let compact: String = chord_keys.keys().concat();
        let score = similarity(&self.text, &label).max(similarity(&self.text, &compact));
        (score >= FUZZY_THRESHOLD).then_some(MatchTier::Fuzzy)
    }

    fn match_output(&self, chord: &Chord) -> Option<MatchTier> {
        let output = chord.output.value_text().to_lowercase();

        if output == self.text {
            Some(MatchTier::Exact)
        } else if output.contains(&self.text) {
            Some(MatchTier::Containment)
        } else if similarity(&self.text, &output) >= FUZZY_THRESHOLD {
            Some(MatchTier::Fuzzy)
        } else {
            None
        }
    }

    fn rank(&self, chord: &Chord, scope: SearchScope) -> Option<MatchTier> {
        match scope {
            SearchScope::Input => self.match_input(chord),
            SearchScope::Output => self.match_output(chord),
            SearchScope::Both => match (self.match_input(chord), self.match_output(chord)) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

/// Searches `chords` and returns matches best first
///
/// An empty query matches nothing.
pub fn search<'a, I>(chords: I, query: &str, scope: SearchScope) -> Vec<&'a Chord>
where
    I: IntoIterator<Item = &'a Chord>,
{
    let query = Query::new(query);
    if query.text.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<(MatchTier, &Chord)> = chords
        .into_iter()
        .filter_map(|chord| query.rank(chord, scope).map(|tier| (tier, chord)))
        .collect();

    hits.sort_by_key(|(tier, chord)| (*tier, Reverse(chord.modified_at)));
    hits.into_iter().map(|(_, chord)| chord).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_similarity_one_edit() {
        // "thnk" → "thank": one insertion over five chars
        let score = similarity("thnk", "thank");
        assert!((score - 0.8).abs() < 1e-9, "got {}", score);
    }
}
