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

//! Chord store tests
//!
//! Covers add/check/remove/edit/undo, index consistency, statistics and
//! rebuilding from persisted parts. Property tests at the bottom exercise
//! the conflict and undo invariants over random key-sets.

use proptest::prelude::*;

use crate::core::conflict::OverlapKind;
use crate::core::store::*;
use crate::core::types::{Chord, KeySet, OutputSpec};
use crate::core::validator::ValidationError;

fn text(value: &str) -> OutputSpec {
    OutputSpec::text(value)
}

fn keys(spec: &[&str]) -> KeySet {
    KeySet::new(spec).unwrap()
}

#[test]
fn test_add_normalizes_keys() {
    let mut store = ChordStore::new();

    let added = store.add(["S", "a", "a"], text("as"), None).unwrap();

    assert_eq!(added.chord.input_keys.label(), "a+s");
    assert!(added.warnings.is_empty());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_add_single_key_rejected() {
    let mut store = ChordStore::new();

    let result = store.add(["a"], text("x"), None);

    assert_eq!(
        result,
        Err(StoreError::Validation(ValidationError::TooFewKeys(1)))
    );
    assert!(store.is_empty());
}

#[test]
fn test_add_unknown_key_rejected() {
    let mut store = ChordStore::new();

    assert!(matches!(
        store.add(["a", "f5"], text("x"), None),
        Err(StoreError::Validation(ValidationError::InvalidKey(_)))
    ));
}

#[test]
fn test_add_empty_output_leaves_store_unchanged() {
    let mut store = ChordStore::new();

    assert!(store.add(["a", "s"], text(""), None).is_err());
    assert!(store.is_empty());
    assert!(store.history().is_empty(), "Failed adds must not reach history");
}

#[test]
fn test_add_conflict_rejected() {
    let mut store = ChordStore::new();
    let first = store.add(["a", "s"], text("as"), None).unwrap();

    let result = store.add(["s", "a"], text("sa"), None);

    assert_eq!(
        result,
        Err(StoreError::Conflict {
            keys: keys(&["a", "s"]),
            existing: first.chord.id,
        })
    );
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(&first.chord.id).unwrap().output, text("as"));
}

#[test]
fn test_add_overlap_is_warning() {
    let mut store = ChordStore::new();
    store.add(["a", "s"], text("as"), None).unwrap();

    let added = store.add(["a", "s", "d"], text("and"), None).unwrap();

    assert_eq!(added.warnings.len(), 1);
    assert_eq!(added.warnings[0].kind, OverlapKind::Subset);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_check_is_dry_run() {
    let mut store = ChordStore::new();
    store.add(["a", "s", "d"], text("and"), None).unwrap();

    let overlaps = store.check(["a", "s"]).unwrap();

    assert_eq!(overlaps.len(), 1);
    assert_eq!(overlaps[0].kind, OverlapKind::Superset);
    assert_eq!(store.len(), 1);
    assert!(matches!(
        store.check(["d", "s", "a"]),
        Err(StoreError::Conflict { .. })
    ));
}

#[test]
fn test_remove_by_keys_and_id() {
    let mut store = ChordStore::new();
    let first = store.add(["a", "s"], text("as"), None).unwrap().chord;
    store.add(["q", "w"], text("qw"), None).unwrap();

    let removed = store.remove(&ChordSelector::Keys(keys(&["s", "a"]))).unwrap();
    assert_eq!(removed.id, first.id);

    let remaining = store.all()[0].id;
    let removed = store.remove(&ChordSelector::Id(remaining)).unwrap();
    assert_eq!(removed.output, text("qw"));
    assert!(store.is_empty());
}

#[test]
fn test_remove_by_output_takes_oldest() {
    let mut store = ChordStore::new();
    let older = store.add(["a", "s"], text("same"), None).unwrap().chord;
    store.add(["q", "w"], text("same"), None).unwrap();

    let removed = store
        .remove(&ChordSelector::Output("same".to_string()))
        .unwrap();

    assert_eq!(removed.id, older.id);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_remove_missing_is_not_found() {
    let mut store = ChordStore::new();
    assert!(matches!(
        store.remove(&ChordSelector::Keys(keys(&["a", "s"]))),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_removed_chord_leaves_history() {
    let mut store = ChordStore::new();
    store.add(["a", "s"], text("as"), None).unwrap();
    let second = store.add(["q", "w"], text("qw"), None).unwrap().chord;

    store.remove(&ChordSelector::Id(second.id)).unwrap();

    let undone = store.undo(5);
    assert_eq!(undone.len(), 1, "Removed chord must not be undone twice");
    assert_eq!(undone[0].output, text("as"));
}

#[test]
fn test_edit_output_and_category() {
    let mut store = ChordStore::new();
    let chord = store.add(["a", "s"], text("as"), Some("old".to_string())).unwrap().chord;

    let edited = store
        .edit(&chord.id, Some(text("ask")), Some(Some("new".to_string())))
        .unwrap();

    assert_eq!(edited.output, text("ask"));
    assert_eq!(edited.category.as_deref(), Some("new"));
    assert!(edited.modified_at >= chord.modified_at);
    assert_eq!(store.categories(), vec!["new".to_string()]);
    assert!(store.by_category("old").is_empty());
}

#[test]
fn test_edit_clears_category() {
    let mut store = ChordStore::new();
    let chord = store.add(["a", "s"], text("as"), Some("x".to_string())).unwrap().chord;

    let edited = store.edit(&chord.id, None, Some(None)).unwrap();

    assert_eq!(edited.category, None);
    assert!(store.categories().is_empty());
}

#[test]
fn test_edit_rejects_invalid_output() {
    let mut store = ChordStore::new();
    let chord = store.add(["a", "s"], text("as"), None).unwrap().chord;

    assert!(store.edit(&chord.id, Some(text("  ")), None).is_err());
    assert_eq!(store.get(&chord.id).unwrap().output, text("as"));
}

#[test]
fn test_edit_keeps_undo_history() {
    let mut store = ChordStore::new();
    let chord = store.add(["a", "s"], text("as"), None).unwrap().chord;

    store.edit(&chord.id, Some(text("ask")), None).unwrap();

    assert_eq!(store.history(), vec![chord.id]);
}

#[test]
fn test_undo_most_recent_first() {
    let mut store = ChordStore::new();
    store.add(["a", "s"], text("1"), None).unwrap();
    store.add(["q", "w"], text("2"), None).unwrap();
    store.add(["e", "r"], text("3"), None).unwrap();

    let undone = store.undo(2);

    assert_eq!(undone.len(), 2);
    assert_eq!(undone[0].output, text("3"));
    assert_eq!(undone[1].output, text("2"));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_undo_more_than_history() {
    let mut store = ChordStore::new();
    store.add(["a", "s"], text("1"), None).unwrap();

    let undone = store.undo(5);

    assert_eq!(undone.len(), 1);
    assert!(store.is_empty());
    assert!(store.undo(1).is_empty());
}

#[test]
fn test_undo_history_is_bounded() {
    let mut store = ChordStore::new();
    let letters = "abcdefghijklmnop";

    for c in letters.chars().take(UNDO_LIMIT + 3) {
        store
            .add([c.to_string(), "z".to_string()], text(&c.to_string()), None)
            .unwrap();
    }

    let undone = store.undo(100);
    assert_eq!(undone.len(), UNDO_LIMIT);
    assert_eq!(store.len(), 3, "The oldest additions fall off the history");
}

#[test]
fn test_stats() {
    let mut store = ChordStore::new();
    store.add(["a", "s"], text("as"), Some("words".to_string())).unwrap();
    store.add(["a", "s", "d"], text("and"), Some("words".to_string())).unwrap();
    store.add(["cmd", "q", "w"], text("quit"), None).unwrap();

    let stats = store.stats();

    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_key_count.get(&2), Some(&2));
    assert_eq!(stats.by_key_count.get(&3), Some(&1));
    assert_eq!(stats.by_category.get("words"), Some(&2));
    assert_eq!(stats.uncategorised, 1);
    assert_eq!(stats.total_usage, 0);
}

#[test]
fn test_stats_ages_and_recent() {
    let start = chrono::Utc::now() - chrono::Duration::days(30);
    let chords: Vec<Chord> = ["ab", "ac", "ad", "ae", "af", "ag", "ah"]
        .iter()
        .enumerate()
        .map(|(day, pair)| {
            let keys: Vec<String> = pair.chars().map(String::from).collect();
            let mut chord = Chord::new(KeySet::new(keys).unwrap(), text(pair), None);
            chord.created_at = start + chrono::Duration::days(day as i64);
            chord
        })
        .collect();
    let store = ChordStore::from_parts(chords, Vec::new()).unwrap();

    let stats = store.stats();

    assert_eq!(stats.oldest, Some(start));
    assert_eq!(stats.newest, Some(start + chrono::Duration::days(6)));
    let recent: Vec<String> = stats.recent.iter().map(|c| c.input_keys.label()).collect();
    assert_eq!(recent, vec!["a+h", "a+g", "a+f", "a+e", "a+d"]);
}

#[test]
fn test_stats_empty_store() {
    let stats = ChordStore::new().stats();

    assert_eq!(stats.oldest, None);
    assert!(stats.recent.is_empty());
}

#[test]
fn test_blank_category_is_none() {
    let mut store = ChordStore::new();
    let chord = store.add(["a", "s"], text("as"), Some("  ".to_string())).unwrap().chord;
    assert_eq!(chord.category, None);
}

#[test]
fn test_from_parts_rebuilds_indices() {
    let mut original = ChordStore::new();
    original.add(["a", "s"], text("as"), Some("w".to_string())).unwrap();
    original.add(["q", "w"], text("qw"), None).unwrap();

    let store = ChordStore::from_parts(original.snapshot(), original.history()).unwrap();

    assert_eq!(store.len(), 2);
    assert!(store.find_by_keys(&keys(&["a", "s"])).is_some());
    assert_eq!(store.by_category("w").len(), 1);
    assert_eq!(store.history(), original.history());
}

#[test]
fn test_from_parts_rejects_duplicates() {
    let mut a = ChordStore::new();
    a.add(["a", "s"], text("one"), None).unwrap();
    let mut b = ChordStore::new();
    b.add(["s", "a"], text("two"), None).unwrap();

    let mut chords = a.snapshot();
    chords.extend(b.snapshot());

    assert_eq!(
        ChordStore::from_parts(chords, Vec::new()).unwrap_err(),
        StoreError::DuplicateOnLoad(keys(&["a", "s"]))
    );
}

#[test]
fn test_restore_keeps_identity() {
    let mut store = ChordStore::new();
    let chord = store.add(["a", "s"], text("as"), None).unwrap().chord;
    let removed = store.remove(&ChordSelector::Id(chord.id)).unwrap();

    store.restore(removed.clone()).unwrap();

    assert_eq!(store.get(&chord.id), Some(&removed));
    assert!(store.history().is_empty());
}

fn key_set_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::sample::subsequence(
        vec!["a", "s", "d", "f", "j", "k", "l", "e", "r", "u"],
        2..=5,
    )
    .prop_map(|keys| keys.into_iter().map(str::to_string).collect())
}

proptest! {
    #[test]
    fn prop_index_size_matches_successful_adds(sets in proptest::collection::vec(key_set_strategy(), 0..30)) {
        let mut store = ChordStore::new();
        let mut successes = 0;

        for set in &sets {
            let before = store.len();
            match store.add(set, text("x"), None) {
                Ok(_) => successes += 1,
                Err(StoreError::Conflict { .. }) => prop_assert_eq!(store.len(), before),
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }

        prop_assert_eq!(store.len(), successes);
        prop_assert_eq!(store.snapshot().len(), successes);
    }

    #[test]
    fn prop_undo_then_readd_restores(sets in proptest::collection::vec(key_set_strategy(), 1..10), n in 1usize..5) {
        let mut store = ChordStore::new();
        for (i, set) in sets.iter().enumerate() {
            let _ = store.add(set, text(&format!("out{}", i)), None);
        }

        let mut before: Vec<(String, String)> = store
            .snapshot()
            .into_iter()
            .map(|c| (c.input_keys.label(), c.output.value_text()))
            .collect();
        before.sort();

        let undone = store.undo(n);
        for chord in undone.iter().rev() {
            store
                .add(chord.input_keys.keys(), chord.output.clone(), chord.category.clone())
                .unwrap();
        }

        let mut after: Vec<(String, String)> = store
            .snapshot()
            .into_iter()
            .map(|c| (c.input_keys.label(), c.output.value_text()))
            .collect();
        after.sort();

        prop_assert_eq!(before, after);
    }
}
