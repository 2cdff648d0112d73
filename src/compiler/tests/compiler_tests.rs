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

//! Rule compiler tests

use proptest::prelude::*;

use crate::compiler::*;
use crate::core::types::{Chord, KeySet, OutputSpec};

fn chord(keys: &[&str], output: &str, category: Option<&str>) -> Chord {
    Chord::new(
        KeySet::new(keys).unwrap(),
        OutputSpec::text(output),
        category.map(str::to_string),
    )
}

#[test]
fn test_empty_library_compiles_to_empty_sequence() {
    let sequence = compile(&Vec::new(), &CompilePolicy::default()).unwrap();

    assert!(sequence.is_empty());
    assert_eq!(sequence.len(), 0);
    assert!(sequence.groups().is_empty());
}

#[test]
fn test_three_key_group_before_two_key_group() {
    let chords = vec![
        chord(&["a", "s"], "as", None),
        chord(&["a", "s", "d"], "and", None),
    ];

    let sequence = compile(&chords, &CompilePolicy::default()).unwrap();

    assert_eq!(sequence.groups().len(), 2);
    assert_eq!(sequence.groups()[0].key_count, 3);
    assert_eq!(sequence.groups()[0].timeout_ms, 75);
    assert_eq!(sequence.groups()[1].key_count, 2);
    assert_eq!(sequence.groups()[1].timeout_ms, 50);

    let and_rank = sequence.rank_of(&chords[1].id).unwrap();
    let as_rank = sequence.rank_of(&chords[0].id).unwrap();
    assert!(and_rank < as_rank, "3-key chord must be evaluated first");
}

#[test]
fn test_modifiers_do_not_count() {
    let chords = vec![
        chord(&["cmd", "a", "s"], "cmd-as", None),
        chord(&["a", "s"], "as", None),
    ];

    let sequence = compile(&chords, &CompilePolicy::default()).unwrap();

    // Both have two effective keys: one group
    assert_eq!(sequence.groups().len(), 1);
    let rules: Vec<_> = sequence.rules().collect();
    assert_eq!(rules[0].label, "a+cmd+s", "More keys first within a group");
    assert_eq!(rules[0].keys, vec!["a", "s"]);
    assert_eq!(rules[0].modifiers, vec!["cmd"]);
    assert_eq!(rules[1].label, "a+s");
}

#[test]
fn test_label_tie_break_is_deterministic() {
    let chords = vec![
        chord(&["q", "w"], "qw", None),
        chord(&["a", "s"], "as", None),
        chord(&["j", "k"], "jk", None),
    ];

    let sequence = compile(&chords, &CompilePolicy::default()).unwrap();
    let labels: Vec<_> = sequence.rules().map(|r| r.label.clone()).collect();

    assert_eq!(labels, vec!["a+s", "j+k", "q+w"]);
}

#[test]
fn test_timing_table_tiers() {
    let chords = vec![
        chord(&["a", "s"], "2", None),
        chord(&["a", "s", "d"], "3", None),
        chord(&["a", "s", "d", "f"], "4", None),
        chord(&["a", "s", "d", "f", "g"], "5", None),
        chord(&["a", "s", "d", "f", "g", "h"], "6", None),
    ];

    let sequence = compile(&chords, &CompilePolicy::default()).unwrap();
    let timings: Vec<(usize, u64)> = sequence
        .groups()
        .iter()
        .map(|g| (g.key_count, g.timeout_ms))
        .collect();

    assert_eq!(timings, vec![(6, 125), (5, 125), (4, 100), (3, 75), (2, 50)]);
    assert_eq!(
        sequence.groups().iter().map(|g| g.rank).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
}

#[test]
fn test_disabled_category_skipped() {
    let chords = vec![
        chord(&["a", "s"], "as", Some("words")),
        chord(&["q", "w"], "qw", Some("code")),
    ];
    let policy = CompilePolicy::default().with_disabled(["words"]);

    let sequence = compile(&chords, &policy).unwrap();

    assert_eq!(sequence.len(), 1);
    assert_eq!(sequence.skipped(), 1);
    assert!(sequence.rank_of(&chords[0].id).is_none());
}

#[test]
fn test_everything_disabled_is_not_an_error() {
    let chords = vec![chord(&["a", "s"], "as", Some("words"))];
    let policy = CompilePolicy::default().with_disabled(["words"]);

    let sequence = compile(&chords, &policy).unwrap();
    assert!(sequence.is_empty());
}

#[test]
fn test_non_monotone_table_rejected() {
    let chords = vec![chord(&["a", "s"], "as", None)];
    let policy = CompilePolicy::new(TimingTable::new(50, 40, 100, 125));

    assert_eq!(
        compile(&chords, &policy),
        Err(CompileError::NonMonotoneTiming {
            key_count: 3,
            previous: 50,
            next: 40,
        })
    );
}

#[test]
fn test_zero_timeout_rejected() {
    let policy = CompilePolicy::new(TimingTable::new(0, 75, 100, 125));

    assert_eq!(
        compile(&Vec::new(), &policy),
        Err(CompileError::ZeroTimeout { key_count: 2 })
    );
}

#[test]
fn test_group_label() {
    let chords = vec![chord(&["a", "s", "d"], "and", None)];
    let sequence = compile(&chords, &CompilePolicy::default()).unwrap();

    assert_eq!(sequence.groups()[0].label(), "3-Key Chords");
}

const POOL: &[&str] = &["a", "s", "d", "f", "j", "k", "cmd", "shift"];

fn chord_keys() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::sample::subsequence(POOL.to_vec(), 2..=6)
        .prop_filter("needs a non-modifier key", |keys| {
            keys.iter().any(|k| *k != "cmd" && *k != "shift")
        })
}

proptest! {
    #[test]
    fn prop_supersets_compile_first(sets in proptest::collection::vec(chord_keys(), 1..25)) {
        let mut chords: Vec<Chord> = Vec::new();
        for (i, keys) in sets.iter().enumerate() {
            let set = KeySet::new(keys).unwrap();
            if chords.iter().all(|c| c.input_keys != set) {
                chords.push(Chord::new(set, OutputSpec::text(format!("o{}", i)), None));
            }
        }

        let sequence = compile(&chords, &CompilePolicy::default()).unwrap();
        let order: Vec<_> = sequence.rules().map(|r| r.chord_id).collect();
        prop_assert_eq!(order.len(), chords.len());

        let position = |id| order.iter().position(|o| *o == id).unwrap();

        for a in &chords {
            for b in &chords {
                if a.input_keys.is_strict_subset(&b.input_keys) {
                    let rank_a = sequence.rank_of(&a.id).unwrap();
                    let rank_b = sequence.rank_of(&b.id).unwrap();
                    prop_assert!(rank_a >= rank_b, "{} grouped before {}", a.input_keys, b.input_keys);
                    prop_assert!(position(a.id) > position(b.id));
                }
            }
        }
    }

    #[test]
    fn prop_compile_is_deterministic(sets in proptest::collection::vec(chord_keys(), 1..15)) {
        let mut chords: Vec<Chord> = Vec::new();
        for keys in &sets {
            let set = KeySet::new(keys).unwrap();
            if chords.iter().all(|c| c.input_keys != set) {
                chords.push(Chord::new(set, OutputSpec::text("x"), None));
            }
        }

        let forward = compile(&chords, &CompilePolicy::default()).unwrap();
        let reversed = compile(chords.iter().rev(), &CompilePolicy::default()).unwrap();

        prop_assert_eq!(forward, reversed);
    }
}
