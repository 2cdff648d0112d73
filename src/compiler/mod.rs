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

//! src/compiler/mod.rs
//!
//! Chord library → ordered rule sequence
//!
//! The remapping engine evaluates rules top to bottom and fires the first
//! match. With `a+s` and `a+s+d` both defined, the three-key rule has to be
//! tried first or it could never fire. The compiler therefore:
//!
//! 1. Drops chords from disabled categories
//! 2. Buckets chords by effective key count (modifiers are matched as
//!    mandatory modifiers and do not count)
//! 3. Sorts each bucket by full key count, then canonical label
//! 4. Emits buckets from the largest key count down
//! 5. Gives each bucket its window from the timing table
//!
//! For chords A ⊂ B, B always lands before A in the flattened sequence.
//! Compilation is a pure function of its inputs.

pub mod policy;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::core::types::{Chord, ChordId, OutputSpec};

pub use policy::{CompilePolicy, TimingTable};

/// Compilation errors
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("Timing table decreases at {key_count} keys: {previous} ms → {next} ms")]
    NonMonotoneTiming {
        key_count: usize,
        previous: u64,
        next: u64,
    },

    #[error("Timing table has a zero window for {key_count} keys")]
    ZeroTimeout { key_count: usize },
}

/// One chord, ready for the engine
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledRule {
    pub chord_id: ChordId,
    /// Canonical label of the full key-set
    pub label: String,
    /// Non-modifier keys pressed simultaneously
    pub keys: Vec<String>,
    /// Modifier keys that must be held
    pub modifiers: Vec<String>,
    pub timeout_ms: u64,
    pub output: OutputSpec,
}

/// Rules sharing an effective key count and a window
#[derive(Clone, Debug, PartialEq)]
pub struct RuleGroup {
    pub key_count: usize,
    pub timeout_ms: u64,
    /// Position in the sequence, 0 is evaluated first
    pub rank: usize,
    pub rules: Vec<CompiledRule>,
}

impl RuleGroup {
    /// Human label, e.g. `3-Key Chords`
    pub fn label(&self) -> String {
        format!("{}-Key Chords", self.key_count)
    }
}

impl fmt::Display for RuleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} rules, {} ms)",
            self.label(),
            self.rules.len(),
            self.timeout_ms
        )
    }
}

/// Ordered rule groups, largest chords first
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSequence {
    groups: Vec<RuleGroup>,
    /// Chords left out because their category is disabled
    skipped: usize,
}

impl RuleSequence {
    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    /// All rules in evaluation order
    pub fn rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.groups.iter().flat_map(|g| g.rules.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Group rank of a chord, if it was compiled
    pub fn rank_of(&self, id: &ChordId) -> Option<usize> {
        self.groups
            .iter()
            .find(|g| g.rules.iter().any(|r| r.chord_id == *id))
            .map(|g| g.rank)
    }
}

/// Compiles chords into an ordered rule sequence
///
/// Zero chords (or every chord disabled) compiles to an empty sequence.
///
/// # Errors
/// Returns `CompileError` if the policy's timing table is invalid. An
/// invalid table is never corrected silently.
pub fn compile<'a, I>(chords: I, policy: &CompilePolicy) -> Result<RuleSequence, CompileError>
where
    I: IntoIterator<Item = &'a Chord>,
{
    policy.timing.validate()?;

    let mut buckets: BTreeMap<usize, Vec<&Chord>> = BTreeMap::new();
    let mut skipped = 0;

    for chord in chords {
        if policy.is_disabled(chord.category.as_deref()) {
            skipped += 1;
            continue;
        }
        buckets
            .entry(chord.input_keys.effective_len())
            .or_default()
            .push(chord);
    }

    let groups: Vec<RuleGroup> = buckets
        .into_iter()
        .rev()
        .enumerate()
        .map(|(rank, (key_count, mut members))| {
            members.sort_by(|a, b| {
                b.input_keys
                    .len()
                    .cmp(&a.input_keys.len())
                    .then_with(|| a.input_keys.label().cmp(&b.input_keys.label()))
            });

            let timeout_ms = policy.timing.timeout_for(key_count);
            let rules = members
                .into_iter()
                .map(|chord| CompiledRule {
                    chord_id: chord.id,
                    label: chord.input_keys.label(),
                    keys: chord.input_keys.main_keys().map(str::to_string).collect(),
                    modifiers: chord.input_keys.modifiers().map(str::to_string).collect(),
                    timeout_ms,
                    output: chord.output.clone(),
                })
                .collect();

            RuleGroup {
                key_count,
                timeout_ms,
                rank,
                rules,
            }
        })
        .collect();

    let sequence = RuleSequence { groups, skipped };
    debug!(
        rules = sequence.len(),
        groups = sequence.groups.len(),
        skipped,
        "Compiled rule sequence"
    );

    Ok(sequence)
}

#[cfg(test)]
mod tests;
