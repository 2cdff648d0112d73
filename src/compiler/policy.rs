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

//! Compilation policy: timing table and disabled groups

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::compiler::CompileError;

fn default_two() -> u64 {
    50
}
fn default_three() -> u64 {
    75
}
fn default_four() -> u64 {
    100
}
fn default_five_plus() -> u64 {
    125
}

/// Simultaneous-press windows in milliseconds, keyed by effective key count
///
/// Larger chords get longer windows because nobody lands five keys within
/// 50 ms. The table must never decrease from one key count to the next and
/// must not contain a zero; [`TimingTable::validate`] enforces both.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TimingTable {
    /// Two keys (and anything smaller)
    #[serde(default = "default_two")]
    pub two_keys: u64,
    #[serde(default = "default_three")]
    pub three_keys: u64,
    #[serde(default = "default_four")]
    pub four_keys: u64,
    /// Five keys and more
    #[serde(default = "default_five_plus")]
    pub five_plus_keys: u64,
}

impl Default for TimingTable {
    fn default() -> Self {
        Self {
            two_keys: default_two(),
            three_keys: default_three(),
            four_keys: default_four(),
            five_plus_keys: default_five_plus(),
        }
    }
}

impl TimingTable {
    pub fn new(two_keys: u64, three_keys: u64, four_keys: u64, five_plus_keys: u64) -> Self {
        Self {
            two_keys,
            three_keys,
            four_keys,
            five_plus_keys,
        }
    }

    fn steps(&self) -> [(usize, u64); 4] {
        [
            (2, self.two_keys),
            (3, self.three_keys),
            (4, self.four_keys),
            (5, self.five_plus_keys),
        ]
    }

    /// Window for a chord with `key_count` non-modifier keys
    pub fn timeout_for(&self, key_count: usize) -> u64 {
        match key_count {
            0..=2 => self.two_keys,
            3 => self.three_keys,
            4 => self.four_keys,
            _ => self.five_plus_keys,
        }
    }

    /// Rejects zero windows and any decrease between adjacent key counts
    ///
    /// Equal adjacent values are allowed.
    pub fn validate(&self) -> Result<(), CompileError> {
        let steps = self.steps();

        if let Some((key_count, _)) = steps.iter().find(|(_, ms)| *ms == 0) {
            return Err(CompileError::ZeroTimeout {
                key_count: *key_count,
            });
        }

        for pair in steps.windows(2) {
            let (_, previous) = pair[0];
            let (key_count, next) = pair[1];
            if next < previous {
                return Err(CompileError::NonMonotoneTiming {
                    key_count,
                    previous,
                    next,
                });
            }
        }

        Ok(())
    }
}

/// Everything the compiler needs besides the chords themselves
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompilePolicy {
    pub timing: TimingTable,

    /// Categories whose chords are left out of the rule sequence
    pub disabled_categories: BTreeSet<String>,
}

impl CompilePolicy {
    pub fn new(timing: TimingTable) -> Self {
        Self {
            timing,
            disabled_categories: BTreeSet::new(),
        }
    }

    pub fn with_disabled<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_categories
            .extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn is_disabled(&self, category: Option<&str>) -> bool {
        category.is_some_and(|c| self.disabled_categories.contains(c))
    }
}
