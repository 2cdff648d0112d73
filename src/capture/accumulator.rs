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

//! Pressed-key accumulator
//!
//! Keys pressed close together form a candidate. A candidate with at least
//! `min_keys` keys freezes once more than the timeout passes without
//! another press. Smaller candidates are dropped at that point.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Accumulator {
    timeout: Duration,
    min_keys: usize,
    keys: BTreeSet<String>,
    last_press: Option<Instant>,
}

impl Accumulator {
    pub fn new(timeout: Duration, min_keys: usize) -> Self {
        Self {
            timeout,
            min_keys: min_keys.max(1),
            keys: BTreeSet::new(),
            last_press: None,
        }
    }

    /// Records a normalised, non-modifier key press
    ///
    /// A press after a quiet interval longer than the timeout starts a new
    /// candidate; if the previous one was armed it is returned frozen.
    pub fn press(&mut self, key: &str, at: Instant) -> Option<Vec<String>> {
        let quiet = self
            .last_press
            .is_some_and(|last| at.saturating_duration_since(last) > self.timeout);

        let frozen = if quiet { self.take() } else { None };

        self.keys.insert(key.to_string());
        self.last_press = Some(at);
        frozen
    }

    /// Freezes the candidate if nothing joined it within the timeout
    pub fn poll(&mut self, now: Instant) -> Option<Vec<String>> {
        let last = self.last_press?;
        if now.saturating_duration_since(last) <= self.timeout {
            return None;
        }
        self.take()
    }

    /// Freezes the candidate now, without waiting for the timeout
    pub fn flush(&mut self) -> Option<Vec<String>> {
        self.take()
    }

    /// Clears the candidate, returning it if it was armed
    fn take(&mut self) -> Option<Vec<String>> {
        let keys = std::mem::take(&mut self.keys);
        self.last_press = None;
        (keys.len() >= self.min_keys).then(|| keys.into_iter().collect())
    }

    pub fn pending(&self) -> usize {
        self.keys.len()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.last_press = None;
    }
}
