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

//! src/core/mod.rs
//!
//! Core chord model
//!
//! This module contains the fundamental data structures and algorithms
//! for chord management, including:
//! - Type definitions for chords, key-sets and outputs
//! - Key vocabulary and output validation
//! - nom parsers for key specs, key sequences, batch files and event lines
//! - Conflict and overlap detection
//! - The in-memory chord store with undo history and ranked search
//!
//! Nothing in here touches the filesystem or the remapping engine, so the
//! whole module is unit-testable in isolation.

pub mod conflict;
pub mod parser;
pub mod search;
pub mod store;
pub mod types;
pub mod validator;

pub use conflict::{Conflict, ConflictDetector, Overlap, OverlapKind};
pub use search::SearchScope;
pub use store::{Added, ChordSelector, ChordStore, StoreError, StoreStats};
pub use types::*;
pub use validator::ValidationError;

#[cfg(test)]
mod tests;
