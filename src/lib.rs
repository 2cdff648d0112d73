// Copyright 2025 bakri (tidynest@proton.me)
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

//! Karabiner Chord Manager
//!
//! Keeps a library of keyboard chords (keys pressed together, each mapped
//! to an output) and compiles it into Karabiner-Elements rules. Karabiner
//! does the interception; this crate decides what the rules are.
//!
//! # Features
//!
//! - **Rule Compiler:** Orders overlapping chords so larger ones win, with
//!   per-size simultaneous windows
//! - **Capture Mode:** Define chords by pressing them, with the compiled
//!   chords paused for the duration
//! - **Quick Cache:** Append-only side log for instant chord creation,
//!   reconciled later
//! - **Automatic Backups:** Timestamped backups before every write
//! - **Atomic Operations:** Safe file writes with rollback on failure
//!
//! # Architecture
//!
//! - **`core`:** Chord model (types, validation, parsers, conflicts, store, search)
//! - **`compiler`:** Chord library → ordered rule sequence
//! - **`config`:** Files (atomic writes, backups, library document, settings)
//! - **`engine`:** The remapping engine boundary and its Karabiner implementation
//! - **`capture`:** Interactive capture state machine
//! - **`cache`:** Quick-cache side log and watcher
//! - **`controller`:** Transactions tying all of the above together
//!
//! # Examples
//!
//! ## Compiling chords
//!
//! ```
//! use karabiner_chord_manager::compiler::{compile, CompilePolicy};
//! use karabiner_chord_manager::core::{ChordStore, OutputSpec};
//!
//! let mut store = ChordStore::new();
//! store.add(["a", "s"], OutputSpec::text("as"), None)?;
//! store.add(["a", "s", "d"], OutputSpec::text("and"), None)?;
//!
//! let rules = compile(store.all(), &CompilePolicy::default())?;
//! assert_eq!(rules.groups()[0].key_count, 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Queueing a quick chord
//!
//! ```no_run
//! use karabiner_chord_manager::cache::QuickCache;
//! use karabiner_chord_manager::config::Settings;
//!
//! let cache = QuickCache::new(Settings::default().quick_cache_path());
//! cache.append(&["t", "h"], "the", None)?;
//! # Ok::<(), karabiner_chord_manager::cache::CacheError>(())
//! ```

pub mod cache;
pub mod capture;
pub mod compiler;
pub mod config;
pub mod controller;
pub mod core;
pub mod engine;

// Re-export commonly used types for convenience
pub use controller::{Controller, ControllerError};
pub use core::{Chord, ChordStore, KeySet, OutputSpec};
