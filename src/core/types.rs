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

//! src/core/types.rs
//!
//! Core type definitions for chord management
//!
//! This module defines the fundamental types used throughout the application:
//! - `KeySet`: A canonical (sorted, de-duplicated) set of key identifiers
//! - `KeyStroke`: A single key press with modifiers, used in key-sequence outputs
//! - `OutputSpec`: What a chord emits (text, shell command or key sequence)
//! - `Chord`: A complete chord record with identity and metadata
//!
//! All types implement serialisation for library persistence. `KeySet`
//! normalises on construction *and* on deserialisation, so a hand-edited
//! library can never smuggle an unknown key or a duplicate into the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use crate::core::validator::{self, ValidationError};

/// Opaque chord identifier
///
/// Assigned once at creation (UUID v4) and never reused, even after the
/// chord is removed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ChordId(Uuid);

impl ChordId {
    /// Generates a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// A canonical set of key identifiers
///
/// Implements Hash and Eq for use as a HashMap key in conflict detection.
///
/// # Canonical Form
/// Keys are normalised (lower-cased, aliases resolved), sorted and
/// de-duplicated. Different orderings of the same keys therefore produce
/// identical sets: `s+a`, `a+s` and `a+s+a` are all `a+s`.
///
/// A `KeySet` only guarantees vocabulary and canonical form. Chord-level
/// rules (at least two keys, not modifiers only) live in
/// [`validator::validate_key_set`].
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct KeySet {
    keys: Vec<String>,
}

impl KeySet {
    /// Builds a canonical key-set from raw key names
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidKey` for the first key that is not
    /// in the recognised vocabulary.
    pub fn new<I, S>(raw: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = raw
            .into_iter()
            .map(|k| validator::normalize_key(k.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        keys.sort();
        keys.dedup();

        Ok(Self { keys })
    }

    /// All keys in canonical order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Total number of distinct keys, modifiers included
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.binary_search_by(|k| k.as_str().cmp(key)).is_ok()
    }

    /// True if every key of `self` is also in `other`
    pub fn is_subset(&self, other: &KeySet) -> bool {
        self.keys.iter().all(|k| other.contains(k))
    }

    /// True if `self` is a subset of `other` and strictly smaller
    pub fn is_strict_subset(&self, other: &KeySet) -> bool {
        self.len() < other.len() && self.is_subset(other)
    }

    /// Modifier keys (matched but not counted towards chord length)
    pub fn modifiers(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str).filter(|k| validator::is_modifier(k))
    }

    /// Non-modifier keys, the ones pressed simultaneously
    pub fn main_keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str).filter(|k| !validator::is_modifier(k))
    }

    /// Key count excluding modifiers
    pub fn effective_len(&self) -> usize {
        self.main_keys().count()
    }

    /// Canonical label, e.g. `a+d+s`
    pub fn label(&self) -> String {
        self.keys.join("+")
    }
}

impl TryFrom<Vec<String>> for KeySet {
    type Error = ValidationError;

    fn try_from(raw: Vec<String>) -> Result<Self, Self::Error> {
        KeySet::new(raw)
    }
}

impl From<KeySet> for Vec<String> {
    fn from(set: KeySet) -> Self {
        set.keys
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single key press inside a key-sequence output
///
/// `key` is a non-modifier key identifier, `modifiers` are held while it
/// is pressed. Both use the same vocabulary as chord input keys.
///
/// # Example
/// ```ignore
/// let copy = KeyStroke::new("c", &["cmd"])?; // displays as "cmd+c"
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct KeyStroke {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

impl KeyStroke {
    /// Creates a normalised, validated key stroke
    pub fn new<S: AsRef<str>>(key: &str, modifiers: &[S]) -> Result<Self, ValidationError> {
        let stroke = Self {
            key: validator::normalize_key(key)?,
            modifiers: modifiers
                .iter()
                .map(|m| validator::normalize_key(m.as_ref()))
                .collect::<Result<Vec<_>, _>>()?,
        };
        validator::validate_key_stroke(&stroke)?;
        Ok(stroke)
    }
}

impl fmt::Display for KeyStroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier)?;
        }
        write!(f, "{}", self.key)
    }
}

/// What a chord emits when it fires
///
/// A closed set of variants; every consumer (validation, search, the
/// Karabiner serialiser) matches exhaustively.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OutputSpec {
    /// Typed out character by character
    Text(String),
    /// Executed by the remapping engine's shell action
    ShellCommand(String),
    /// Replayed as key presses (e.g. `cmd+c`, `cmd+v`)
    KeySequence(Vec<KeyStroke>),
}

impl OutputSpec {
    pub fn text(value: impl Into<String>) -> Self {
        OutputSpec::Text(value.into())
    }

    pub fn shell(value: impl Into<String>) -> Self {
        OutputSpec::ShellCommand(value.into())
    }

    /// Searchable rendering of the output value
    ///
    /// Used for output search and removal-by-output.
    pub fn value_text(&self) -> String {
        match self {
            OutputSpec::Text(text) | OutputSpec::ShellCommand(text) => text.clone(),
            OutputSpec::KeySequence(strokes) => strokes
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Short variant name for listings
    pub fn kind(&self) -> &'static str {
        match self {
            OutputSpec::Text(_) => "text",
            OutputSpec::ShellCommand(_) => "shell",
            OutputSpec::KeySequence(_) => "keys",
        }
    }
}

impl fmt::Display for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSpec::Text(text) => write!(f, "{}", text),
            OutputSpec::ShellCommand(cmd) => write!(f, "$ {}", cmd),
            OutputSpec::KeySequence(_) => write!(f, "[{}]", self.value_text()),
        }
    }
}

/// Direction of a raw key event from the listener
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyEventKind {
    Press,
    Release,
}

impl fmt::Display for KeyEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEventKind::Press => write!(f, "down"),
            KeyEventKind::Release => write!(f, "up"),
        }
    }
}

/// A complete chord definition
///
/// # Example
/// ```ignore
/// let chord = Chord::new(KeySet::new(["a", "n", "d"])?, OutputSpec::text("and"), None);
/// // Pressing a, n and d together types "and"
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Chord {
    pub id: ChordId,

    /// Keys pressed simultaneously
    pub input_keys: KeySet,

    pub output: OutputSpec,

    /// Optional group label (enable/disable as a unit)
    #[serde(default)]
    pub category: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Bumped on output or category edits, never on use
    pub modified_at: DateTime<Utc>,

    /// Never incremented: the engine fires chords without reporting back.
    #[serde(default)]
    pub usage_count: u64,
}

impl Chord {
    /// Creates a chord with a fresh id and current timestamps
    ///
    /// Performs no validation; the store validates before inserting.
    pub fn new(input_keys: KeySet, output: OutputSpec, category: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ChordId::new(),
            input_keys,
            output,
            category,
            created_at: now,
            modified_at: now,
            usage_count: 0,
        }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.input_keys, self.output)?;

        if let Some(category) = &self.category {
            write!(f, " [{}]", category)?;
        }

        Ok(())
    }
}
