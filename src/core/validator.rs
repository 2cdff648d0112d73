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

//! Whitelist-based key and output validation
//!
//! Every key identifier that reaches the store or the rule compiler has
//! passed through [`normalize_key`]. Anything outside the vocabulary is
//! rejected rather than guessed at, because an unknown key code would make
//! Karabiner silently discard the whole rule.
//!
//! # Vocabulary
//! - Letters `a`–`z` and digits `0`–`9`
//! - `space`, `return`, `tab`, `delete`, `escape`, `backspace`
//! - Arrow keys `up`, `down`, `left`, `right`
//! - Modifiers `cmd`, `shift`, `option`, `control`
//!
//! Aliases (`command`, `opt`, `alt`, `ctrl`, `enter`, `esc`) are folded into
//! their canonical names before the lookup.

use thiserror::Error;

use crate::core::types::{KeySet, KeyStroke, OutputSpec};

/// Maximum length of a text or shell-command output, in characters
pub const MAX_OUTPUT_LEN: usize = 1000;

/// Minimum number of keys in a chord
pub const MIN_CHORD_KEYS: usize = 2;

/// Validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Key name not in the vocabulary
    #[error("Invalid key '{0}'")]
    InvalidKey(String),

    /// Fewer than two distinct keys after normalisation
    #[error("Chord needs at least {MIN_CHORD_KEYS} distinct keys, got {0}")]
    TooFewKeys(usize),

    /// Only modifier keys; nothing to press simultaneously
    #[error("Chord '{0}' consists only of modifier keys")]
    ModifiersOnly(String),

    /// Empty text, command or key sequence
    #[error("Output cannot be empty")]
    EmptyOutput,

    /// Text or command exceeds [`MAX_OUTPUT_LEN`]
    #[error("Output too long: {0} characters (max {MAX_OUTPUT_LEN})")]
    OutputTooLong(usize),

    /// Key stroke inside a key-sequence output is malformed
    #[error("Invalid key stroke '{0}': {1}")]
    InvalidKeyStroke(String, String),
}

/// Canonical modifier names
pub const MODIFIER_KEYS: &[&str] = &["cmd", "control", "option", "shift"];

const SPECIAL_KEYS: &[&str] = &[
    "space",
    "return",
    "tab",
    "delete",
    "escape",
    "backspace",
    "up",
    "down",
    "left",
    "right",
];

const ALIASES: &[(&str, &str)] = &[
    ("command", "cmd"),
    ("opt", "option"),
    ("alt", "option"),
    ("ctrl", "control"),
    ("enter", "return"),
    ("esc", "escape"),
];

/// True for `cmd`, `shift`, `option` and `control`
///
/// Expects a canonical name; run [`normalize_key`] first for user input.
pub fn is_modifier(key: &str) -> bool {
    MODIFIER_KEYS.contains(&key)
}

/// Trims, lower-cases and resolves aliases, then checks the vocabulary
///
/// # Example
/// ```ignore
/// assert_eq!(normalize_key(" Ctrl ")?, "control");
/// assert!(normalize_key("f13").is_err());
/// ```
pub fn normalize_key(raw: &str) -> Result<String, ValidationError> {
    let lowered = raw.trim().to_lowercase();

    let canonical = ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(lowered);

    if is_known_key(&canonical) {
        Ok(canonical)
    } else {
        Err(ValidationError::InvalidKey(raw.trim().to_string()))
    }
}

fn is_known_key(key: &str) -> bool {
    let single_alnum = {
        let mut chars = key.chars();
        matches!(
            (chars.next(), chars.next()),
            (Some(c), None) if c.is_ascii_lowercase() || c.is_ascii_digit()
        )
    };

    single_alnum || SPECIAL_KEYS.contains(&key) || is_modifier(key)
}

/// Checks the chord-level rules for a canonical key-set
///
/// - At least [`MIN_CHORD_KEYS`] distinct keys
/// - At least one non-modifier key
pub fn validate_key_set(keys: &KeySet) -> Result<(), ValidationError> {
    if keys.len() < MIN_CHORD_KEYS {
        return Err(ValidationError::TooFewKeys(keys.len()));
    }

    if keys.effective_len() == 0 {
        return Err(ValidationError::ModifiersOnly(keys.label()));
    }

    Ok(())
}

/// Checks a key stroke used inside a key-sequence output
///
/// The pressed key must not itself be a modifier, and every entry in
/// `modifiers` must be one.
pub fn validate_key_stroke(stroke: &KeyStroke) -> Result<(), ValidationError> {
    if is_modifier(&stroke.key) {
        return Err(ValidationError::InvalidKeyStroke(
            stroke.to_string(),
            "the pressed key must not be a modifier".to_string(),
        ));
    }

    if let Some(bad) = stroke.modifiers.iter().find(|m| !is_modifier(m)) {
        return Err(ValidationError::InvalidKeyStroke(
            stroke.to_string(),
            format!("'{}' is not a modifier", bad),
        ));
    }

    Ok(())
}

/// Validates an output before it is stored
///
/// Text and shell commands must be non-empty (after trimming) and at most
/// [`MAX_OUTPUT_LEN`] characters. Key sequences must contain at least one
/// well-formed stroke.
pub fn validate_output(output: &OutputSpec) -> Result<(), ValidationError> {
    match output {
        OutputSpec::Text(value) | OutputSpec::ShellCommand(value) => {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyOutput);
            }

            let length = value.chars().count();
            if length > MAX_OUTPUT_LEN {
                return Err(ValidationError::OutputTooLong(length));
            }

            Ok(())
        }
        OutputSpec::KeySequence(strokes) => {
            if strokes.is_empty() {
                return Err(ValidationError::EmptyOutput);
            }

            strokes.iter().try_for_each(validate_key_stroke)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_folding() {
        assert_eq!(normalize_key("command"), Ok("cmd".to_string()));
        assert_eq!(normalize_key("ALT"), Ok("option".to_string()));
        assert_eq!(normalize_key("Ctrl"), Ok("control".to_string()));
        assert_eq!(normalize_key(" esc "), Ok("escape".to_string()));
    }

    #[test]
    fn test_multi_char_letters_rejected() {
        assert!(normalize_key("ab").is_err());
        assert!(normalize_key("").is_err());
        assert!(normalize_key("é").is_err());
    }
}
