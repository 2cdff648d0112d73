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

//! Key identifiers to Karabiner key codes
//!
//! Chord keys use a short vocabulary (`space`, `cmd`, `up`); Karabiner wants
//! its own names (`spacebar`, `command`, `up_arrow`). Output text is typed
//! one character at a time, so every character needs a key code and
//! possibly `shift`.

use serde_json::{json, Value};
use tracing::warn;

use crate::core::types::{KeyStroke, OutputSpec};

/// Characters typed through a punctuation key, with or without shift
const PUNCTUATION: &[(char, &str, bool)] = &[
    ('.', "period", false),
    (',', "comma", false),
    (';', "semicolon", false),
    (':', "semicolon", true),
    ('\'', "quote", false),
    ('"', "quote", true),
    ('-', "hyphen", false),
    ('_', "hyphen", true),
    ('=', "equal_sign", false),
    ('+', "equal_sign", true),
    ('[', "open_bracket", false),
    (']', "close_bracket", false),
    ('{', "open_bracket", true),
    ('}', "close_bracket", true),
    ('\\', "backslash", false),
    ('|', "backslash", true),
    ('/', "slash", false),
    ('?', "slash", true),
    ('<', "comma", true),
    ('>', "period", true),
    ('`', "grave_accent_and_tilde", false),
    ('~', "grave_accent_and_tilde", true),
    ('!', "1", true),
    ('@', "2", true),
    ('#', "3", true),
    ('$', "4", true),
    ('%', "5", true),
    ('^', "6", true),
    ('&', "7", true),
    ('*', "8", true),
    ('(', "9", true),
    (')', "0", true),
];

/// Karabiner key code for a chord key
///
/// Modifiers map to their left-hand variant so they can appear inside
/// `simultaneous`.
pub fn key_code(key: &str) -> &str {
    match key {
        "space" => "spacebar",
        "return" => "return_or_enter",
        "backspace" => "delete_or_backspace",
        "delete" => "delete_forward",
        "up" => "up_arrow",
        "down" => "down_arrow",
        "left" => "left_arrow",
        "right" => "right_arrow",
        "cmd" => "left_command",
        "option" => "left_option",
        "control" => "left_control",
        "shift" => "left_shift",
        other => other,
    }
}

/// Karabiner modifier name, side-insensitive
pub fn modifier_code(key: &str) -> &str {
    match key {
        "cmd" => "command",
        other => other,
    }
}

fn press(code: &str) -> Value {
    json!({ "key_code": code })
}

fn shifted(code: &str) -> Value {
    json!({ "key_code": code, "modifiers": ["shift"] })
}

/// Key event that types `c`, if the character is typeable
pub fn char_event(c: char) -> Option<Value> {
    match c {
        ' ' => Some(press("spacebar")),
        '\n' => Some(press("return_or_enter")),
        '\t' => Some(press("tab")),
        c if c.is_ascii_lowercase() || c.is_ascii_digit() => Some(press(&c.to_string())),
        c if c.is_ascii_uppercase() => Some(shifted(&c.to_ascii_lowercase().to_string())),
        c => PUNCTUATION
            .iter()
            .find(|(symbol, _, _)| *symbol == c)
            .map(|(_, code, shift)| if *shift { shifted(code) } else { press(code) }),
    }
}

/// Key events that type `text`
///
/// Characters without a key code are skipped with a warning.
pub fn text_events(text: &str, trailing_space: bool) -> Vec<Value> {
    let mut events = Vec::with_capacity(text.len() + 1);

    for c in text.chars() {
        match char_event(c) {
            Some(event) => events.push(event),
            None => warn!(character = %c, "No key code for character, skipped"),
        }
    }

    if trailing_space {
        events.push(press("spacebar"));
    }
    events
}

pub fn stroke_event(stroke: &KeyStroke) -> Value {
    if stroke.modifiers.is_empty() {
        press(key_code(&stroke.key))
    } else {
        let modifiers: Vec<&str> = stroke.modifiers.iter().map(|m| modifier_code(m)).collect();
        json!({ "key_code": key_code(&stroke.key), "modifiers": modifiers })
    }
}

/// The `to` actions for a chord output
pub fn output_events(output: &OutputSpec, trailing_space: bool) -> Vec<Value> {
    match output {
        OutputSpec::Text(text) => text_events(text, trailing_space),
        OutputSpec::ShellCommand(command) => vec![json!({ "shell_command": command })],
        OutputSpec::KeySequence(strokes) => strokes.iter().map(stroke_event).collect(),
    }
}
