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

//! Editing `karabiner.json` without disturbing what we don't own
//!
//! The document is kept as an untyped [`serde_json::Value`]: Karabiner's
//! schema is large and changes between releases, and every field we don't
//! understand must survive a round trip. Only three things are touched:
//!
//! - the `selected` flag of each profile
//! - rules in the managed profile whose description starts with the prefix
//! - the managed profile's `basic.simultaneous_threshold_milliseconds`

use serde_json::{json, Map, Value};

use crate::compiler::{CompiledRule, RuleSequence};
use crate::core::types::KeyStroke;
use crate::engine::keycodes;
use crate::engine::EngineError;

const THRESHOLD_PARAMETER: &str = "basic.simultaneous_threshold_milliseconds";

/// An in-memory `karabiner.json`
#[derive(Clone, Debug, PartialEq)]
pub struct KarabinerDocument {
    root: Value,
}

impl Default for KarabinerDocument {
    fn default() -> Self {
        Self {
            root: json!({ "profiles": [] }),
        }
    }
}

impl KarabinerDocument {
    /// Parses a document; empty content is an empty document
    pub fn parse(content: &str) -> Result<Self, EngineError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let root: Value = serde_json::from_str(content)?;
        if !root.is_object() {
            return Err(EngineError::Document(
                "top level of karabiner.json is not an object".to_string(),
            ));
        }
        Ok(Self { root })
    }

    /// Pretty JSON with a trailing newline, the way Karabiner writes it
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(format!("{}\n", serde_json::to_string_pretty(&self.root)?))
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    fn profiles(&self) -> &[Value] {
        self.root
            .get("profiles")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn profiles_mut(&mut self) -> Result<&mut Vec<Value>, EngineError> {
        self.root
            .as_object_mut()
            .ok_or_else(|| EngineError::Document("document is not an object".to_string()))?
            .entry("profiles")
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .ok_or_else(|| EngineError::Document("\"profiles\" is not an array".to_string()))
    }

    fn profile(&self, name: &str) -> Option<&Value> {
        self.profiles()
            .iter()
            .find(|p| p.get("name").and_then(Value::as_str) == Some(name))
    }

    fn profile_mut(&mut self, name: &str) -> Result<&mut Map<String, Value>, EngineError> {
        self.profiles_mut()?
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|p| p.get("name").and_then(Value::as_str) == Some(name))
            .ok_or_else(|| EngineError::Document(format!("No profile named '{}'", name)))
    }

    fn complex_modifications_mut(
        &mut self,
        profile: &str,
    ) -> Result<&mut Map<String, Value>, EngineError> {
        self.profile_mut(profile)?
            .entry("complex_modifications")
            .or_insert_with(|| json!({ "rules": [] }))
            .as_object_mut()
            .ok_or_else(|| {
                EngineError::Document(format!(
                    "complex_modifications of '{}' is not an object",
                    profile
                ))
            })
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles()
            .iter()
            .filter_map(|p| p.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profile(name).is_some()
    }

    /// Name of the profile Karabiner is currently using
    pub fn selected_profile(&self) -> Option<String> {
        self.profiles()
            .iter()
            .find(|p| p.get("selected").and_then(Value::as_bool) == Some(true))
            .and_then(|p| p.get("name").and_then(Value::as_str))
            .map(str::to_string)
    }

    /// Marks `name` as the only selected profile
    pub fn select_profile(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.has_profile(name) {
            return Err(EngineError::Document(format!("No profile named '{}'", name)));
        }

        for profile in self.profiles_mut()?.iter_mut().filter_map(Value::as_object_mut) {
            let selected = profile.get("name").and_then(Value::as_str) == Some(name);
            profile.insert("selected".to_string(), Value::Bool(selected));
        }
        Ok(())
    }

    /// Makes sure profile `name` exists
    ///
    /// A new profile copies the first existing one (devices, simple
    /// modifications and unrelated rules included) and is left unselected.
    /// With no profiles at all, a minimal selected profile is created.
    /// Returns true if a profile was added.
    pub fn ensure_profile(&mut self, name: &str, threshold_ms: u64) -> Result<bool, EngineError> {
        if self.has_profile(name) {
            return Ok(false);
        }

        let template = self.profiles().first().cloned();
        let profile = match template {
            Some(Value::Object(mut copy)) => {
                copy.insert("name".to_string(), json!(name));
                copy.insert("selected".to_string(), json!(false));
                Value::Object(copy)
            }
            _ => minimal_profile(name, threshold_ms, self.profiles().is_empty()),
        };

        self.profiles_mut()?.push(profile);
        Ok(true)
    }

    /// Swaps the managed rules of `profile` for `rules`
    ///
    /// Rules whose description does not start with `prefix` keep their
    /// position; the new rules are appended after them. Returns how many
    /// old managed rules were removed.
    pub fn replace_managed_rules(
        &mut self,
        profile: &str,
        prefix: &str,
        rules: Vec<Value>,
    ) -> Result<usize, EngineError> {
        let existing = self
            .complex_modifications_mut(profile)?
            .entry("rules")
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .ok_or_else(|| EngineError::Document("\"rules\" is not an array".to_string()))?;

        let before = existing.len();
        existing.retain(|rule| !is_managed(rule, prefix));
        let removed = before - existing.len();
        existing.extend(rules);
        Ok(removed)
    }

    /// Sets the profile-wide simultaneous threshold
    pub fn set_simultaneous_threshold(
        &mut self,
        profile: &str,
        threshold_ms: u64,
    ) -> Result<(), EngineError> {
        let parameters = self
            .complex_modifications_mut(profile)?
            .entry("parameters")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .ok_or_else(|| EngineError::Document("\"parameters\" is not an object".to_string()))?;

        parameters.insert(THRESHOLD_PARAMETER.to_string(), json!(threshold_ms));
        Ok(())
    }

    /// Managed rules currently in `profile`
    pub fn managed_rules(&self, profile: &str, prefix: &str) -> Vec<&Value> {
        self.profile(profile)
            .and_then(|p| p.pointer("/complex_modifications/rules"))
            .and_then(Value::as_array)
            .map(|rules| rules.iter().filter(|r| is_managed(r, prefix)).collect())
            .unwrap_or_default()
    }
}

fn is_managed(rule: &Value, prefix: &str) -> bool {
    rule.get("description")
        .and_then(Value::as_str)
        .is_some_and(|d| d.starts_with(prefix))
}

fn minimal_profile(name: &str, threshold_ms: u64, selected: bool) -> Value {
    json!({
        "name": name,
        "selected": selected,
        "complex_modifications": {
            "parameters": {
                THRESHOLD_PARAMETER: threshold_ms,
                "basic.to_delayed_action_delay_milliseconds": 500,
                "basic.to_if_alone_timeout_milliseconds": 1000,
                "basic.to_if_held_down_threshold_milliseconds": 500
            },
            "rules": []
        }
    })
}

/// One Karabiner manipulator for a compiled chord
///
/// A chord with a single non-modifier key (e.g. `cmd+q`) becomes a plain
/// `key_code` match; anything wider is a `simultaneous` match.
pub fn render_manipulator(rule: &CompiledRule, trailing_space: bool) -> Value {
    let mut from = match rule.keys.as_slice() {
        [single] => json!({ "key_code": keycodes::key_code(single) }),
        keys => json!({
            "simultaneous": keys
                .iter()
                .map(|k| json!({ "key_code": keycodes::key_code(k) }))
                .collect::<Vec<_>>(),
            "simultaneous_options": {
                "key_down_order": "insensitive",
                "key_up_order": "insensitive",
                "key_up_when": "any"
            }
        }),
    };

    if !rule.modifiers.is_empty() {
        let mandatory: Vec<&str> = rule
            .modifiers
            .iter()
            .map(|m| keycodes::modifier_code(m))
            .collect();
        if let Some(from) = from.as_object_mut() {
            from.insert("modifiers".to_string(), json!({ "mandatory": mandatory }));
        }
    }

    json!({
        "type": "basic",
        "description": format!("{} → {}", rule.label, rule.output),
        "from": from,
        "to": keycodes::output_events(&rule.output, trailing_space),
        "parameters": { THRESHOLD_PARAMETER: rule.timeout_ms }
    })
}

/// Rule binding `stroke` to a shell command
pub fn render_launcher(stroke: &KeyStroke, command: &str, prefix: &str) -> Value {
    let mut from = json!({ "key_code": keycodes::key_code(&stroke.key) });
    if !stroke.modifiers.is_empty() {
        let mandatory: Vec<&str> = stroke
            .modifiers
            .iter()
            .map(|m| keycodes::modifier_code(m))
            .collect();
        if let Some(from) = from.as_object_mut() {
            from.insert("modifiers".to_string(), json!({ "mandatory": mandatory }));
        }
    }

    json!({
        "description": format!("{}Launch capture ({})", prefix, stroke),
        "manipulators": [{
            "type": "basic",
            "from": from,
            "to": [{ "shell_command": command }]
        }]
    })
}

/// One rule per group, in sequence order
pub fn render_rules(sequence: &RuleSequence, prefix: &str, trailing_space: bool) -> Vec<Value> {
    sequence
        .groups()
        .iter()
        .filter(|group| !group.rules.is_empty())
        .map(|group| {
            json!({
                "description": format!("{}{}", prefix, group.label()),
                "manipulators": group
                    .rules
                    .iter()
                    .map(|rule| render_manipulator(rule, trailing_space))
                    .collect::<Vec<_>>()
            })
        })
        .collect()
}

/// A standalone "complex modification" file
///
/// This is the format Karabiner imports from
/// `~/.config/karabiner/assets/complex_modifications/`.
pub fn export_document(
    sequence: &RuleSequence,
    title: &str,
    prefix: &str,
    trailing_space: bool,
) -> Value {
    json!({
        "title": title,
        "rules": render_rules(sequence, prefix, trailing_space)
    })
}
