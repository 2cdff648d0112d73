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

//! The key-remapping engine boundary
//!
//! The engine does the actual key interception; this crate only tells it
//! which rules exist and which rule set is active. Everything above this
//! module talks to a [`RuleEngine`], so capture and controller logic can
//! be tested against a recording mock.
//!
//! # Modes
//!
//! - **DryRun**: renders and validates in memory, never touches disk
//! - **Live**: writes `karabiner.json` through an atomic transaction
//!
//! # Example
//! ```
//! use karabiner_chord_manager::compiler::{compile, CompilePolicy};
//! use karabiner_chord_manager::engine::{EngineMode, EngineOptions, KarabinerEngine, RuleEngine};
//!
//! let mut engine = KarabinerEngine::new(
//!     "/nonexistent/karabiner.json".into(),
//!     EngineOptions::default(),
//!     EngineMode::DryRun,
//! ).unwrap();
//!
//! let rules = compile(std::iter::empty(), &CompilePolicy::default()).unwrap();
//! assert!(engine.publish(&rules).is_ok());
//! ```

pub mod document;
pub mod karabiner;
pub mod keycodes;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;

use crate::compiler::RuleSequence;
use crate::config::{ConfigError, Settings};

pub use document::KarabinerDocument;
pub use karabiner::{EngineOptions, KarabinerEngine, Launcher};

/// Engine operation mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    /// Render only - NEVER writes the engine config (tests, `--dry-run`)
    DryRun,

    /// Full access to the engine config
    Live,
}

/// Errors talking to the remapping engine
///
/// None of these ever touch the chord store.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine missing, reload failed, or a switch did not take effect
    #[error("Remapping engine unavailable: {0}")]
    Unavailable(String),

    /// The engine config has an unexpected shape
    #[error("Unexpected engine config: {0}")]
    Document(String),

    #[error("Engine config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Backup or atomic write of the engine config failed
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Operations the chord manager needs from a remapping engine
///
/// "Rule sets" are whatever the engine switches between; for Karabiner
/// they are profiles.
pub trait RuleEngine {
    /// Name of the rule set currently in effect
    ///
    /// # Errors
    /// `EngineError::Unavailable` if no rule set is active.
    fn active_rule_set(&self) -> Result<String, EngineError>;

    /// Switches to a rule set other than the compiled one
    ///
    /// Returns the name of the rule set now selected.
    fn select_neutral(&mut self) -> Result<String, EngineError>;

    /// Switches to the named rule set
    fn select(&mut self, name: &str) -> Result<(), EngineError>;

    /// Replaces the compiled rules with `rules`
    fn publish(&mut self, rules: &RuleSequence) -> Result<(), EngineError>;

    /// Picks up settings that change how rules are published
    ///
    /// Takes effect on the next `publish`.
    fn reconfigure(&mut self, _settings: &Settings) {}
}

#[cfg(test)]
mod tests;
