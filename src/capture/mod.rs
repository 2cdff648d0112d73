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

//! Interactive chord capture
//!
//! While the user defines chords by pressing them, the compiled chords must
//! not fire, so the engine is switched to a neutral rule set for the whole
//! session and switched back at the end.
//!
//! # States
//!
//! ```text
//! Idle → Paused → Listening ⇄ Committing → Idle
//!                     │            │
//!                     └─ Aborting ─┘ → Idle
//! ```
//!
//! - `start` pauses the engine with a two-phase switch (select, then read
//!   back). Nothing is listened to unless the switch is confirmed.
//! - Frozen candidates are committed one at a time. A candidate that
//!   exactly matches an existing chord asks Replace/Skip before the output
//!   is requested.
//! - Keys that reach the listener while a question is open are the user
//!   typing the answer. [`CaptureSession::run`] drops every event stamped
//!   before the session went back to listening.
//! - `finish` persists the new library (when a persist hook is set),
//!   publishes the new rules and resumes. `abort`, an error, or dropping
//!   the session rolls the accepted chords back and resumes.
//!
//! Resume runs exactly once per session, from whichever of those paths
//! gets there first.

pub mod accumulator;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compiler::{compile, CompileError, CompilePolicy};
use crate::config::{ConfigError, Settings};
use crate::core::conflict::{find_overlaps, Overlap};
use crate::core::parser::{parse_event_line, ParseError};
use crate::core::store::{ChordSelector, ChordStore, StoreError};
use crate::core::types::{Chord, KeyEventKind, KeySet, OutputSpec};
use crate::core::validator;
use crate::engine::{EngineError, RuleEngine};

use accumulator::Accumulator;

/// Category given to chords defined by capture
pub const CAPTURE_CATEGORY: &str = "impulse";

/// Single-session guard
///
/// Cloned handles share one flag; at most one holder at a time.
#[derive(Clone, Debug, Default)]
pub struct SessionSlot(Arc<AtomicBool>);

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot; false if someone else holds it
    pub fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A raw key event from the listener
#[derive(Clone, Debug, PartialEq)]
pub struct KeyEvent {
    pub key: String,
    pub kind: KeyEventKind,
    pub at: Instant,
}

impl KeyEvent {
    pub fn press(key: &str, at: Instant) -> Self {
        Self {
            key: key.to_string(),
            kind: KeyEventKind::Press,
            at,
        }
    }

    pub fn release(key: &str, at: Instant) -> Self {
        Self {
            key: key.to_string(),
            kind: KeyEventKind::Release,
            at,
        }
    }

    /// Parses a listener line (`down a`, `+a`, `up a`, `-a`)
    pub fn parse_line(line: &str, at: Instant) -> Result<Self, ParseError> {
        match parse_event_line(line) {
            Ok(("", (kind, key))) => Ok(Self {
                key: key.to_string(),
                kind,
                at,
            }),
            Ok((rest, _)) => Err(ParseError::Malformed {
                input: line.to_string(),
                message: format!("unexpected trailing input '{}'", rest),
            }),
            Err(e) => Err(ParseError::Malformed {
                input: line.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Paused,
    Listening,
    Committing,
    Aborting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Paused => "paused",
            SessionState::Listening => "listening",
            SessionState::Committing => "committing",
            SessionState::Aborting => "aborting",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Another capture session is already running")]
    Active,

    #[error("Cannot {action} while {state}")]
    State {
        action: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The library could not be written; nothing was published
    #[error(transparent)]
    Persist(#[from] ConfigError),
}

/// Answer to "this chord already exists"
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConflictChoice {
    Replace,
    Skip,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputResponse {
    Output(OutputSpec),
    Cancel,
}

/// Synchronous questions asked while committing a candidate
pub trait CapturePrompt {
    /// The candidate's key-set is already taken by `existing`
    fn resolve_conflict(&mut self, keys: &KeySet, existing: &Chord) -> ConflictChoice;

    /// Non-blocking notice about subset/superset chords
    fn warn_overlap(&mut self, keys: &KeySet, overlaps: &[Overlap]);

    /// What should the chord produce? `timeout_ms` is the window it will get.
    fn request_output(&mut self, keys: &KeySet, timeout_ms: u64) -> OutputResponse;
}

/// Result of feeding one event or tick to the session
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureOutcome {
    /// Nothing finished
    Continue,
    /// A chord was added to the store
    Captured(Chord),
    /// An existing chord was kept, or the candidate was rejected
    Skipped(KeySet),
    /// No output was given
    Cancelled(KeySet),
    /// The exit key was pressed
    Exit,
}

/// Capture tuning, usually from [`Settings`]
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureOptions {
    pub timeout: Duration,
    pub min_keys: usize,
    pub exit_key: String,
    /// Polling interval of [`CaptureSession::run`]
    pub tick: Duration,
    pub policy: CompilePolicy,
}

impl CaptureOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.capture.timeout_ms),
            min_keys: settings.capture.min_chord_size,
            exit_key: validator::normalize_key(&settings.capture.exit_key)
                .unwrap_or_else(|_| settings.capture.exit_key.clone()),
            tick: Duration::from_millis(settings.capture.tick_ms.max(1)),
            policy: settings.compile_policy(),
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureSummary {
    /// Chords added during the session, in order
    pub accepted: Vec<Chord>,
    /// Chords that were replaced by accepted ones
    pub replaced: Vec<Chord>,
    pub skipped: usize,
    pub duration: Duration,
}

/// Writes the store before the rules are published
pub type PersistHook<'a> = Box<dyn FnMut(&ChordStore) -> Result<(), ConfigError> + 'a>;

/// One interactive capture session
pub struct CaptureSession<'a, E: RuleEngine> {
    engine: &'a mut E,
    store: &'a mut ChordStore,
    slot: &'a SessionSlot,
    options: CaptureOptions,
    persist: Option<PersistHook<'a>>,
    state: SessionState,
    accumulator: Accumulator,
    started_at: Option<Instant>,
    /// Rule set to go back to; taken by the one resume
    previous: Option<String>,
    holds_slot: bool,
    accepted: Vec<Chord>,
    replaced: Vec<Chord>,
    skipped: usize,
}

impl<'a, E: RuleEngine> CaptureSession<'a, E> {
    pub fn new(
        engine: &'a mut E,
        store: &'a mut ChordStore,
        slot: &'a SessionSlot,
        options: CaptureOptions,
    ) -> Self {
        let accumulator = Accumulator::new(options.timeout, options.min_keys);
        Self {
            engine,
            store,
            slot,
            options,
            persist: None,
            state: SessionState::Idle,
            accumulator,
            started_at: None,
            previous: None,
            holds_slot: false,
            accepted: Vec::new(),
            replaced: Vec::new(),
            skipped: 0,
        }
    }

    /// Sets the hook `finish` uses to write the library before publishing
    pub fn persist_with<F>(mut self, persist: F) -> Self
    where
        F: FnMut(&ChordStore) -> Result<(), ConfigError> + 'a,
    {
        self.persist = Some(Box::new(persist));
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Chords accepted so far (tentative until `finish`)
    pub fn accepted(&self) -> &[Chord] {
        &self.accepted
    }

    fn expect_state(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::State {
                action,
                state: self.state,
            })
        }
    }

    /// Pauses the compiled chords and starts listening
    ///
    /// # Errors
    /// - `SessionError::Active` if another session holds the slot
    /// - `SessionError::Engine` if the switch failed or did not take
    ///   effect; the previous selection is restored if it changed
    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        self.expect_state(SessionState::Idle, "start")?;

        if !self.slot.try_acquire() {
            return Err(SessionError::Active);
        }
        self.holds_slot = true;

        let previous = match self.engine.active_rule_set() {
            Ok(previous) => previous,
            Err(e) => return Err(self.abandon_start(e.into())),
        };
        self.previous = Some(previous.clone());
        self.state = SessionState::Paused;

        let neutral = match self.engine.select_neutral() {
            Ok(neutral) => neutral,
            Err(e) => return Err(self.abandon_start(e.into())),
        };

        match self.engine.active_rule_set() {
            Ok(active) if active == neutral => {}
            Ok(active) => {
                let error = EngineError::Unavailable(format!(
                    "engine still on '{}' after switching to '{}'",
                    active, neutral
                ));
                return Err(self.abandon_start(error.into()));
            }
            Err(e) => return Err(self.abandon_start(e.into())),
        }

        self.started_at = Some(now);
        self.state = SessionState::Listening;
        info!(previous = %previous, neutral = %neutral, "Capture started");
        Ok(())
    }

    /// Undoes a half-finished start
    fn abandon_start(&mut self, error: SessionError) -> SessionError {
        if let Some(previous) = self.previous.take() {
            let switched = !matches!(self.engine.active_rule_set(), Ok(ref active) if *active == previous);
            if switched {
                if let Err(e) = self.engine.select(&previous) {
                    warn!(error = %e, previous = %previous, "Could not restore rule set");
                }
            }
        }

        self.release_slot();
        self.state = SessionState::Idle;
        warn!(error = %error, "Capture could not start");
        error
    }

    fn release_slot(&mut self) {
        if self.holds_slot {
            self.slot.release();
            self.holds_slot = false;
        }
    }

    /// Feeds one listener event
    pub fn handle_event<P: CapturePrompt>(
        &mut self,
        event: &KeyEvent,
        prompt: &mut P,
    ) -> Result<CaptureOutcome, SessionError> {
        self.expect_state(SessionState::Listening, "handle key events")?;

        if event.kind == KeyEventKind::Release {
            return Ok(CaptureOutcome::Continue);
        }

        let key = match validator::normalize_key(&event.key) {
            Ok(key) => key,
            Err(e) => {
                warn!(key = %event.key, error = %e, "Ignoring key");
                return Ok(CaptureOutcome::Continue);
            }
        };

        if key == self.options.exit_key {
            debug!("Exit key pressed");
            // A chord pressed right before the exit key still counts
            if let Some(candidate) = self.accumulator.flush() {
                self.commit(candidate, prompt)?;
            }
            return Ok(CaptureOutcome::Exit);
        }
        if validator::is_modifier(&key) {
            return Ok(CaptureOutcome::Continue);
        }

        match self.accumulator.press(&key, event.at) {
            Some(candidate) => self.commit(candidate, prompt),
            None => Ok(CaptureOutcome::Continue),
        }
    }

    /// Checks for a candidate that froze since the last event
    pub fn poll<P: CapturePrompt>(
        &mut self,
        now: Instant,
        prompt: &mut P,
    ) -> Result<CaptureOutcome, SessionError> {
        self.expect_state(SessionState::Listening, "poll")?;

        match self.accumulator.poll(now) {
            Some(candidate) => self.commit(candidate, prompt),
            None => Ok(CaptureOutcome::Continue),
        }
    }

    fn commit<P: CapturePrompt>(
        &mut self,
        candidate: Vec<String>,
        prompt: &mut P,
    ) -> Result<CaptureOutcome, SessionError> {
        self.state = SessionState::Committing;
        let outcome = self.commit_candidate(candidate, prompt);
        if self.state == SessionState::Committing {
            self.state = SessionState::Listening;
        }
        outcome
    }

    fn commit_candidate<P: CapturePrompt>(
        &mut self,
        candidate: Vec<String>,
        prompt: &mut P,
    ) -> Result<CaptureOutcome, SessionError> {
        let keys = match KeySet::new(candidate) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Candidate rejected");
                self.skipped += 1;
                return Ok(CaptureOutcome::Continue);
            }
        };
        debug!(keys = %keys, "Candidate frozen");

        let existing = match self.store.check_set(&keys) {
            Ok(overlaps) => {
                if !overlaps.is_empty() {
                    prompt.warn_overlap(&keys, &overlaps);
                }
                None
            }
            Err(StoreError::Conflict { existing, .. }) => {
                let Some(existing) = self.store.get(&existing).cloned() else {
                    return Err(StoreError::NotFound(existing.to_string()).into());
                };
                if prompt.resolve_conflict(&keys, &existing) == ConflictChoice::Skip {
                    debug!(keys = %keys, "Kept existing chord");
                    self.skipped += 1;
                    return Ok(CaptureOutcome::Skipped(keys));
                }

                let overlaps =
                    find_overlaps(&keys, self.store.all().into_iter().filter(|c| c.id != existing.id));
                if !overlaps.is_empty() {
                    prompt.warn_overlap(&keys, &overlaps);
                }
                Some(existing)
            }
            Err(e) => {
                warn!(keys = %keys, error = %e, "Candidate rejected");
                self.skipped += 1;
                return Ok(CaptureOutcome::Skipped(keys));
            }
        };

        let timeout_ms = self.options.policy.timing.timeout_for(keys.effective_len());
        let output = match prompt.request_output(&keys, timeout_ms) {
            OutputResponse::Output(output) if validator::validate_output(&output).is_ok() => output,
            _ => {
                debug!(keys = %keys, "No output given");
                return Ok(CaptureOutcome::Cancelled(keys));
            }
        };

        if let Some(existing) = &existing {
            self.store.remove(&ChordSelector::Id(existing.id))?;
        }

        match self
            .store
            .add(keys.keys(), output, Some(CAPTURE_CATEGORY.to_string()))
        {
            Ok(added) => {
                info!(chord = %added.chord, "Chord captured");
                if let Some(existing) = existing {
                    self.replaced.push(existing);
                }
                self.accepted.push(added.chord.clone());
                Ok(CaptureOutcome::Captured(added.chord))
            }
            Err(e) => {
                if let Some(existing) = existing {
                    self.store.restore(existing)?;
                }
                Err(e.into())
            }
        }
    }

    /// Persists and publishes the captured chords, then resumes
    ///
    /// If compiling or persisting fails the accepted chords are rolled
    /// back and nothing is published. If publishing fails the chords stay
    /// in the (already persisted) store. Resume is attempted either way
    /// and the first error is returned.
    pub fn finish(&mut self) -> Result<CaptureSummary, SessionError> {
        self.expect_state(SessionState::Listening, "finish")?;
        self.state = SessionState::Committing;

        let published = self.publish_accepted();

        let resumed = self.resume();
        let summary = self.summary();
        self.accepted.clear();
        self.replaced.clear();
        self.state = SessionState::Idle;
        self.release_slot();

        published?;
        resumed?;
        info!(
            accepted = summary.accepted.len(),
            skipped = summary.skipped,
            "Capture finished"
        );
        Ok(summary)
    }

    fn publish_accepted(&mut self) -> Result<(), SessionError> {
        let rules = match compile(self.store.all(), &self.options.policy) {
            Ok(rules) => rules,
            Err(e) => {
                self.rollback();
                return Err(e.into());
            }
        };

        let changed = !self.accepted.is_empty() || !self.replaced.is_empty();
        let persisted = match (&mut self.persist, changed) {
            (Some(persist), true) => persist(&*self.store),
            _ => Ok(()),
        };
        if let Err(e) = persisted {
            warn!(error = %e, "Could not save captured chords, rolling back");
            self.rollback();
            return Err(e.into());
        }

        Ok(self.engine.publish(&rules)?)
    }

    /// Rolls back every accepted chord and resumes
    ///
    /// Returns how many chords were rolled back.
    pub fn abort(&mut self, reason: &str) -> Result<usize, SessionError> {
        if self.state == SessionState::Idle {
            return Err(SessionError::State {
                action: "abort",
                state: self.state,
            });
        }

        warn!(%reason, state = %self.state, "Aborting capture");
        self.state = SessionState::Aborting;
        let rolled_back = self.rollback();
        let resumed = self.resume();
        self.state = SessionState::Idle;
        self.release_slot();

        resumed?;
        Ok(rolled_back)
    }

    fn rollback(&mut self) -> usize {
        let accepted = std::mem::take(&mut self.accepted);
        let count = accepted.len();

        for chord in accepted.iter().rev() {
            if let Err(e) = self.store.remove(&ChordSelector::Id(chord.id)) {
                warn!(chord = %chord, error = %e, "Rollback could not remove chord");
            }
        }
        for chord in std::mem::take(&mut self.replaced).into_iter().rev() {
            if let Err(e) = self.store.restore(chord) {
                warn!(error = %e, "Rollback could not restore replaced chord");
            }
        }

        self.accumulator.clear();
        debug!(count, "Capture rolled back");
        count
    }

    /// Selects the previous rule set; runs at most once
    fn resume(&mut self) -> Result<(), SessionError> {
        let Some(previous) = self.previous.take() else {
            return Ok(());
        };

        match self.engine.select(&previous) {
            Ok(()) => {
                info!(profile = %previous, "Chords resumed");
                Ok(())
            }
            Err(e) => {
                warn!(profile = %previous, error = %e, "Resume failed");
                Err(e.into())
            }
        }
    }

    fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            accepted: self.accepted.clone(),
            replaced: self.replaced.clone(),
            skipped: self.skipped,
            duration: self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }

    /// Drives the session from a channel until the exit key or the end
    /// of input
    ///
    /// Starts the session if it is idle. Events stamped before the end of
    /// the last question are dropped. Any error aborts the session before
    /// it is returned.
    pub fn run<P: CapturePrompt>(
        &mut self,
        events: &Receiver<KeyEvent>,
        prompt: &mut P,
    ) -> Result<CaptureSummary, SessionError> {
        if self.state == SessionState::Idle {
            self.start(Instant::now())?;
        }

        let mut resumed_at: Option<Instant> = None;

        loop {
            let step = match events.recv_timeout(self.options.tick) {
                Ok(event) if resumed_at.is_some_and(|t| event.at <= t) => {
                    debug!(key = %event.key, "Dropping key typed during a prompt");
                    Ok(CaptureOutcome::Continue)
                }
                Ok(event) => self.handle_event(&event, prompt),
                Err(RecvTimeoutError::Timeout) => self.poll(Instant::now(), prompt),
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Event source closed");
                    match self.accumulator.flush() {
                        Some(candidate) => self.commit(candidate, prompt).map(|_| CaptureOutcome::Exit),
                        None => Ok(CaptureOutcome::Exit),
                    }
                }
            };

            match step {
                Ok(CaptureOutcome::Exit) => return self.finish(),
                Ok(CaptureOutcome::Continue) => {}
                Ok(_) => {
                    // A question was asked; whatever was typed meanwhile is not a chord
                    self.accumulator.clear();
                    resumed_at = Some(Instant::now());
                }
                Err(e) => {
                    if let Err(abort_error) = self.abort(&e.to_string()) {
                        warn!(error = %abort_error, "Abort after error failed");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl<E: RuleEngine> Drop for CaptureSession<'_, E> {
    fn drop(&mut self) {
        if self.state != SessionState::Idle {
            warn!(state = %self.state, "Capture session dropped, rolling back");
            self.rollback();
            if let Err(e) = self.resume() {
                warn!(error = %e, "Resume on drop failed");
            }
            self.state = SessionState::Idle;
        }
        self.release_slot();
    }
}

#[cfg(test)]
mod tests;
