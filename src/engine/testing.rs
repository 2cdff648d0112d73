//! Recording mock engine shared by capture and controller tests

use crate::compiler::RuleSequence;
use crate::config::Settings;
use crate::engine::{EngineError, RuleEngine};

pub(crate) const NEUTRAL: &str = "Neutral";

/// Records every call; failures can be switched on per operation
#[derive(Debug, Default)]
pub(crate) struct RecordingEngine {
    pub active: String,
    pub calls: Vec<String>,
    pub published: Vec<RuleSequence>,
    pub fail_select_neutral: bool,
    pub fail_select: bool,
    pub fail_publish: bool,
    /// select_neutral reports success but nothing changes
    pub ignore_switch: bool,
    /// Profile threshold from the last `reconfigure`
    pub threshold_ms: Option<u64>,
}

impl RecordingEngine {
    pub fn new(active: &str) -> Self {
        Self {
            active: active.to_string(),
            ..Self::default()
        }
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == call).count()
    }
}

impl RuleEngine for RecordingEngine {
    fn active_rule_set(&self) -> Result<String, EngineError> {
        Ok(self.active.clone())
    }

    fn select_neutral(&mut self) -> Result<String, EngineError> {
        self.calls.push("select_neutral".to_string());
        if self.fail_select_neutral {
            return Err(EngineError::Unavailable("mock refused".to_string()));
        }
        if !self.ignore_switch {
            self.active = NEUTRAL.to_string();
        }
        Ok(NEUTRAL.to_string())
    }

    fn select(&mut self, name: &str) -> Result<(), EngineError> {
        self.calls.push(format!("select:{}", name));
        if self.fail_select {
            return Err(EngineError::Unavailable("mock refused".to_string()));
        }
        self.active = name.to_string();
        Ok(())
    }

    fn publish(&mut self, rules: &RuleSequence) -> Result<(), EngineError> {
        self.calls.push("publish".to_string());
        if self.fail_publish {
            return Err(EngineError::Unavailable("mock refused".to_string()));
        }
        self.published.push(rules.clone());
        Ok(())
    }

    fn reconfigure(&mut self, settings: &Settings) {
        self.threshold_ms = Some(settings.timing.chord_timeout_ms);
    }
}
