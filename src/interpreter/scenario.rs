//! Scenario definitions and load-time validation
//!
//! A scenario is an ordered, immutable list of steps. A `null` entry is a hole
//! left by an unwired step; the interpreter skips it.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::step::{MoveTarget, Step, WaitMode};
use crate::runtime::error::ScenarioError;
use crate::runtime::state::normalize;

/// Ordered list of steps played by a [`ScriptInterpreter`](super::ScriptInterpreter)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, used in logs
    #[serde(default)]
    pub name: String,
    /// Steps in play order
    #[serde(default)]
    pub steps: Vec<Option<Step>>,
}

impl Scenario {
    /// Build a scenario from fully wired steps
    pub fn new(name: impl Into<String>, steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into_iter().map(Some).collect(),
        }
    }

    /// Parse a scenario document and log any validation warnings
    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.log_warnings();
        Ok(scenario)
    }

    /// Load a scenario document from disk and log any validation warnings
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let data = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    /// Number of step slots, including holes
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the scenario has no step slots
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Collect misconfigurations. None of them prevent a run.
    pub fn validate(&self) -> Vec<ScenarioWarning> {
        let mut warnings = Vec::new();
        if self.steps.is_empty() {
            warnings.push(ScenarioWarning::new(None, WarningKind::EmptyScenario));
        }

        for (index, slot) in self.steps.iter().enumerate() {
            let Some(step) = slot else {
                warnings.push(ScenarioWarning::new(Some(index), WarningKind::MissingStep));
                continue;
            };
            check_step(index, step, &mut warnings);
        }
        warnings
    }

    fn log_warnings(&self) {
        for warning in self.validate() {
            tracing::warn!(scenario = %self.name, "{}", warning);
        }
    }
}

fn check_step(index: usize, step: &Step, warnings: &mut Vec<ScenarioWarning>) {
    let mut warn = |kind| warnings.push(ScenarioWarning::new(Some(index), kind));

    match step {
        Step::Say(say) => {
            if blank(&say.actor) {
                warn(WarningKind::BlankActor);
            }
        }
        Step::MoveTo(move_to) => {
            if blank(&move_to.actor) {
                warn(WarningKind::BlankActor);
            }
            match &move_to.target {
                MoveTarget::Waypoint(id) if blank(id) => warn(WarningKind::BlankWaypoint),
                MoveTarget::Actor(id) if blank(id) => warn(WarningKind::BlankActor),
                _ => {}
            }
        }
        Step::PlayAnimation(play) => {
            if blank(&play.actor) {
                warn(WarningKind::BlankActor);
            }
            if blank(&play.state) {
                warn(WarningKind::BlankAnimation);
            }
        }
        Step::WaitSeconds(_) => {}
        Step::WaitSignal(wait) => {
            if blank(&wait.signal) {
                warn(WarningKind::BlankKey);
            }
        }
        Step::EmitSignal(emit) => {
            if blank(&emit.signal) {
                warn(WarningKind::BlankKey);
            }
        }
        Step::SetState(set) => {
            if blank(&set.key) {
                warn(WarningKind::BlankKey);
            }
        }
        Step::WaitState(wait) => {
            let distinct = wait.distinct_keys();
            if distinct.is_empty() {
                warn(WarningKind::NoKeys);
                return;
            }

            let mut seen = HashSet::new();
            for key in wait.keys.iter().filter_map(|key| normalize(key)) {
                if !seen.insert(key) {
                    warn(WarningKind::DuplicateKey {
                        key: key.to_string(),
                    });
                }
            }
            if wait.keys.iter().any(|key| blank(key)) {
                warn(WarningKind::BlankKey);
            }

            let threshold_mode =
                matches!(wait.mode, WaitMode::AtLeastNTrue | WaitMode::AtLeastNFalse);
            if threshold_mode && (wait.count == 0 || wait.count > distinct.len()) {
                warn(WarningKind::ThresholdOutOfRange {
                    count: wait.count,
                    keys: distinct.len(),
                });
            }
        }
    }
}

fn blank(value: &str) -> bool {
    normalize(value).is_none()
}

/// A load-time misconfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioWarning {
    /// Step slot the warning refers to, if any
    pub step: Option<usize>,
    /// What is wrong
    pub kind: WarningKind,
}

impl ScenarioWarning {
    fn new(step: Option<usize>, kind: WarningKind) -> Self {
        Self { step, kind }
    }
}

impl fmt::Display for ScenarioWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(index) => write!(f, "step {}: {}", index, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Kinds of scenario misconfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WarningKind {
    /// The scenario has no steps
    EmptyScenario,
    /// A step slot is null
    MissingStep,
    /// An actor id is blank
    BlankActor,
    /// A state key or signal name is blank
    BlankKey,
    /// A waypoint id is blank
    BlankWaypoint,
    /// An animation state name is blank
    BlankAnimation,
    /// A WaitState step lists no usable keys
    NoKeys,
    /// A WaitState step lists the same key twice
    DuplicateKey {
        /// The repeated key
        key: String,
    },
    /// An AtLeastN threshold lies outside `1..=keys`
    ThresholdOutOfRange {
        /// Configured threshold
        count: usize,
        /// Number of distinct keys
        keys: usize,
    },
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::EmptyScenario => write!(f, "scenario has no steps"),
            WarningKind::MissingStep => write!(f, "step is missing"),
            WarningKind::BlankActor => write!(f, "actor id is blank"),
            WarningKind::BlankKey => write!(f, "key is blank"),
            WarningKind::BlankWaypoint => write!(f, "waypoint id is blank"),
            WarningKind::BlankAnimation => write!(f, "animation state is blank"),
            WarningKind::NoKeys => write!(f, "no state keys to wait on"),
            WarningKind::DuplicateKey { key } => write!(f, "key '{}' listed twice", key),
            WarningKind::ThresholdOutOfRange { count, keys } => {
                write!(f, "threshold {} is outside 1..={}, it will be clamped", count, keys)
            }
        }
    }
}
