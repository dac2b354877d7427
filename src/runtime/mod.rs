//! Runtime orchestrator and public API
//!
//! This module provides the main `Runtime` struct that owns one session's
//! register, buses, and world directories, and hands them to interpreters and
//! reactions explicitly.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Submodules
pub mod cancel;
pub mod error;
pub mod reaction;
pub mod signal;
pub mod state;
pub(crate) mod waiter;

use crate::interpreter::{Scenario, ScriptInterpreter};
use crate::world::{ActorDirectory, WaypointDirectory};
use error::ConfigError;
use signal::{BroadcastSignalBus, OneShotSignalBus};
use state::StateRegister;

/// Configuration for the stagehand runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Polling tick for WaitState steps, in milliseconds
    pub poll_interval_ms: u64,

    /// Step index new interpreters start from
    pub start_step: usize,

    /// Arrival tolerance for MoveTo steps that do not set one
    pub default_stop_distance: f32,

    /// Enable debug tracing
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            start_step: 0,
            default_stop_distance: 0.2,
            debug: false,
        }
    }
}

impl RuntimeConfig {
    /// Polling tick as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Shared handles to one session's register, buses, and directories.
///
/// Cloning is cheap and every clone observes the same session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Boolean flags
    pub states: Arc<StateRegister>,
    /// Script-local signals
    pub signals: Arc<OneShotSignalBus>,
    /// Scene-wide signals
    pub broadcast: Arc<BroadcastSignalBus>,
    /// Actor capabilities
    pub actors: Arc<ActorDirectory>,
    /// Named positions
    pub waypoints: Arc<WaypointDirectory>,
}

/// The main runtime orchestrator
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    session: Session,
}

impl Runtime {
    /// Create a runtime with a fresh session and empty world directories
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            session: Session::default(),
        }
    }

    /// Create a runtime bound to existing actor and waypoint directories
    pub fn with_world(
        config: RuntimeConfig,
        actors: Arc<ActorDirectory>,
        waypoints: Arc<WaypointDirectory>,
    ) -> Self {
        Self {
            config,
            session: Session {
                actors,
                waypoints,
                ..Session::default()
            },
        }
    }

    /// Build a runtime from a JSON configuration file
    pub fn from_config_file(path: &Path) -> error::Result<Self> {
        Ok(Self::new(RuntimeConfig::load(path)?))
    }

    /// Runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Shared session handles
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Boolean flag register
    pub fn states(&self) -> &Arc<StateRegister> {
        &self.session.states
    }

    /// Script-local signal bus
    pub fn signals(&self) -> &Arc<OneShotSignalBus> {
        &self.session.signals
    }

    /// Scene-wide signal bus
    pub fn broadcast(&self) -> &Arc<BroadcastSignalBus> {
        &self.session.broadcast
    }

    /// Actor directory
    pub fn actors(&self) -> &Arc<ActorDirectory> {
        &self.session.actors
    }

    /// Waypoint directory
    pub fn waypoints(&self) -> &Arc<WaypointDirectory> {
        &self.session.waypoints
    }

    /// Build an interpreter for `scenario` bound to this session
    pub fn interpreter(&self, scenario: Scenario) -> Arc<ScriptInterpreter> {
        Arc::new(ScriptInterpreter::new(
            Arc::new(scenario),
            self.session.clone(),
            &self.config,
        ))
    }

    /// Load a scenario document and bind an interpreter to it
    pub fn load_interpreter(&self, path: &Path) -> error::Result<Arc<ScriptInterpreter>> {
        let scenario = Scenario::load(path)?;
        Ok(self.interpreter(scenario))
    }

    /// Fire `signal` on both buses: wake every broadcast waiter and deliver
    /// one script-local emission.
    pub fn emit_everywhere(&self, signal: &str) {
        let woken = self.session.broadcast.emit_all(signal);
        let delivery = self.session.signals.emit(signal);
        tracing::info!(signal, woken, ?delivery, "emitted everywhere");
    }

    /// Forget all flags and buffered broadcast emissions.
    ///
    /// Call only while no interpreter or reaction is waiting.
    pub fn reset_between_runs(&self) {
        self.session.states.clear();
        self.session.broadcast.clear_pending_all();
        tracing::info!("session state reset");
    }
}
