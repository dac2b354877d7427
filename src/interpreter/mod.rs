//! Scenario interpreter
//!
//! Scenarios are ordered lists of steps loaded from JSON. A
//! [`ScriptInterpreter`] plays one scenario at a time against a session's
//! state register, signal buses, and actor directory, resuming from the step
//! that was interrupted when a run is cancelled.

/// Per-run execution context handed to steps.
pub mod context;
/// Sequential scenario player.
pub mod runtime;
/// Scenario documents and validation.
pub mod scenario;
/// Step kinds and their execution.
pub mod step;

pub use context::Context;
pub use runtime::{InterpreterStatus, RunOutcome, RunPhase, ScriptInterpreter};
pub use scenario::{Scenario, ScenarioWarning, WarningKind};
pub use step::{
    EmitSignal, MoveTarget, MoveTo, PlayAnimation, Say, SetMode, SetState, Step, WaitMode,
    WaitSeconds, WaitSignal, WaitState,
};

use thiserror::Error;

/// Convenience result alias for interpreter control operations.
pub type Result<T> = std::result::Result<T, InterpreterError>;

/// Errors surfaced by interpreter control operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    /// A run is already in flight for this interpreter.
    #[error("scenario '{0}' is already running")]
    AlreadyRunning(String),

    /// A seek targeted an index past the end of the scenario.
    #[error("step index {index} is beyond scenario length {len}")]
    SeekOutOfRange {
        /// Requested index
        index: usize,
        /// Number of step slots
        len: usize,
    },
}
