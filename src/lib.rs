//! Stagehand – an async scenario player for interactive scenes
//!
//! This crate coordinates scripted scenes with:
//! - A shared boolean state register with edge-triggered waits
//! - A script-local one-shot signal bus and a scene-wide broadcast bus
//! - A sequential scenario interpreter with cooperative cancellation and resume
//! - Long-lived reactions driven by the same register and buses
//! - Narrow actor interfaces for movement, animation, and speech

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Scenario model and interpreter
pub mod interpreter;
/// Coordination primitives and the composition root
pub mod runtime;
/// Actor and waypoint interfaces
pub mod world;

// Re-export key types for convenience
pub use interpreter::{RunOutcome, Scenario, ScriptInterpreter, Step};
pub use runtime::cancel::CancelToken;
pub use runtime::error::{Cancelled, RuntimeError};
pub use runtime::signal::{BroadcastSignalBus, OneShotSignalBus};
pub use runtime::state::StateRegister;
pub use runtime::{Runtime, RuntimeConfig, Session};

/// Current version of stagehand
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
