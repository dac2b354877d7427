//! Error types for the stagehand runtime
//!
//! Cancellation is modelled as its own unit error so waits can surface it with
//! `?`; everything else is grouped per layer with thiserror and aggregated into
//! [`RuntimeError`] at the composition root.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::interpreter::InterpreterError;

/// A wait, timer, or delegated actor operation was cancelled through its
/// [`CancelToken`](super::cancel::CancelToken).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scenario loading errors
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// Interpreter control errors
    #[error("Interpreter error: {0}")]
    Interpreter(#[from] InterpreterError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("Config file {path}: {source}")]
    Io {
        /// Path of the config file
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },

    /// Config file is not valid JSON for [`RuntimeConfig`](super::RuntimeConfig)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Scenario loading errors
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Scenario or waypoint file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to load
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },

    /// Scenario document is malformed
    #[error("Malformed scenario: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;
