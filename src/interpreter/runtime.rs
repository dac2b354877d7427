//! Sequential scenario player
//!
//! A run claims the interpreter, clears the script-local bus, allocates a fresh
//! cancellation token, and awaits each step in order starting at the current
//! step index. Completion rewinds the index to zero; cancellation leaves it on
//! the interrupted step so a later restart resumes there.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::InterpreterError;
use super::context::Context;
use super::scenario::Scenario;
use crate::runtime::cancel::CancelToken;
use crate::runtime::{RuntimeConfig, Session};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step from the start index onward finished
    Completed,
    /// The run's token fired before the last step finished
    Cancelled,
}

/// Lifecycle phase of an interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No run in flight
    Idle,
    /// A run is executing steps
    Running,
    /// Cancellation was requested and the run is unwinding
    Stopping,
}

/// Snapshot of the interpreter's run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterStatus {
    /// Scenario name
    pub scenario: String,
    /// Index of the next step to execute
    pub step_index: usize,
    /// Number of step slots in the scenario
    pub total_steps: usize,
    /// Whether a run is in flight
    pub running: bool,
    /// Lifecycle phase
    pub phase: RunPhase,
    /// Outcome of the most recent finished run
    pub last_outcome: Option<RunOutcome>,
    /// When the most recent run started
    pub last_started_at: Option<DateTime<Utc>>,
    /// When the most recent run finished
    pub last_finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RunState {
    step_index: usize,
    running: bool,
    cancel: Option<CancelToken>,
    last_outcome: Option<RunOutcome>,
    last_started_at: Option<DateTime<Utc>>,
    last_finished_at: Option<DateTime<Utc>>,
}

/// Plays one scenario against a session, one run at a time
#[derive(Debug)]
pub struct ScriptInterpreter {
    scenario: Arc<Scenario>,
    session: Session,
    poll_interval: Duration,
    default_stop_distance: f32,
    run: Mutex<RunState>,
    idle: Notify,
}

impl ScriptInterpreter {
    /// Create an idle interpreter positioned at `config.start_step`
    pub fn new(scenario: Arc<Scenario>, session: Session, config: &RuntimeConfig) -> Self {
        let step_index = config.start_step.min(scenario.len());
        Self {
            scenario,
            session,
            poll_interval: config.poll_interval(),
            default_stop_distance: config.default_stop_distance,
            run: Mutex::new(RunState {
                step_index,
                ..RunState::default()
            }),
            idle: Notify::new(),
        }
    }

    /// The scenario being played
    pub fn scenario(&self) -> &Arc<Scenario> {
        &self.scenario
    }

    /// Whether a run is in flight
    pub fn is_running(&self) -> bool {
        self.run.lock().running
    }

    /// Index of the next step to execute
    pub fn step_index(&self) -> usize {
        self.run.lock().step_index
    }

    /// Snapshot of the run state
    pub fn status(&self) -> InterpreterStatus {
        let run = self.run.lock();
        let phase = match &run.cancel {
            _ if !run.running => RunPhase::Idle,
            Some(cancel) if cancel.is_cancelled() => RunPhase::Stopping,
            _ => RunPhase::Running,
        };
        InterpreterStatus {
            scenario: self.scenario.name.clone(),
            step_index: run.step_index,
            total_steps: self.scenario.len(),
            running: run.running,
            phase,
            last_outcome: run.last_outcome,
            last_started_at: run.last_started_at,
            last_finished_at: run.last_finished_at,
        }
    }

    /// Spawn [`run`](Self::run) onto the tokio runtime
    pub fn start(self: &Arc<Self>) -> JoinHandle<Result<RunOutcome, InterpreterError>> {
        let interpreter = Arc::clone(self);
        tokio::spawn(async move { interpreter.run().await })
    }

    /// Cancel any in-flight run, let it unwind, then run from the current index.
    pub async fn restart(&self) -> Result<RunOutcome, InterpreterError> {
        self.stop();
        tokio::task::yield_now().await;
        self.wait_idle().await;
        self.run().await
    }

    /// Request cancellation of the in-flight run. Returns false if none was active.
    pub fn stop(&self) -> bool {
        let run = self.run.lock();
        match &run.cancel {
            Some(cancel) if run.running && !cancel.is_cancelled() => {
                tracing::info!(scenario = %self.scenario.name, step = run.step_index, "stopping run");
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Move the step index while idle
    pub fn seek(&self, index: usize) -> Result<(), InterpreterError> {
        let mut run = self.run.lock();
        if run.running {
            return Err(InterpreterError::AlreadyRunning(self.scenario.name.clone()));
        }
        if index > self.scenario.len() {
            return Err(InterpreterError::SeekOutOfRange {
                index,
                len: self.scenario.len(),
            });
        }
        run.step_index = index;
        Ok(())
    }

    /// Rewind to the first step while idle
    pub fn reset(&self) -> Result<(), InterpreterError> {
        self.seek(0)
    }

    /// Play the scenario from the current step index.
    ///
    /// Rejected with [`InterpreterError::AlreadyRunning`] if another run holds
    /// the interpreter. Cancellation is reported as [`RunOutcome::Cancelled`],
    /// not as an error.
    pub async fn run(&self) -> Result<RunOutcome, InterpreterError> {
        if self.scenario.is_empty() {
            tracing::warn!(scenario = %self.scenario.name, "scenario has no steps");
            return Ok(RunOutcome::Completed);
        }

        let cancel = CancelToken::new();
        let start = {
            let mut run = self.run.lock();
            if run.running {
                tracing::warn!(scenario = %self.scenario.name, "run rejected, already running");
                return Err(InterpreterError::AlreadyRunning(self.scenario.name.clone()));
            }
            run.running = true;
            run.cancel = Some(cancel.clone());
            run.last_started_at = Some(Utc::now());
            run.step_index
        };

        let mut active = ActiveRun {
            interpreter: self,
            outcome: RunOutcome::Cancelled,
        };

        self.session.signals.clear();
        let ctx = self.context(cancel);
        let span = tracing::info_span!("run", run_id = %Uuid::new_v4(), scenario = %self.scenario.name);
        let outcome = async {
            tracing::info!(start, total = self.scenario.len(), "run started");
            let outcome = self.play(&ctx).await;
            tracing::info!(?outcome, "run finished");
            outcome
        }
        .instrument(span)
        .await;

        active.outcome = outcome;
        Ok(outcome)
    }

    async fn play(&self, ctx: &Context) -> RunOutcome {
        let total = self.scenario.len();
        loop {
            let index = self.step_index();
            if index >= total {
                return RunOutcome::Completed;
            }
            if ctx.cancel.is_cancelled() {
                return RunOutcome::Cancelled;
            }

            match &self.scenario.steps[index] {
                Some(step) => {
                    tracing::info!(step = index, total, kind = step.kind(), "executing step");
                    if step.execute(ctx).await.is_err() {
                        tracing::debug!(step = index, "step cancelled");
                        return RunOutcome::Cancelled;
                    }
                }
                None => tracing::debug!(step = index, "skipping missing step"),
            }

            self.run.lock().step_index = index + 1;
        }
    }

    fn context(&self, cancel: CancelToken) -> Context {
        Context {
            states: Arc::clone(&self.session.states),
            signals: Arc::clone(&self.session.signals),
            broadcast: Arc::clone(&self.session.broadcast),
            actors: Arc::clone(&self.session.actors),
            waypoints: Arc::clone(&self.session.waypoints),
            cancel,
            poll_interval: self.poll_interval,
            default_stop_distance: self.default_stop_distance,
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    fn finish(&self, outcome: RunOutcome) {
        {
            let mut run = self.run.lock();
            run.running = false;
            run.cancel = None;
            run.last_outcome = Some(outcome);
            run.last_finished_at = Some(Utc::now());
            if outcome == RunOutcome::Completed {
                run.step_index = 0;
            }
        }
        self.idle.notify_waiters();
    }
}

/// Releases the interpreter when a run ends, including when the run future
/// is dropped mid-step.
struct ActiveRun<'a> {
    interpreter: &'a ScriptInterpreter,
    outcome: RunOutcome,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.interpreter.finish(self.outcome);
    }
}
