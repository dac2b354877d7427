//! Per-run execution context handed to every step

use std::sync::Arc;
use std::time::Duration;

use crate::runtime::cancel::CancelToken;
use crate::runtime::signal::{BroadcastSignalBus, OneShotSignalBus};
use crate::runtime::state::StateRegister;
use crate::world::{ActorDirectory, WaypointDirectory};

/// Immutable bundle of everything a step may touch during one run.
///
/// Built once per run; cloning shares the same register, buses, directories,
/// and cancellation handle.
#[derive(Debug, Clone)]
pub struct Context {
    /// Boolean flags shared with the world
    pub states: Arc<StateRegister>,
    /// Script-local signals, cleared at the start of every run
    pub signals: Arc<OneShotSignalBus>,
    /// Scene-wide signals
    pub broadcast: Arc<BroadcastSignalBus>,
    /// Actor capability lookup
    pub actors: Arc<ActorDirectory>,
    /// Waypoint lookup
    pub waypoints: Arc<WaypointDirectory>,
    /// Cancellation handle of the run
    pub cancel: CancelToken,
    /// Tick used by polling steps
    pub poll_interval: Duration,
    /// Stop distance used when a MoveTo step does not set one
    pub default_stop_distance: f32,
}
