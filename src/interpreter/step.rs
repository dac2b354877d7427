//! Scenario step kinds and their execution against a [`Context`]
//!
//! The set of steps is closed. Each step is a leaf operation: it awaits the
//! register, a bus, a timer, or an actor collaborator, and reports
//! [`Cancelled`] if the run's token fires while it is suspended. Missing
//! actors, waypoints, or keys are logged and the step completes as a no-op.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::context::Context;
use crate::runtime::cancel::seconds;
use crate::runtime::error::Cancelled;
use crate::runtime::state::normalize;
use crate::world::{Utterance, Vec3};

/// Lower bound on the polling tick so a zero interval cannot spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One unit of work in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Voice a line through an actor's speaker
    Say(Say),
    /// Walk an actor to a target
    MoveTo(MoveTo),
    /// Play an animation state on an actor
    PlayAnimation(PlayAnimation),
    /// Idle for a fixed time
    WaitSeconds(WaitSeconds),
    /// Wait for a script-local signal
    WaitSignal(WaitSignal),
    /// Emit a script-local signal
    EmitSignal(EmitSignal),
    /// Mutate a state flag
    SetState(SetState),
    /// Poll state flags until an aggregate condition holds
    WaitState(WaitState),
}

impl Step {
    /// Short name of the step kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Say(_) => "say",
            Step::MoveTo(_) => "move_to",
            Step::PlayAnimation(_) => "play_animation",
            Step::WaitSeconds(_) => "wait_seconds",
            Step::WaitSignal(_) => "wait_signal",
            Step::EmitSignal(_) => "emit_signal",
            Step::SetState(_) => "set_state",
            Step::WaitState(_) => "wait_state",
        }
    }

    /// Run the step to completion or cancellation.
    pub async fn execute(&self, ctx: &Context) -> Result<(), Cancelled> {
        match self {
            Step::Say(step) => step.execute(ctx).await,
            Step::MoveTo(step) => step.execute(ctx).await,
            Step::PlayAnimation(step) => step.execute(ctx).await,
            Step::WaitSeconds(step) => ctx.cancel.sleep(seconds(step.seconds)).await,
            Step::WaitSignal(step) => step.execute(ctx).await,
            Step::EmitSignal(step) => {
                step.execute(ctx);
                Ok(())
            }
            Step::SetState(step) => step.execute(ctx).await,
            Step::WaitState(step) => step.execute(ctx).await,
        }
    }
}

/// Await a collaborator while also honouring the run's token, in case the
/// collaborator ignores it.
async fn delegate<F>(ctx: &Context, operation: F) -> Result<(), Cancelled>
where
    F: Future<Output = Result<(), Cancelled>>,
{
    ctx.cancel.run(operation).await?
}

fn default_true() -> bool {
    true
}

/// Voice a line through an actor's speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Say {
    /// Actor whose speaker voices the line
    pub actor: String,
    /// Display name shown with the subtitle
    #[serde(default)]
    pub speaker: String,
    /// Subtitle text
    pub text: String,
    /// Voice clip handle
    #[serde(default)]
    pub voice: Option<String>,
    /// Minimum time the subtitle stays visible
    #[serde(default = "Say::default_min_display")]
    pub min_display_seconds: f32,
}

impl Say {
    fn default_min_display() -> f32 {
        1.0
    }

    async fn execute(&self, ctx: &Context) -> Result<(), Cancelled> {
        let Some(actor) = normalize(&self.actor) else {
            tracing::warn!("say step has no actor");
            return Ok(());
        };
        let Some(speaker) = ctx.actors.speaker(actor) else {
            tracing::warn!(actor, "no speaker registered, skipping line");
            return Ok(());
        };

        let line = Utterance {
            speaker: self.speaker.clone(),
            text: self.text.clone(),
            voice: self.voice.clone(),
            min_display: seconds(self.min_display_seconds),
        };
        delegate(ctx, speaker.speak(&line, &ctx.cancel)).await
    }
}

/// Where a MoveTo step sends its actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveTarget {
    /// Fixed world position
    Position(Vec3),
    /// Named waypoint
    Waypoint(String),
    /// Current anchor position of another actor
    Actor(String),
}

/// Walk an actor to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveTo {
    /// Actor to move
    pub actor: String,
    /// Destination
    pub target: MoveTarget,
    /// Added to the resolved destination
    #[serde(default)]
    pub offset: Vec3,
    /// Arrival tolerance; falls back to the configured default
    #[serde(default)]
    pub stop_distance: Option<f32>,
}

impl MoveTo {
    async fn execute(&self, ctx: &Context) -> Result<(), Cancelled> {
        let Some(actor) = normalize(&self.actor) else {
            tracing::warn!("move_to step has no actor");
            return Ok(());
        };
        let Some(mover) = ctx.actors.mover(actor) else {
            tracing::warn!(actor, "no mover registered, skipping move");
            return Ok(());
        };
        let Some(base) = self.resolve_target(ctx) else {
            tracing::warn!(actor, target = ?self.target, "could not resolve move target");
            return Ok(());
        };

        let destination = base + self.offset;
        let stop_distance = self.stop_distance.unwrap_or(ctx.default_stop_distance);
        tracing::debug!(actor, ?destination, stop_distance, "moving actor");
        delegate(ctx, mover.move_to(destination, stop_distance, &ctx.cancel)).await
    }

    fn resolve_target(&self, ctx: &Context) -> Option<Vec3> {
        match &self.target {
            MoveTarget::Position(position) => Some(*position),
            MoveTarget::Waypoint(id) => ctx.waypoints.resolve(id),
            MoveTarget::Actor(id) => ctx.actors.anchor(id),
        }
    }
}

/// Play an animation state on an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayAnimation {
    /// Actor to animate
    pub actor: String,
    /// Animation state name
    pub state: String,
    /// Normalized start time within the state
    #[serde(default)]
    pub start_time: f32,
    /// Wait until the state exits before completing
    #[serde(default = "default_true")]
    pub wait_for_exit: bool,
}

impl PlayAnimation {
    async fn execute(&self, ctx: &Context) -> Result<(), Cancelled> {
        let (Some(actor), Some(state)) = (normalize(&self.actor), normalize(&self.state)) else {
            tracing::warn!(actor = %self.actor, state = %self.state, "play_animation step is incomplete");
            return Ok(());
        };
        let Some(mover) = ctx.actors.mover(actor) else {
            tracing::warn!(actor, "no mover registered, skipping animation");
            return Ok(());
        };

        delegate(
            ctx,
            mover.play_animation(state, self.start_time, self.wait_for_exit, &ctx.cancel),
        )
        .await
    }
}

/// Idle for a fixed time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitSeconds {
    /// Duration in seconds
    pub seconds: f32,
}

/// Wait for a script-local signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitSignal {
    /// Signal name
    pub signal: String,
}

impl WaitSignal {
    async fn execute(&self, ctx: &Context) -> Result<(), Cancelled> {
        ctx.signals.wait(&self.signal, &ctx.cancel).await
    }
}

/// Emit a script-local signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitSignal {
    /// Signal name
    pub signal: String,
}

impl EmitSignal {
    fn execute(&self, ctx: &Context) {
        ctx.signals.emit(&self.signal);
    }
}

/// How a SetState step mutates its key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetMode {
    /// Set to true
    #[default]
    SetTrue,
    /// Set to false
    SetFalse,
    /// Invert the current value
    Toggle,
    /// Hold true for the pulse duration, then restore the prior value
    PulseTrue,
    /// Hold false for the pulse duration, then restore the prior value
    PulseFalse,
}

/// Mutate a state flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetState {
    /// State key
    pub key: String,
    /// Mutation to apply
    #[serde(default)]
    pub mode: SetMode,
    /// Delay before mutating, in seconds
    #[serde(default)]
    pub delay_before: f32,
    /// Pulse hold time, in seconds
    #[serde(default = "SetState::default_pulse")]
    pub pulse_seconds: f32,
    /// Wait until the register reports the written value
    #[serde(default)]
    pub wait_until_applied: bool,
}

impl SetState {
    fn default_pulse() -> f32 {
        0.5
    }

    async fn execute(&self, ctx: &Context) -> Result<(), Cancelled> {
        let Some(key) = normalize(&self.key) else {
            tracing::warn!("set_state step has no key");
            return Ok(());
        };

        ctx.cancel.sleep(seconds(self.delay_before)).await?;

        let states = &ctx.states;
        match self.mode {
            SetMode::SetTrue => self.write(ctx, key, true).await,
            SetMode::SetFalse => self.write(ctx, key, false).await,
            SetMode::Toggle => {
                let value = states.toggle(key);
                tracing::debug!(key, value, "toggled state");
                self.confirm(ctx, key, value).await
            }
            SetMode::PulseTrue => self.pulse(ctx, key, true).await,
            SetMode::PulseFalse => self.pulse(ctx, key, false).await,
        }
    }

    async fn write(&self, ctx: &Context, key: &str, value: bool) -> Result<(), Cancelled> {
        ctx.states.set(key, value);
        tracing::debug!(key, value, "set state");
        self.confirm(ctx, key, value).await
    }

    async fn pulse(&self, ctx: &Context, key: &str, value: bool) -> Result<(), Cancelled> {
        let previous = ctx.states.is_true(key);
        ctx.states.set(key, value);
        tracing::debug!(key, value, previous, "pulse start");

        let held = match self.confirm(ctx, key, value).await {
            Ok(()) => ctx.cancel.sleep(seconds(self.pulse_seconds)).await,
            Err(cancelled) => Err(cancelled),
        };

        // The prior value comes back even when the run is torn down mid-pulse.
        ctx.states.set(key, previous);
        tracing::debug!(key, restored = previous, "pulse end");
        held?;

        self.confirm(ctx, key, previous).await
    }

    async fn confirm(&self, ctx: &Context, key: &str, value: bool) -> Result<(), Cancelled> {
        if self.wait_until_applied {
            ctx.states.wait_until(key, value, &ctx.cancel).await
        } else {
            Ok(())
        }
    }
}

/// Aggregate condition for a WaitState step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    /// Every key is true
    #[default]
    AllTrue,
    /// At least one key is true
    AnyTrue,
    /// At least `count` keys are true
    AtLeastNTrue,
    /// Every key is false
    AllFalse,
    /// At least one key is false
    AnyFalse,
    /// At least `count` keys are false
    AtLeastNFalse,
}

impl WaitMode {
    /// Whether the condition holds for `true_count` of `total` keys.
    ///
    /// `count` is clamped to `1..=total`.
    pub fn holds(self, true_count: usize, total: usize, count: usize) -> bool {
        let false_count = total.saturating_sub(true_count);
        let count = count.clamp(1, total.max(1));
        match self {
            WaitMode::AllTrue => true_count == total,
            WaitMode::AnyTrue => true_count >= 1,
            WaitMode::AtLeastNTrue => true_count >= count,
            WaitMode::AllFalse => false_count == total,
            WaitMode::AnyFalse => false_count >= 1,
            WaitMode::AtLeastNFalse => false_count >= count,
        }
    }
}

/// Poll state flags until an aggregate condition holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitState {
    /// Keys to observe
    pub keys: Vec<String>,
    /// Condition over the keys
    #[serde(default)]
    pub mode: WaitMode,
    /// Threshold for the AtLeastN modes
    #[serde(default = "WaitState::default_count")]
    pub count: usize,
}

impl WaitState {
    fn default_count() -> usize {
        1
    }

    /// Trimmed, non-blank keys in order of first appearance
    pub fn distinct_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.keys.len());
        for key in self.keys.iter().filter_map(|key| normalize(key)) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    async fn execute(&self, ctx: &Context) -> Result<(), Cancelled> {
        let keys = self.distinct_keys();
        if keys.is_empty() {
            tracing::warn!("wait_state step has no keys");
            return Ok(());
        }

        let interval = ctx.poll_interval.max(MIN_POLL_INTERVAL);
        loop {
            let true_count = keys.iter().filter(|key| ctx.states.is_true(key)).count();
            if self.mode.holds(true_count, keys.len(), self.count) {
                tracing::debug!(?keys, mode = ?self.mode, "wait_state satisfied");
                return Ok(());
            }
            ctx.cancel.sleep(interval).await?;
        }
    }
}
