//! Long-lived scene listeners
//!
//! Reactions sit outside any scenario and respond to the same register and
//! buses an interpreter uses. Each one is a plain serde config with an async
//! `run` that loops until it is done or its token fires, and a `spawn` helper
//! that detaches it onto tokio behind a [`ReactionHandle`].
//!
//! Every reaction that re-arms waits for the opposite condition first, so a
//! flag that stays put cannot fire it twice.

use std::future::Future;
use std::sync::Arc;

use futures::future::select_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::Session;
use super::cancel::{CancelToken, seconds};
use super::error::Cancelled;
use super::signal::BroadcastSignalBus;
use super::state::{StateRegister, normalize};
use crate::world::Utterance;

/// A running reaction
#[derive(Debug)]
pub struct ReactionHandle {
    cancel: CancelToken,
    task: JoinHandle<Result<usize, Cancelled>>,
}

impl ReactionHandle {
    fn spawn<F, Fut>(reaction: F) -> Self
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = Result<usize, Cancelled>> + Send + 'static,
    {
        let cancel = CancelToken::new();
        let task = tokio::spawn(reaction(cancel.clone()));
        Self { cancel, task }
    }

    /// Ask the reaction to stop at its next suspension point
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the reaction has returned
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the reaction to return the number of times it fired
    pub async fn join(self) -> Result<usize, Cancelled> {
        self.task.await.unwrap_or(Err(Cancelled))
    }
}

/// Which side of the threshold fires a [`ThresholdWatch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// Fire when at least `required` keys are true
    #[default]
    WhenTrue,
    /// Fire when fewer than `required` keys are true
    WhenFalse,
}

/// Fire a callback when the number of true keys crosses a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdWatch {
    /// Keys to observe
    pub keys: Vec<String>,
    /// Threshold, clamped to `1..=keys`
    #[serde(default = "default_required")]
    pub required: usize,
    /// Side of the threshold that fires
    #[serde(default)]
    pub edge: Edge,
    /// Stop after the first firing
    #[serde(default = "default_true")]
    pub trigger_once: bool,
    /// Fire immediately if the target side already holds at start
    #[serde(default)]
    pub fire_if_already: bool,
    /// Delay between reaching the edge and firing, in seconds
    #[serde(default)]
    pub delay_seconds: f32,
}

fn default_required() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl ThresholdWatch {
    /// Watch `keys` with the defaults: any key true, fire once
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            required: default_required(),
            edge: Edge::default(),
            trigger_once: true,
            fire_if_already: false,
            delay_seconds: 0.0,
        }
    }

    /// Detach the watch onto tokio. `on_fire` receives the true count at firing.
    pub fn spawn<F>(self, states: Arc<StateRegister>, on_fire: F) -> ReactionHandle
    where
        F: FnMut(usize) + Send + 'static,
    {
        ReactionHandle::spawn(move |cancel| async move {
            self.run(&states, &cancel, on_fire).await
        })
    }

    /// Watch until done or cancelled; returns how many times it fired.
    pub async fn run<F>(
        &self,
        states: &StateRegister,
        cancel: &CancelToken,
        mut on_fire: F,
    ) -> Result<usize, Cancelled>
    where
        F: FnMut(usize),
    {
        let mut keys: Vec<&str> = Vec::with_capacity(self.keys.len());
        for key in self.keys.iter().filter_map(|key| normalize(key)) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            tracing::warn!("threshold watch has no keys");
            return Ok(0);
        }

        let required = self.required.clamp(1, keys.len());
        let fire_high = self.edge == Edge::WhenTrue;
        tracing::info!(?keys, required, edge = ?self.edge, "threshold watch ready");

        let on_target = (true_count(states, &keys) >= required) == fire_high;
        if on_target && !self.fire_if_already {
            tracing::debug!("target already holds, waiting for the opposite side first");
            wait_side(states, &keys, required, !fire_high, cancel).await?;
        }

        let mut fired = 0;
        loop {
            wait_side(states, &keys, required, fire_high, cancel).await?;
            cancel.sleep(seconds(self.delay_seconds)).await?;

            let count = true_count(states, &keys);
            tracing::info!(count, required, "threshold watch fired");
            on_fire(count);
            fired += 1;
            if self.trigger_once {
                return Ok(fired);
            }

            wait_side(states, &keys, required, !fire_high, cancel).await?;
        }
    }
}

fn true_count(states: &StateRegister, keys: &[&str]) -> usize {
    keys.iter().filter(|key| states.is_true(key)).count()
}

/// Suspend until at least `required` keys are true (`high`) or fewer than
/// `required` are (`!high`). Wakes on any single key flipping the right way
/// and re-counts.
async fn wait_side(
    states: &StateRegister,
    keys: &[&str],
    required: usize,
    high: bool,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    loop {
        if (true_count(states, keys) >= required) == high {
            return Ok(());
        }

        // Keys that could move the count towards the target.
        let movable: Vec<_> = keys
            .iter()
            .filter(|key| states.is_true(key) != high)
            .map(|key| Box::pin(states.wait_until(key, high, cancel)))
            .collect();
        if movable.is_empty() {
            return Ok(());
        }

        let (woke, _, _) = select_all(movable).await;
        woke?;
    }
}

/// Wait for a broadcast signal, run a callback, then broadcast a follow-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRelay {
    /// Broadcast signal to wait for
    pub listen: String,
    /// Broadcast signal emitted to all waiters after the callback
    #[serde(default)]
    pub emit_after: Option<String>,
    /// Stop after the first relay
    #[serde(default = "default_true")]
    pub trigger_once: bool,
    /// Delay before the callback, in seconds
    #[serde(default)]
    pub delay_seconds: f32,
    /// Delay between the callback and the follow-up, in seconds
    #[serde(default)]
    pub emit_delay_seconds: f32,
}

impl SignalRelay {
    /// Relay `listen` to `emit_after`, once
    pub fn new(listen: impl Into<String>, emit_after: Option<String>) -> Self {
        Self {
            listen: listen.into(),
            emit_after,
            trigger_once: true,
            delay_seconds: 0.0,
            emit_delay_seconds: 0.0,
        }
    }

    /// Detach the relay onto tokio
    pub fn spawn<F>(self, broadcast: Arc<BroadcastSignalBus>, on_signal: F) -> ReactionHandle
    where
        F: FnMut() + Send + 'static,
    {
        ReactionHandle::spawn(move |cancel| async move {
            self.run(&broadcast, &cancel, on_signal).await
        })
    }

    /// Relay until done or cancelled; returns how many signals were handled.
    pub async fn run<F>(
        &self,
        broadcast: &BroadcastSignalBus,
        cancel: &CancelToken,
        mut on_signal: F,
    ) -> Result<usize, Cancelled>
    where
        F: FnMut(),
    {
        let Some(listen) = normalize(&self.listen) else {
            tracing::warn!("signal relay has no signal to listen for");
            return Ok(0);
        };
        let follow_up = self.emit_after.as_deref().and_then(normalize);
        tracing::info!(listen, ?follow_up, "signal relay ready");

        let mut handled = 0;
        loop {
            broadcast.wait(listen, cancel).await?;
            tracing::info!(listen, "signal relay received");
            cancel.sleep(seconds(self.delay_seconds)).await?;
            on_signal();

            if let Some(follow_up) = follow_up {
                cancel.sleep(seconds(self.emit_delay_seconds)).await?;
                let woken = broadcast.emit_all(follow_up);
                tracing::info!(follow_up, woken, "signal relay emitted");
            }

            handled += 1;
            if self.trigger_once {
                return Ok(handled);
            }
        }
    }
}

/// Speak a line when a state flag reaches a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSpeechReaction {
    /// Actor whose speaker voices the line
    pub actor: String,
    /// State key to watch
    pub key: String,
    /// React to the key becoming true rather than false
    #[serde(default = "default_true")]
    pub react_when_true: bool,
    /// Re-arm after the key flips back
    #[serde(default)]
    pub retrigger: bool,
    /// Pause after speaking before re-arming, in seconds
    #[serde(default)]
    pub cooldown_seconds: f32,
    /// Display name shown with the line
    #[serde(default)]
    pub speaker: String,
    /// Subtitle text
    pub text: String,
    /// Voice clip handle
    #[serde(default)]
    pub voice: Option<String>,
    /// Minimum time the line stays visible, in seconds
    #[serde(default = "StateSpeechReaction::default_min_display")]
    pub min_display_seconds: f32,
}

impl StateSpeechReaction {
    fn default_min_display() -> f32 {
        0.6
    }

    /// Detach the reaction onto tokio
    pub fn spawn(self, session: Session) -> ReactionHandle {
        ReactionHandle::spawn(move |cancel| async move { self.run(&session, &cancel).await })
    }

    /// React until done or cancelled; returns how many lines were spoken.
    pub async fn run(&self, session: &Session, cancel: &CancelToken) -> Result<usize, Cancelled> {
        let (Some(actor), Some(key)) = (normalize(&self.actor), normalize(&self.key)) else {
            tracing::warn!(actor = %self.actor, key = %self.key, "speech reaction is incomplete");
            return Ok(0);
        };
        let Some(speaker) = session.actors.speaker(actor) else {
            tracing::error!(actor, "no speaker registered for speech reaction");
            return Ok(0);
        };

        let line = Utterance {
            speaker: self.speaker.clone(),
            text: self.text.clone(),
            voice: self.voice.clone(),
            min_display: seconds(self.min_display_seconds),
        };
        let target = self.react_when_true;
        tracing::info!(actor, key, target, retrigger = self.retrigger, "speech reaction ready");

        let mut spoken = 0;
        loop {
            session.states.wait_until(key, target, cancel).await?;
            tracing::info!(actor, key, text = %line.text, "speech reaction triggered");
            cancel.run(speaker.speak(&line, cancel)).await??;
            spoken += 1;
            if !self.retrigger {
                return Ok(spoken);
            }

            cancel.sleep(seconds(self.cooldown_seconds)).await?;
            session.states.wait_until(key, !target, cancel).await?;
        }
    }
}

/// Speak a line once when a broadcast signal arrives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpeechReaction {
    /// Actor whose speaker voices the line
    pub actor: String,
    /// Broadcast signal to wait for
    pub listen: String,
    /// Display name shown with the line
    #[serde(default)]
    pub speaker: String,
    /// Subtitle text
    pub text: String,
    /// Voice clip handle
    #[serde(default)]
    pub voice: Option<String>,
    /// Minimum time the line stays visible, in seconds
    #[serde(default = "StateSpeechReaction::default_min_display")]
    pub min_display_seconds: f32,
}

impl SignalSpeechReaction {
    /// Detach the reaction onto tokio
    pub fn spawn(self, session: Session) -> ReactionHandle {
        ReactionHandle::spawn(move |cancel| async move { self.run(&session, &cancel).await })
    }

    /// Wait for the signal and speak; returns 1 if the line was spoken.
    ///
    /// The speaker is looked up when the signal arrives, so it may be
    /// registered after the reaction starts.
    pub async fn run(&self, session: &Session, cancel: &CancelToken) -> Result<usize, Cancelled> {
        let (Some(actor), Some(listen)) = (normalize(&self.actor), normalize(&self.listen)) else {
            tracing::warn!(actor = %self.actor, listen = %self.listen, "signal speech reaction is incomplete");
            return Ok(0);
        };
        tracing::info!(actor, listen, "signal speech reaction ready");

        session.broadcast.wait(listen, cancel).await?;
        let Some(speaker) = session.actors.speaker(actor) else {
            tracing::error!(actor, listen, "no speaker registered at speak time");
            return Ok(0);
        };

        let line = Utterance {
            speaker: self.speaker.clone(),
            text: self.text.clone(),
            voice: self.voice.clone(),
            min_display: seconds(self.min_display_seconds),
        };
        tracing::info!(actor, listen, text = %line.text, "signal speech reaction triggered");
        cancel.run(speaker.speak(&line, cancel)).await??;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn watch(keys: &[&str], required: usize, edge: Edge, trigger_once: bool) -> ThresholdWatch {
        ThresholdWatch {
            required,
            edge,
            trigger_once,
            ..ThresholdWatch::new(keys.iter().copied())
        }
    }

    #[tokio::test]
    async fn test_threshold_fires_and_rearms() {
        let states = Arc::new(StateRegister::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = watch(&["a", "b", "c"], 2, Edge::WhenTrue, false)
            .spawn(Arc::clone(&states), move |count| {
                let _ = tx.send(count);
            });

        states.set_true("a");
        settle().await;
        assert!(rx.try_recv().is_err());

        states.set_true("b");
        assert_eq!(rx.recv().await, Some(2));

        // Still above the threshold, no refire.
        states.set_true("c");
        settle().await;
        assert!(rx.try_recv().is_err());

        states.set_false("a");
        states.set_false("b");
        settle().await;
        states.set_true("a");
        assert_eq!(rx.recv().await, Some(2));

        handle.stop();
        assert_eq!(handle.join().await, Err(Cancelled));
    }

    #[tokio::test]
    async fn test_threshold_waits_for_opposite_when_already_on_target() {
        let states = Arc::new(StateRegister::new());
        states.set_true("a");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = watch(&["a"], 1, Edge::WhenTrue, true).spawn(Arc::clone(&states), move |n| {
            let _ = tx.send(n);
        });

        settle().await;
        assert!(rx.try_recv().is_err());

        states.set_false("a");
        settle().await;
        states.set_true("a");
        assert_eq!(handle.join().await, Ok(1));
        assert_eq!(rx.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_threshold_fire_if_already() {
        let states = Arc::new(StateRegister::new());
        states.set_true("a");
        let watch = ThresholdWatch {
            fire_if_already: true,
            ..ThresholdWatch::new(["a"])
        };

        let cancel = CancelToken::new();
        assert_eq!(watch.run(&states, &cancel, |_| {}).await, Ok(1));
    }

    #[tokio::test]
    async fn test_threshold_when_false_edge() {
        let states = Arc::new(StateRegister::new());
        states.set_true("a");
        states.set_true("b");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = watch(&["a", "b"], 5, Edge::WhenFalse, true)
            .spawn(Arc::clone(&states), move |count| {
                let _ = tx.send(count);
            });

        // Threshold clamps to 2, so one key dropping is enough.
        settle().await;
        states.set_false("b");
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(handle.join().await, Ok(1));
    }

    #[tokio::test]
    async fn test_threshold_without_keys_returns() {
        let states = StateRegister::new();
        let cancel = CancelToken::new();
        let watch = ThresholdWatch::new([" ", ""]);
        assert_eq!(watch.run(&states, &cancel, |_| {}).await, Ok(0));
    }

    #[tokio::test]
    async fn test_signal_relay_emits_follow_up() {
        let broadcast = Arc::new(BroadcastSignalBus::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SignalRelay::new("case_opened", Some("assembled".into()))
            .spawn(Arc::clone(&broadcast), move || {
                let _ = tx.send(());
            });

        let listener = {
            let broadcast = Arc::clone(&broadcast);
            tokio::spawn(async move { broadcast.wait("assembled", &CancelToken::new()).await })
        };
        while broadcast.waiter_count("assembled") == 0 {
            tokio::task::yield_now().await;
        }

        broadcast.emit("case_opened");
        assert_eq!(listener.await.unwrap(), Ok(()));
        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(handle.join().await, Ok(1));
        // emit_all never leaves a pending count behind
        assert_eq!(broadcast.pending_count("assembled"), 0);
    }

    #[derive(Default)]
    struct RecordingSpeaker {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl crate::world::Speaker for RecordingSpeaker {
        async fn speak(&self, line: &Utterance, _cancel: &CancelToken) -> Result<(), Cancelled> {
            self.lines.lock().push(line.text.clone());
            Ok(())
        }
    }

    fn speech(retrigger: bool) -> StateSpeechReaction {
        StateSpeechReaction {
            actor: "guide".into(),
            key: "Held:Wrong".into(),
            react_when_true: true,
            retrigger,
            cooldown_seconds: 0.0,
            speaker: "Guide".into(),
            text: "Wrong item".into(),
            voice: None,
            min_display_seconds: 0.6,
        }
    }

    #[tokio::test]
    async fn test_speech_reaction_speaks_once() {
        let session = Session::default();
        let speaker = Arc::new(RecordingSpeaker::default());
        session.actors.register_speaker("guide", speaker.clone());

        let handle = speech(false).spawn(session.clone());
        settle().await;
        session.states.set_true("Held:Wrong");

        assert_eq!(handle.join().await, Ok(1));
        assert_eq!(*speaker.lines.lock(), vec!["Wrong item".to_string()]);
    }

    #[tokio::test]
    async fn test_speech_reaction_retriggers_after_opposite() {
        let session = Session::default();
        let speaker = Arc::new(RecordingSpeaker::default());
        session.actors.register_speaker("guide", speaker.clone());

        let handle = speech(true).spawn(session.clone());
        session.states.set_true("Held:Wrong");
        settle().await;
        assert_eq!(speaker.lines.lock().len(), 1);

        session.states.set_false("Held:Wrong");
        settle().await;
        session.states.set_true("Held:Wrong");
        settle().await;
        assert_eq!(speaker.lines.lock().len(), 2);

        handle.stop();
        assert_eq!(handle.join().await, Err(Cancelled));
    }

    fn announcement() -> SignalSpeechReaction {
        SignalSpeechReaction {
            actor: " guide ".into(),
            listen: "WrongItem".into(),
            speaker: "Guide".into(),
            text: "Wrong item".into(),
            voice: None,
            min_display_seconds: 0.6,
        }
    }

    #[tokio::test]
    async fn test_signal_speech_speaks_once_on_signal() {
        let session = Session::default();
        let speaker = Arc::new(RecordingSpeaker::default());

        let handle = announcement().spawn(session.clone());
        settle().await;
        assert!(speaker.lines.lock().is_empty());

        // Resolved at speak time, so late registration still works.
        session.actors.register_speaker("guide", speaker.clone());
        session.broadcast.emit("WrongItem");
        assert_eq!(handle.join().await, Ok(1));

        session.broadcast.emit("WrongItem");
        settle().await;
        assert_eq!(*speaker.lines.lock(), vec!["Wrong item".to_string()]);
    }

    #[tokio::test]
    async fn test_signal_speech_without_speaker() {
        let session = Session::default();
        let cancel = CancelToken::new();
        session.broadcast.emit("WrongItem");
        assert_eq!(announcement().run(&session, &cancel).await, Ok(0));
    }

    #[tokio::test]
    async fn test_signal_speech_stops_while_waiting() {
        let session = Session::default();
        let handle = announcement().spawn(session.clone());
        while session.broadcast.waiter_count("WrongItem") == 0 {
            tokio::task::yield_now().await;
        }

        handle.stop();
        assert_eq!(handle.join().await, Err(Cancelled));
        assert_eq!(session.broadcast.waiter_count("WrongItem"), 0);
    }

    #[tokio::test]
    async fn test_speech_reaction_without_speaker() {
        let session = Session::default();
        let cancel = CancelToken::new();
        assert_eq!(speech(false).run(&session, &cancel).await, Ok(0));
    }
}
