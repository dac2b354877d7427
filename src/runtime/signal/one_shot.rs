//! Script-local signals: one emission satisfies exactly one wait
//!
//! A key's slot holds either a buffered emission or the callers waiting for
//! one, never both. Emitting onto a buffered key is idempotent.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::super::cancel::CancelToken;
use super::super::error::Cancelled;
use super::super::state::normalize;
use super::super::waiter::{self, Deregister, WaiterId, WaiterQueue};
use super::Delivery;

#[derive(Debug)]
enum Slot {
    /// An emission arrived before anyone waited for it
    Buffered,
    /// Callers waiting for the next emission, oldest first
    Waiting(WaiterQueue),
}

/// Single-consumer signal bus used by the interpreter for its own script
#[derive(Debug, Default)]
pub struct OneShotSignalBus {
    slots: Mutex<HashMap<String, Slot>>,
}

impl OneShotSignalBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the oldest waiter for `signal`, or buffer the emission.
    pub fn emit(&self, signal: &str) -> Delivery {
        let Some(signal) = normalize(signal) else {
            tracing::warn!("ignoring emit of blank signal");
            return Delivery::Ignored;
        };

        let mut slots = self.slots.lock();
        if let Some(Slot::Waiting(queue)) = slots.get_mut(signal) {
            let woke = queue.wake_one();
            if queue.is_empty() {
                slots.remove(signal);
            }
            if woke {
                tracing::debug!(signal, "one-shot signal delivered");
                return Delivery::Woke(1);
            }
        }

        if slots.contains_key(signal) {
            tracing::debug!(signal, "one-shot signal already buffered");
        } else {
            slots.insert(signal.to_string(), Slot::Buffered);
            tracing::debug!(signal, "one-shot signal buffered");
        }
        Delivery::Buffered
    }

    /// Consume a buffered emission, or suspend until the next one.
    pub async fn wait(&self, signal: &str, cancel: &CancelToken) -> Result<(), Cancelled> {
        let Some(signal) = normalize(signal) else {
            tracing::warn!("wait on blank signal returns immediately");
            return Ok(());
        };

        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let (id, rx) = {
            let mut slots = self.slots.lock();
            match slots.get_mut(signal) {
                Some(Slot::Buffered) => {
                    slots.remove(signal);
                    tracing::debug!(signal, "consumed buffered one-shot signal");
                    return Ok(());
                }
                Some(Slot::Waiting(queue)) => queue.push(),
                None => {
                    let mut queue = WaiterQueue::default();
                    let pending = queue.push();
                    slots.insert(signal.to_string(), Slot::Waiting(queue));
                    pending
                }
            }
        };

        tracing::trace!(signal, "waiting for one-shot signal");
        let guard = Deregister::new(|| self.remove_waiter(signal, id));
        waiter::suspend(rx, guard, cancel).await
    }

    /// Whether an unconsumed emission is buffered for `signal`
    pub fn is_buffered(&self, signal: &str) -> bool {
        normalize(signal)
            .map(|signal| matches!(self.slots.lock().get(signal), Some(Slot::Buffered)))
            .unwrap_or(false)
    }

    /// Number of callers waiting on `signal`
    pub fn waiter_count(&self, signal: &str) -> usize {
        let Some(signal) = normalize(signal) else {
            return 0;
        };
        match self.slots.lock().get(signal) {
            Some(Slot::Waiting(queue)) => queue.len(),
            _ => 0,
        }
    }

    /// Drop every buffered emission and waiter. Called at the start of each run.
    pub fn clear(&self) {
        self.slots.lock().clear();
        tracing::debug!("cleared one-shot signals");
    }

    fn remove_waiter(&self, signal: &str, id: WaiterId) {
        let mut slots = self.slots.lock();
        if let Some(Slot::Waiting(queue)) = slots.get_mut(signal) {
            queue.remove(id);
            if queue.is_empty() {
                slots.remove(signal);
            }
        }
    }
}
