//! World-wide signals with independent listeners
//!
//! `emit` wakes the oldest listener or bumps a per-key pending counter that
//! future waits consume. `emit_all` reaches only listeners already waiting.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::super::cancel::CancelToken;
use super::super::error::Cancelled;
use super::super::state::normalize;
use super::super::waiter::{self, Deregister, WaiterId, WaiterQueue};
use super::Delivery;

#[derive(Debug, Default)]
struct BroadcastEntry {
    waiters: WaiterQueue,
    pending: usize,
}

/// Multi-listener signal bus for scene-wide triggers
#[derive(Debug, Default)]
pub struct BroadcastSignalBus {
    entries: Mutex<HashMap<String, BroadcastEntry>>,
}

impl BroadcastSignalBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the oldest waiter, or buffer one emission for a future `wait`.
    pub fn emit(&self, signal: &str) -> Delivery {
        let Some(signal) = normalize(signal) else {
            tracing::warn!("ignoring emit of blank signal");
            return Delivery::Ignored;
        };

        let mut entries = self.entries.lock();
        let entry = entries.entry(signal.to_string()).or_default();
        if entry.waiters.wake_one() {
            tracing::debug!(signal, "broadcast signal woke one listener");
            Delivery::Woke(1)
        } else {
            entry.pending += 1;
            tracing::debug!(signal, pending = entry.pending, "broadcast signal buffered");
            Delivery::Buffered
        }
    }

    /// Wake every listener currently waiting on `signal`. Nothing is buffered.
    pub fn emit_all(&self, signal: &str) -> usize {
        let Some(signal) = normalize(signal) else {
            tracing::warn!("ignoring emit_all of blank signal");
            return 0;
        };

        let woken = self
            .entries
            .lock()
            .get_mut(signal)
            .map(|entry| entry.waiters.wake_all())
            .unwrap_or(0);
        tracing::debug!(signal, woken, "broadcast signal emitted to all listeners");
        woken
    }

    /// Consume one pending emission, or wait for the next `emit`/`emit_all`.
    pub async fn wait(&self, signal: &str, cancel: &CancelToken) -> Result<(), Cancelled> {
        let Some(signal) = normalize(signal) else {
            tracing::warn!("wait on blank signal returns immediately");
            return Ok(());
        };

        let (id, rx) = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(signal.to_string()).or_default();
            if entry.pending > 0 {
                entry.pending -= 1;
                tracing::debug!(signal, pending = entry.pending, "consumed pending broadcast");
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            entry.waiters.push()
        };

        tracing::trace!(signal, "waiting for broadcast signal");
        let guard = Deregister::new(|| self.remove_waiter(signal, id));
        waiter::suspend(rx, guard, cancel).await
    }

    /// Reset pending counters for the given signals. Active waiters are kept.
    pub fn clear_pending<I, S>(&self, signals: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = self.entries.lock();
        for signal in signals {
            let Some(signal) = normalize(signal.as_ref()) else {
                continue;
            };
            if let Some(entry) = entries.get_mut(signal) {
                entry.pending = 0;
            }
        }
    }

    /// Reset every pending counter. Active waiters are kept.
    pub fn clear_pending_all(&self) {
        for entry in self.entries.lock().values_mut() {
            entry.pending = 0;
        }
        tracing::debug!("cleared pending broadcast signals");
    }

    /// Buffered emissions awaiting a future `wait`
    pub fn pending_count(&self, signal: &str) -> usize {
        normalize(signal)
            .and_then(|signal| self.entries.lock().get(signal).map(|entry| entry.pending))
            .unwrap_or(0)
    }

    /// Number of listeners currently waiting on `signal`
    pub fn waiter_count(&self, signal: &str) -> usize {
        normalize(signal)
            .and_then(|signal| {
                self.entries
                    .lock()
                    .get(signal)
                    .map(|entry| entry.waiters.len())
            })
            .unwrap_or(0)
    }

    fn remove_waiter(&self, signal: &str, id: WaiterId) {
        if let Some(entry) = self.entries.lock().get_mut(signal) {
            entry.waiters.remove(id);
        }
    }
}
