//! Keyed boolean state register
//!
//! Each key holds one flag plus two FIFO waiter queues, one per transition
//! direction. A transition wakes every waiter registered for that direction;
//! setting a flag to the value it already holds wakes nobody.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::cancel::CancelToken;
use super::error::Cancelled;
use super::waiter::{self, Deregister, WaiterId, WaiterQueue};

#[derive(Debug, Default)]
struct StateEntry {
    value: bool,
    true_waiters: WaiterQueue,
    false_waiters: WaiterQueue,
}

impl StateEntry {
    fn waiters_mut(&mut self, target: bool) -> &mut WaiterQueue {
        if target {
            &mut self.true_waiters
        } else {
            &mut self.false_waiters
        }
    }

    fn waiters(&self, target: bool) -> &WaiterQueue {
        if target {
            &self.true_waiters
        } else {
            &self.false_waiters
        }
    }
}

/// Process-wide register of named boolean flags with async wait-for-transition
#[derive(Debug, Default)]
pub struct StateRegister {
    entries: Mutex<HashMap<String, StateEntry>>,
}

impl StateRegister {
    /// Create an empty register
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition `key` to true, waking all `wait_until_true` callers
    pub fn set_true(&self, key: &str) {
        self.set(key, true);
    }

    /// Transition `key` to false, waking all `wait_until_false` callers
    pub fn set_false(&self, key: &str) {
        self.set(key, false);
    }

    /// Set `key` to `value`. No-op if the key already holds `value`.
    pub fn set(&self, key: &str, value: bool) {
        let Some(key) = normalize(key) else {
            tracing::warn!("ignoring state update for blank key");
            return;
        };

        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(key, "created state key");
            StateEntry::default()
        });
        if entry.value == value {
            return;
        }

        entry.value = value;
        let woken = entry.waiters_mut(value).wake_all();
        tracing::debug!(key, value, woken, "state transition");
    }

    /// Flip the current value of `key` and return the new value
    pub fn toggle(&self, key: &str) -> bool {
        let Some(key) = normalize(key) else {
            tracing::warn!("ignoring toggle for blank key");
            return false;
        };

        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_default();
        entry.value = !entry.value;
        let value = entry.value;
        let woken = entry.waiters_mut(value).wake_all();
        tracing::debug!(key, value, woken, "state toggled");
        value
    }

    /// Current value of `key`. Unknown keys read as false.
    pub fn is_true(&self, key: &str) -> bool {
        let Some(key) = normalize(key) else {
            return false;
        };
        self.entries
            .lock()
            .get(key)
            .map(|entry| entry.value)
            .unwrap_or(false)
    }

    /// Suspend until `key` is true. Returns immediately if it already is.
    pub async fn wait_until_true(&self, key: &str, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.wait_until(key, true, cancel).await
    }

    /// Suspend until `key` is false. Returns immediately if it already is.
    pub async fn wait_until_false(&self, key: &str, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.wait_until(key, false, cancel).await
    }

    /// Suspend until `key` holds `target`.
    pub async fn wait_until(
        &self,
        key: &str,
        target: bool,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled> {
        let Some(key) = normalize(key) else {
            tracing::warn!("wait on blank state key returns immediately");
            return Ok(());
        };

        let (id, rx) = {
            let mut entries = self.entries.lock();
            let current = entries.get(key).map(|entry| entry.value).unwrap_or(false);
            if current == target {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            entries
                .entry(key.to_string())
                .or_default()
                .waiters_mut(target)
                .push()
        };

        tracing::trace!(key, target, "waiting for state");
        let guard = Deregister::new(|| self.remove_waiter(key, target, id));
        let result = waiter::suspend(rx, guard, cancel).await;
        if result.is_err() {
            tracing::debug!(key, target, "state wait cancelled");
        }
        result
    }

    /// Number of callers currently waiting for `key` to become `target`
    pub fn waiter_count(&self, key: &str, target: bool) -> usize {
        let Some(key) = normalize(key) else {
            return 0;
        };
        self.entries
            .lock()
            .get(key)
            .map(|entry| entry.waiters(target).len())
            .unwrap_or(0)
    }

    /// Snapshot of all known keys and their values, sorted by key
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        let mut keys: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value))
            .collect();
        keys.sort();
        keys
    }

    /// Known keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop all keys and waiters. Only safe between runs: waiters still
    /// suspended observe cancellation.
    pub fn clear(&self) {
        self.entries.lock().clear();
        tracing::debug!("cleared state register");
    }

    fn remove_waiter(&self, key: &str, target: bool, id: WaiterId) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.waiters_mut(target).remove(id);
        }
    }
}

/// Trim a key; blank keys are rejected.
pub(crate) fn normalize(key: &str) -> Option<&str> {
    let key = key.trim();
    (!key.is_empty()).then_some(key)
}
