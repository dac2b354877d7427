//! Waiter queues shared by the state register and the signal buses
//!
//! A waiter is the sending half of a oneshot channel tagged with a unique id.
//! The suspended caller keeps the receiver and a [`Deregister`] guard, so a
//! waiter leaves its queue when it is woken, when its token is cancelled, or
//! when the waiting future is dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use super::cancel::CancelToken;
use super::error::Cancelled;

static NEXT_WAITER: AtomicU64 = AtomicU64::new(1);

/// Unique waiter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WaiterId(u64);

impl WaiterId {
    fn next() -> Self {
        Self(NEXT_WAITER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct Waiter {
    id: WaiterId,
    tx: oneshot::Sender<()>,
}

/// FIFO queue of suspended callers for one key/direction
#[derive(Debug, Default)]
pub(crate) struct WaiterQueue {
    waiters: VecDeque<Waiter>,
}

impl WaiterQueue {
    /// Register a new waiter at the back of the queue
    pub(crate) fn push(&mut self) -> (WaiterId, oneshot::Receiver<()>) {
        let id = WaiterId::next();
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(Waiter { id, tx });
        (id, rx)
    }

    /// Wake the oldest waiter whose caller is still listening.
    ///
    /// Returns false if no live waiter was found; stale entries are discarded.
    pub(crate) fn wake_one(&mut self) -> bool {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.tx.send(()).is_ok() {
                return true;
            }
        }
        false
    }

    /// Wake every queued waiter and empty the queue. Returns the number woken.
    pub(crate) fn wake_all(&mut self) -> usize {
        self.waiters
            .drain(..)
            .filter(|waiter| !waiter.tx.is_closed())
            .map(|waiter| waiter.tx.send(()))
            .filter(Result::is_ok)
            .count()
    }

    /// Remove a waiter by id. Returns true if it was still queued.
    pub(crate) fn remove(&mut self, id: WaiterId) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|waiter| waiter.id != id);
        self.waiters.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Runs a cleanup closure on drop unless disarmed.
pub(crate) struct Deregister<F: FnMut()> {
    cleanup: Option<F>,
}

impl<F: FnMut()> Deregister<F> {
    pub(crate) fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    /// The waiter was consumed by its producer; nothing left to remove.
    pub(crate) fn disarm(&mut self) {
        self.cleanup = None;
    }
}

impl<F: FnMut()> Drop for Deregister<F> {
    fn drop(&mut self) {
        if let Some(mut cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// Suspend on a registered waiter until it is woken or `cancel` fires.
///
/// A dropped sender (the owning register was cleared) is reported as
/// cancellation rather than left hanging.
pub(crate) async fn suspend<F: FnMut()>(
    rx: oneshot::Receiver<()>,
    mut guard: Deregister<F>,
    cancel: &CancelToken,
) -> Result<(), Cancelled> {
    let woken = tokio::select! {
        biased;
        result = rx => result.is_ok(),
        _ = cancel.cancelled() => false,
    };
    if woken {
        guard.disarm();
        Ok(())
    } else {
        drop(guard);
        Err(Cancelled)
    }
}
