//! Cooperative cancellation handles
//!
//! A [`CancelToken`] is shared by every primitive a run suspends on. Cancelling
//! it wakes all of them at once; each primitive then deregisters its waiter and
//! reports [`Cancelled`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use super::error::Cancelled;

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Clonable cancellation handle. All clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Drive `future` to completion unless the token fires first.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }

    /// Cancellable timer suspension.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        if duration.is_zero() {
            return if self.is_cancelled() { Err(Cancelled) } else { Ok(()) };
        }
        self.run(tokio::time::sleep(duration)).await
    }
}

/// Convert a seconds value from scenario data into a [`Duration`].
///
/// Negative and NaN values collapse to zero. Values too large for a
/// [`Duration`], infinity included, saturate to [`Duration::MAX`].
pub fn seconds(value: f32) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f32(value).unwrap_or(Duration::MAX)
}
