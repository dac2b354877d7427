//! Named signal hubs
//!
//! Two flavours share the same waiter machinery but differ in delivery:
//! [`OneShotSignalBus`] pairs each emission with exactly one wait and buffers a
//! single early emission, while [`BroadcastSignalBus`] serves independent scene
//! listeners with wake-one and wake-all delivery plus a pending counter.

mod broadcast;
mod one_shot;

pub use broadcast::BroadcastSignalBus;
pub use one_shot::OneShotSignalBus;

/// What an emission did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Resolved the given number of waiters
    Woke(usize),
    /// No waiter was listening; the emission is held for a future wait
    Buffered,
    /// Blank signal name; nothing happened
    Ignored,
}
