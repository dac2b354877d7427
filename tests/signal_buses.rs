use std::sync::Arc;

use futures::FutureExt;
use proptest::prelude::*;
use stagehand::runtime::signal::Delivery;
use stagehand::{BroadcastSignalBus, CancelToken, Cancelled, OneShotSignalBus};

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn one_shot_buffers_a_single_early_emission() {
    let bus = OneShotSignalBus::new();
    let cancel = CancelToken::new();

    assert_eq!(bus.emit("a"), Delivery::Buffered);
    assert_eq!(bus.emit("a"), Delivery::Buffered);
    assert!(bus.is_buffered("a"));

    assert_eq!(bus.wait("a", &cancel).now_or_never(), Some(Ok(())));
    // The second emission collapsed into the first.
    assert!(bus.wait("a", &cancel).now_or_never().is_none());
    assert_eq!(bus.waiter_count("a"), 0);
}

#[tokio::test]
async fn one_shot_emission_resolves_one_waiter_at_a_time() {
    let bus = Arc::new(OneShotSignalBus::new());
    let spawn_wait = |bus: &Arc<OneShotSignalBus>| {
        let bus = Arc::clone(bus);
        tokio::spawn(async move { bus.wait("go", &CancelToken::new()).await })
    };
    let first = spawn_wait(&bus);
    settle().await;
    let second = spawn_wait(&bus);
    settle().await;
    assert_eq!(bus.waiter_count("go"), 2);

    assert_eq!(bus.emit("go"), Delivery::Woke(1));
    assert_eq!(first.await.unwrap(), Ok(()));
    settle().await;
    assert!(!second.is_finished());

    assert_eq!(bus.emit("go"), Delivery::Woke(1));
    assert_eq!(second.await.unwrap(), Ok(()));
    assert!(!bus.is_buffered("go"));
}

#[tokio::test]
async fn one_shot_clear_cancels_waiters() {
    let bus = Arc::new(OneShotSignalBus::new());
    bus.emit("stale");
    let waiter = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.wait("fresh", &CancelToken::new()).await })
    };
    settle().await;

    bus.clear();
    assert_eq!(waiter.await.unwrap(), Err(Cancelled));
    assert!(!bus.is_buffered("stale"));
}

#[tokio::test]
async fn broadcast_emit_all_wakes_everyone_without_buffering() {
    let bus = Arc::new(BroadcastSignalBus::new());
    let mut listeners = Vec::new();
    for _ in 0..3 {
        let bus = Arc::clone(&bus);
        listeners.push(tokio::spawn(async move {
            bus.wait("alarm", &CancelToken::new()).await
        }));
    }
    settle().await;

    assert_eq!(bus.emit_all("alarm"), 3);
    for listener in listeners {
        assert_eq!(listener.await.unwrap(), Ok(()));
    }
    assert_eq!(bus.emit_all("alarm"), 0);
    assert_eq!(bus.pending_count("alarm"), 0);
}

#[tokio::test]
async fn broadcast_clear_pending_keeps_waiters() {
    let bus = Arc::new(BroadcastSignalBus::new());
    bus.emit("a");
    bus.emit("a");
    bus.emit("b");
    let waiter = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.wait("c", &CancelToken::new()).await })
    };
    settle().await;

    bus.clear_pending(["a"]);
    assert_eq!(bus.pending_count("a"), 0);
    assert_eq!(bus.pending_count("b"), 1);
    assert_eq!(bus.waiter_count("c"), 1);

    bus.clear_pending_all();
    assert_eq!(bus.pending_count("b"), 0);
    assert_eq!(bus.emit("c"), Delivery::Woke(1));
    assert_eq!(waiter.await.unwrap(), Ok(()));
}

proptest! {
    #[test]
    fn broadcast_pending_counts_emissions(emits in 0usize..20, waits in 0usize..20) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let bus = BroadcastSignalBus::new();
            let cancel = CancelToken::new();
            for _ in 0..emits {
                prop_assert_eq!(bus.emit("k"), Delivery::Buffered);
            }

            let mut immediate = 0;
            for _ in 0..waits {
                if bus.wait("k", &cancel).now_or_never().is_some() {
                    immediate += 1;
                }
            }

            prop_assert_eq!(immediate, emits.min(waits));
            prop_assert_eq!(bus.pending_count("k"), emits - emits.min(waits));
            prop_assert_eq!(bus.waiter_count("k"), 0);
            Ok(())
        })?;
    }
}
