use std::sync::Arc;

use futures::FutureExt;
use stagehand::{CancelToken, Cancelled, StateRegister};

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn wait_returns_immediately_when_already_true() {
    let states = StateRegister::new();
    let cancel = CancelToken::new();
    states.set_true("CaseOpened");

    assert_eq!(
        states.wait_until_true("CaseOpened", &cancel).now_or_never(),
        Some(Ok(()))
    );
    assert_eq!(states.waiter_count("CaseOpened", true), 0);
}

#[tokio::test]
async fn every_waiter_wakes_on_the_transition() {
    let states = Arc::new(StateRegister::new());
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let states = Arc::clone(&states);
        tasks.push(tokio::spawn(async move {
            states.wait_until_true("lever", &CancelToken::new()).await
        }));
    }
    settle().await;
    assert_eq!(states.waiter_count("lever", true), 3);

    states.set_true("lever");
    for task in tasks {
        assert_eq!(task.await.unwrap(), Ok(()));
    }
    assert_eq!(states.waiter_count("lever", true), 0);
}

#[tokio::test]
async fn redundant_set_does_not_wake_opposite_waiters() {
    let states = Arc::new(StateRegister::new());
    states.set_true("door");
    let waiter = {
        let states = Arc::clone(&states);
        tokio::spawn(async move { states.wait_until_false("door", &CancelToken::new()).await })
    };
    settle().await;

    states.set_true("door");
    settle().await;
    assert!(!waiter.is_finished());

    states.toggle("door");
    assert_eq!(waiter.await.unwrap(), Ok(()));
    assert!(!states.is_true("door"));
}

#[tokio::test]
async fn cancelled_wait_leaves_no_waiter_behind() {
    let states = Arc::new(StateRegister::new());
    let cancel = CancelToken::new();
    let waiter = {
        let states = Arc::clone(&states);
        let cancel = cancel.clone();
        tokio::spawn(async move { states.wait_until_true("x", &cancel).await })
    };
    settle().await;
    assert_eq!(states.waiter_count("x", true), 1);

    cancel.cancel();
    assert_eq!(waiter.await.unwrap(), Err(Cancelled));
    assert_eq!(states.waiter_count("x", true), 0);

    // A later transition still works for fresh waiters.
    states.set_true("x");
    assert!(states.is_true("x"));
}

#[test]
fn blank_keys_are_ignored() {
    let states = StateRegister::new();
    states.set_true("   ");
    assert!(!states.is_true(""));
    assert!(states.keys().is_empty());
    assert_eq!(
        states
            .wait_until_true(" ", &CancelToken::new())
            .now_or_never(),
        Some(Ok(()))
    );
}

#[test]
fn snapshot_is_sorted() {
    let states = StateRegister::new();
    states.set_true("b");
    states.set_false("a");
    states.set_true("c");
    assert_eq!(
        states.snapshot(),
        vec![
            ("a".to_string(), false),
            ("b".to_string(), true),
            ("c".to_string(), true)
        ]
    );
}
