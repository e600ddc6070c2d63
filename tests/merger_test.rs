//! Integration tests for the trigger merger.

mod common;

use std::time::Duration;

use tokio::time::timeout;
use vault_backup::merger::{merge_channel, MergerStats};
use vault_backup::trigger::{Trigger, TriggerSource};

#[tokio::test]
async fn test_interleaved_sources_are_delivered_in_enqueue_order() {
    let (tx, mut rx) = merge_channel::<Trigger>(10);
    let push = tx.clone();
    let timer = tx;

    push.send(Trigger::push("kv-v2/data-write")).await.unwrap();
    timer.send(Trigger::scheduled()).await.unwrap();
    push.send(Trigger::push("kv-v2/delete")).await.unwrap();
    timer.send(Trigger::scheduled()).await.unwrap();
    drop(push);
    drop(timer);

    let mut received = Vec::new();
    while let Some(trigger) = rx.recv().await {
        received.push((trigger.source, trigger.event_type));
    }

    assert_eq!(
        received,
        vec![
            (TriggerSource::Push, Some("kv-v2/data-write".to_string())),
            (TriggerSource::Scheduled, None),
            (TriggerSource::Push, Some("kv-v2/delete".to_string())),
            (TriggerSource::Scheduled, None),
        ]
    );
}

#[tokio::test]
async fn test_nothing_is_dropped_under_concurrent_producers() {
    let (tx, mut rx) = merge_channel::<u32>(3);
    let stats = tx.stats();

    let mut producers = Vec::new();
    for p in 0..4u32 {
        let tx = tx.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..50u32 {
                tx.send(p * 1000 + i).await.unwrap();
            }
        }));
    }
    drop(tx);

    let mut received = Vec::new();
    while let Some(item) = rx.recv().await {
        received.push(item);
    }
    for producer in producers {
        producer.await.unwrap();
    }

    assert_eq!(received.len(), 200);
    assert_eq!(
        stats.snapshot(),
        MergerStats {
            enqueued: 200,
            dequeued: 200
        }
    );

    // Each producer's own items keep their relative order.
    for p in 0..4u32 {
        let own: Vec<u32> = received.iter().copied().filter(|v| v / 1000 == p).collect();
        let mut sorted = own.clone();
        sorted.sort_unstable();
        assert_eq!(own, sorted);
    }
}

#[tokio::test]
async fn test_send_blocks_at_capacity_until_a_slot_frees() {
    let (tx, mut rx) = merge_channel::<Trigger>(2);
    tx.send(Trigger::scheduled()).await.unwrap();
    tx.send(Trigger::scheduled()).await.unwrap();
    assert_eq!(tx.available(), 0);

    let blocked = tokio::spawn({
        let tx = tx.clone();
        async move { tx.send(Trigger::push("late")).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished(), "send must wait while the queue is full");
    assert_eq!(tx.stats().snapshot().pending(), 2);

    assert!(rx.recv().await.is_some());
    timeout(Duration::from_secs(1), blocked)
        .await
        .expect("send should complete once a slot frees")
        .unwrap()
        .unwrap();

    assert!(rx.recv().await.is_some());
    let last = rx.recv().await.unwrap();
    assert_eq!(last.event_type.as_deref(), Some("late"));
}

#[tokio::test]
async fn test_send_fails_after_consumer_is_gone() {
    let (tx, rx) = merge_channel::<Trigger>(1);
    drop(rx);

    let err = tx.send(Trigger::scheduled()).await.unwrap_err();
    assert_eq!(err.0.source, TriggerSource::Scheduled);
    assert!(tx.is_closed());
}
