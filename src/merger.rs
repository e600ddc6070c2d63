//! Fan-in of any number of producers into one ordered consumer.
//!
//! A thin wrapper over a bounded `tokio::sync::mpsc` channel. Producers that
//! find the queue full wait for a free slot; nothing is ever dropped. The
//! receiver sees items in the order their sends completed, regardless of
//! which producer sent them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default number of pending items the merger buffers.
pub const DEFAULT_CAPACITY: usize = 10;

/// Returned when the consumer is gone. Carries the undelivered item back.
#[derive(Debug, Error)]
#[error("merger consumer has shut down")]
pub struct MergerClosed<T>(pub T);

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

/// Point-in-time counts for a merger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergerStats {
    pub enqueued: u64,
    pub dequeued: u64,
}

impl MergerStats {
    /// Items accepted but not yet consumed.
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.dequeued)
    }
}

/// Read-only view on a merger's counters.
#[derive(Debug, Clone)]
pub struct MergerStatsHandle {
    counters: Arc<Counters>,
}

impl MergerStatsHandle {
    pub fn snapshot(&self) -> MergerStats {
        MergerStats {
            enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            dequeued: self.counters.dequeued.load(Ordering::SeqCst),
        }
    }
}

/// Producer side. Clone one per source.
#[derive(Debug)]
pub struct MergeSender<T> {
    tx: mpsc::Sender<T>,
    counters: Arc<Counters>,
}

impl<T> Clone for MergeSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Consumer side. There is exactly one.
#[derive(Debug)]
pub struct MergeReceiver<T> {
    rx: mpsc::Receiver<T>,
    counters: Arc<Counters>,
}

/// Create a merger buffering up to `capacity` items (at least one).
pub fn merge_channel<T>(capacity: usize) -> (MergeSender<T>, MergeReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(Counters::default());
    (
        MergeSender {
            tx,
            counters: Arc::clone(&counters),
        },
        MergeReceiver { rx, counters },
    )
}

impl<T> MergeSender<T> {
    /// Enqueue `item`, waiting while the queue is full.
    pub async fn send(&self, item: T) -> Result<(), MergerClosed<T>> {
        // Count before the item becomes visible to the consumer.
        let Ok(permit) = self.tx.reserve().await else {
            return Err(MergerClosed(item));
        };
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        permit.send(item);
        Ok(())
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> MergerStatsHandle {
        MergerStatsHandle {
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T> MergeReceiver<T> {
    /// Next item in arrival order. `None` once every sender is dropped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await?;
        self.counters.dequeued.fetch_add(1, Ordering::SeqCst);
        Some(item)
    }

    /// Stop accepting new items. Already queued items can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn stats(&self) -> MergerStatsHandle {
        MergerStatsHandle {
            counters: Arc::clone(&self.counters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_producer_fifo() {
        let (tx, mut rx) = merge_channel(4);
        for i in 0..4 {
            tx.send(i).await.unwrap();
        }
        for i in 0..4 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_interleaved_producers_keep_arrival_order() {
        let (push, mut rx) = merge_channel(DEFAULT_CAPACITY);
        let timer = push.clone();

        push.send("push-1").await.unwrap();
        timer.send("timer-1").await.unwrap();
        push.send("push-2").await.unwrap();
        timer.send("timer-2").await.unwrap();

        let mut got = Vec::new();
        for _ in 0..4 {
            got.push(rx.recv().await.unwrap());
        }
        assert_eq!(got, vec!["push-1", "timer-1", "push-2", "timer-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_blocks_when_full_and_resumes() {
        let (tx, mut rx) = merge_channel(1);
        tx.send(1).await.unwrap();
        assert_eq!(tx.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(2)).await;
        assert!(blocked.is_err(), "send on a full queue must wait");

        let sender = tx.clone();
        let pending = tokio::spawn(async move { sender.send(3).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(rx.recv().await, Some(1));
        pending.await.unwrap().unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_stats_count_every_item() {
        let (tx, mut rx) = merge_channel(8);
        let stats = tx.stats();
        for i in 0..5 {
            tx.send(i).await.unwrap();
        }
        assert_eq!(stats.snapshot().pending(), 5);
        drop(tx);
        while rx.recv().await.is_some() {}
        assert_eq!(
            stats.snapshot(),
            MergerStats {
                enqueued: 5,
                dequeued: 5
            }
        );
    }

    #[tokio::test]
    async fn test_send_after_close_returns_item() {
        let (tx, mut rx) = merge_channel::<u32>(2);
        rx.close();
        let err = tx.send(7).await.unwrap_err();
        assert_eq!(err.0, 7);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_dequeued_never_exceeds_enqueued() {
        let (tx, mut rx) = merge_channel(1);
        let stats = rx.stats();
        let producer = tokio::spawn(async move {
            for i in 0..200u32 {
                tx.send(i).await.unwrap();
            }
        });
        while rx.recv().await.is_some() {
            let seen = stats.snapshot();
            assert!(seen.dequeued <= seen.enqueued, "{:?}", seen);
        }
        producer.await.unwrap();
        assert_eq!(stats.snapshot().enqueued, 200);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (tx, _rx) = merge_channel::<u8>(0);
        assert_eq!(tx.available(), 1);
    }
}
