//! Hand-off queue between the broker task and the ingestion worker.
//!
//! The producer side runs inside the MQTT event loop and must never wait on
//! storage, so [`BridgeQueue::push`] is synchronous and never blocks. The queue
//! is bounded: when it is full the oldest payload is evicted to make room for
//! the newest one (drop-oldest).

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use tokio::sync::Notify;

// ---

/// Bounded single-consumer FIFO with a drop-oldest overflow policy.
#[derive(Debug)]
pub struct BridgeQueue<T> {
    // ---
    ring: ArrayQueue<T>,
    notify: Notify,
    dropped: AtomicU64,
}

/// What happened to a pushed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Queued,
    /// The item was queued and the oldest queued item was discarded.
    EvictedOldest,
}

impl<T> BridgeQueue<T> {
    // ---
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: ArrayQueue::new(capacity.max(1)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an item without blocking.
    pub fn push(&self, item: T) -> Pushed {
        // ---
        let outcome = match self.ring.force_push(item) {
            None => Pushed::Queued,
            Some(_evicted) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Pushed::EvictedOldest
            }
        };

        self.notify.notify_one();
        outcome
    }

    /// Wait for the next item.
    ///
    /// Cancel safe: dropping the future never loses an item.
    pub async fn pop(&self) -> T {
        // ---
        loop {
            if let Some(item) = self.ring.pop() {
                return item;
            }
            // A push between `pop` and here leaves a stored permit, so this
            // wakes immediately instead of missing the item.
            self.notify.notified().await;
        }
    }

    /// Take the next item if one is queued.
    pub fn try_pop(&self) -> Option<T> {
        self.ring.pop()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Total items evicted by the overflow policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
