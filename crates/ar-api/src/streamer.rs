//! Per-problem in-memory result fan-out.
//!
//! `publish` snapshots the current subscriber set and delivers without
//! blocking: a subscriber whose bounded channel is full has that delivery
//! dropped (drop-newest), so one slow client never starves the others.
//! Closing a subscription removes it from the set and prunes empty entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

struct SubscriberSlot {
    id: u64,
    tx: mpsc::Sender<serde_json::Value>,
}

struct StreamerInner {
    subscribers: DashMap<String, Vec<SubscriberSlot>>,
    next_id: AtomicU64,
    capacity: usize,
}

#[derive(Clone)]
pub struct ResultStreamer {
    inner: Arc<StreamerInner>,
}

impl ResultStreamer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(StreamerInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a subscriber for one problem's events.
    pub fn subscribe(&self, problem_id: &str) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner
            .subscribers
            .entry(problem_id.to_string())
            .or_default()
            .push(SubscriberSlot { id, tx });
        debug!(problem_id = %problem_id, subscriber = id, "subscriber added");

        Subscription {
            inner: self.inner.clone(),
            problem_id: problem_id.to_string(),
            id,
            rx,
        }
    }

    /// Deliver a payload to every current subscriber of `problem_id`.
    /// Returns how many subscribers received it. Publishing with no
    /// subscribers is a no-op.
    pub fn publish(&self, problem_id: &str, payload: &serde_json::Value) -> usize {
        let senders: Vec<(u64, mpsc::Sender<serde_json::Value>)> = match self
            .inner
            .subscribers
            .get(problem_id)
        {
            Some(slots) => slots.iter().map(|slot| (slot.id, slot.tx.clone())).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, tx) in senders {
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(problem_id = %problem_id, subscriber = id, "channel full, dropping delivery");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // subscription already closed; its Drop prunes the set
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, problem_id: &str) -> usize {
        self.inner
            .subscribers
            .get(problem_id)
            .map(|slots| slots.len())
            .unwrap_or(0)
    }
}

impl Default for ResultStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// One subscriber's handle; payloads arrive in publication order. Dropping
/// it removes the subscriber from the fan-out set.
pub struct Subscription {
    inner: Arc<StreamerInner>,
    problem_id: String,
    id: u64,
    rx: mpsc::Receiver<serde_json::Value>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        self.rx.recv().await
    }

    pub fn problem_id(&self) -> &str {
        &self.problem_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(mut slots) = self.inner.subscribers.get_mut(&self.problem_id) {
            slots.retain(|slot| slot.id != self.id);
            let empty = slots.is_empty();
            drop(slots);
            if empty {
                self.inner
                    .subscribers
                    .remove_if(&self.problem_id, |_, slots| slots.is_empty());
            }
        }
        debug!(problem_id = %self.problem_id, subscriber = self.id, "subscriber removed");
    }
}
