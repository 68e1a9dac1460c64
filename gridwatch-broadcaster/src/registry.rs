use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

/// Process-unique subscriber identifier
pub type SubscriberId = u64;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome of handing one message to one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the connection to send
    Delivered,
    /// The connection side has gone away
    Closed,
    /// The subscriber's queue is full; it is not keeping up
    Lagging,
}

impl Delivery {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Delivery::Delivered)
    }
}

/// Sending half of one subscriber's bounded message queue.
///
/// The connection task owns the matching receiver and drains it into the
/// socket. Dropping every handle closes the queue.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    sender: mpsc::Sender<String>,
}

impl SubscriberHandle {
    /// Create a handle plus the receiver its connection should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, sender }, receiver)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Non-blocking hand-off of `message` to this subscriber.
    pub fn deliver(&self, message: &str) -> Delivery {
        match self.sender.try_send(message.to_string()) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
            Err(TrySendError::Full(_)) => Delivery::Lagging,
        }
    }
}

/// Result of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
}

/// Thread-safe set of live subscribers
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<Mutex<HashMap<SubscriberId, SubscriberHandle>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber to the live set
    pub async fn register(&self, handle: SubscriberHandle) -> SubscriberId {
        let id = handle.id();
        let mut subscribers = self.subscribers.lock().await;
        subscribers.insert(id, handle);
        tracing::info!(subscriber = id, "Subscriber registered. Total: {}", subscribers.len());
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        let removed = subscribers.remove(&id).is_some();
        if removed {
            tracing::info!(subscriber = id, "Subscriber unregistered. Remaining: {}", subscribers.len());
        }
        removed
    }

    /// Deliver `message` to every live subscriber, evicting the ones that
    /// fail.
    ///
    /// Delivery works on a snapshot taken under the lock, so subscribers may
    /// come and go while it runs. A subscriber removed before the snapshot
    /// never sees the message. Failures never reach the caller.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let snapshot: Vec<SubscriberHandle> = {
            let subscribers = self.subscribers.lock().await;
            subscribers.values().cloned().collect()
        };

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        for handle in &snapshot {
            match handle.deliver(message) {
                Delivery::Delivered => report.delivered += 1,
                outcome => {
                    tracing::warn!(subscriber = handle.id(), ?outcome, "Failed to deliver to subscriber");
                    failed.push(handle.id());
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.lock().await;
            for id in failed {
                if subscribers.remove(&id).is_some() {
                    report.evicted += 1;
                }
            }
            tracing::info!(
                "Removed {} dead subscriber(s). Remaining: {}",
                report.evicted,
                subscribers.len()
            );
        }

        report
    }

    /// Current number of live subscribers
    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().await.contains_key(&id)
    }
}
