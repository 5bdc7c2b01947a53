//! Channel-backed subscriber
//!
//! Bridges synchronous dispatch to a consumer that pulls payloads on its own
//! schedule, possibly from another thread or an async task. The subscriber
//! registers a keyed receiver that forwards into a `flume` channel and removes
//! it again when dropped.

use crate::broadcaster::Broadcaster;
use crate::error::{BroadcastError, Result};
use crate::receiver::Receiver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

enum Route {
    Topic(String),
    Pattern(String),
}

/// Pull-style subscription to a topic or a regex pattern
pub struct Subscriber {
    broadcaster: Arc<Broadcaster>,
    route: Route,
    receiver: Receiver,
    rx: flume::Receiver<String>,
    dropped: Arc<AtomicU64>,
}

impl Subscriber {
    /// Subscribe to an exact topic with an unbounded queue
    pub fn topic(broadcaster: &Arc<Broadcaster>, topic: &str) -> Result<Self> {
        Self::topic_bounded(broadcaster, topic, None)
    }

    /// Subscribe to an exact topic; with `Some(capacity)`, payloads arriving
    /// while the queue is full are dropped and counted
    pub fn topic_bounded(broadcaster: &Arc<Broadcaster>, topic: &str, capacity: Option<usize>) -> Result<Self> {
        let (receiver, rx, dropped) = Self::forwarder(topic, capacity);
        if !broadcaster.subscribe(topic, receiver.clone()) {
            return Err(BroadcastError::InvalidTopic(topic.to_string()));
        }

        Ok(Self {
            broadcaster: broadcaster.clone(),
            route: Route::Topic(topic.to_string()),
            receiver,
            rx,
            dropped,
        })
    }

    /// Subscribe to every topic fully matching `pattern`
    pub fn pattern(broadcaster: &Arc<Broadcaster>, pattern: &str) -> Result<Self> {
        let (receiver, rx, dropped) = Self::forwarder(pattern, None);
        broadcaster.subscribe_regex(pattern, receiver.clone())?;

        Ok(Self {
            broadcaster: broadcaster.clone(),
            route: Route::Pattern(pattern.to_string()),
            receiver,
            rx,
            dropped,
        })
    }

    fn forwarder(label: &str, capacity: Option<usize>) -> (Receiver, flume::Receiver<String>, Arc<AtomicU64>) {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let (tx, rx) = match capacity {
            Some(capacity) => flume::bounded(capacity),
            None => flume::unbounded(),
        };
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = dropped.clone();
        let label = label.to_string();
        let key = format!("subscriber#{}", NEXT_ID.fetch_add(1, Ordering::Relaxed));

        let receiver = Receiver::keyed(key, move |payload| {
            // Never block the publisher
            match tx.try_send(payload.to_string()) {
                Ok(()) => {}
                Err(flume::TrySendError::Full(_)) => {
                    counter.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(route = %label, "Subscriber queue full, dropping payload");
                }
                Err(flume::TrySendError::Disconnected(_)) => {}
            }
        });

        (receiver, rx, dropped)
    }

    /// Block until the next payload arrives
    pub fn recv(&self) -> Option<String> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Wait for the next payload without blocking the executor
    pub async fn recv_async(&self) -> Option<String> {
        self.rx.recv_async().await.ok()
    }

    /// Try to receive without blocking
    pub fn try_recv(&self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now
    pub fn drain(&self) -> Vec<String> {
        self.rx.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Payloads lost because the bounded queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        match &self.route {
            Route::Topic(topic) => {
                self.broadcaster.unsubscribe(topic, &self.receiver);
            }
            Route::Pattern(pattern) => {
                self.broadcaster.unsubscribe_regex(pattern, &self.receiver);
            }
        }
    }
}
