//! Publication records

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single `publish` call as seen by the recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    /// Unique publication ID
    pub id: Uuid,

    /// Wall-clock time of the publish call (nanoseconds since the epoch)
    pub timestamp_ns: i64,

    pub topic: String,

    pub payload: String,
}

impl Publication {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        // Monotonic ids; no RNG on the publish path
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

        Self {
            id: Uuid::from_u128(seq as u128),
            timestamp_ns: chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Same publication with an explicit timestamp
    pub fn at(mut self, timestamp_ns: i64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }
}
