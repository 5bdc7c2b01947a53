//! Error types for the broadcaster

use crate::receiver::ReceiverKey;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BroadcastError>;

#[derive(Debug, Error)]
pub enum BroadcastError {
    /// A regex topic pattern failed to compile
    #[error("invalid topic pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("topic `{0}` cannot be subscribed to")]
    InvalidTopic(String),

    /// A bound receiver was built from a target that no longer exists
    #[error("cannot bind receiver: target object has already been dropped")]
    InvalidReceiver,

    /// A bound receiver outlived its target object
    #[error("receiver {0:?} is stale: target object was dropped while still subscribed")]
    StaleReceiver(ReceiverKey),

    #[error("failed to parse broadcaster config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to (de)serialize publications: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BroadcastError {
    pub(crate) fn invalid_pattern(pattern: &str, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        }
    }

    /// True for errors caused by a receiver whose target is gone
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleReceiver(_))
    }
}
