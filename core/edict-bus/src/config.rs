//! Broadcaster configuration
//!
//! ```toml
//! warn_on_duplicate = true
//! track_stats = true
//! record_capacity = 1024
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Emit a warning when a receiver is subscribed twice to the same topic
    pub warn_on_duplicate: bool,

    /// Keep per-topic publish/delivery counters
    pub track_stats: bool,

    /// Record publications into a ring buffer of this size
    pub record_capacity: Option<usize>,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            warn_on_duplicate: true,
            track_stats: true,
            record_capacity: None,
        }
    }
}

impl BroadcasterConfig {
    /// Parse from TOML text; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Enable publication recording
    pub fn with_recording(mut self, capacity: usize) -> Self {
        self.record_capacity = Some(capacity);
        self
    }

    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.track_stats = enabled;
        self
    }

    pub fn with_duplicate_warnings(mut self, enabled: bool) -> Self {
        self.warn_on_duplicate = enabled;
        self
    }
}
