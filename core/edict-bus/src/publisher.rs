//! Publisher utilities and helpers

use crate::broadcaster::Broadcaster;
use std::borrow::Cow;
use std::sync::Arc;

/// Helper for publishing through a shared broadcaster
///
/// A namespaced publisher prefixes every topic with `namespace/`.
#[derive(Clone)]
pub struct Publisher {
    broadcaster: Arc<Broadcaster>,
    namespace: Option<String>,
}

impl Publisher {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster,
            namespace: None,
        }
    }

    /// Publisher whose topics live under `namespace`
    pub fn namespaced(broadcaster: Arc<Broadcaster>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into().trim_end_matches('/').to_string();
        Self {
            broadcaster,
            namespace: Some(namespace),
        }
    }

    /// Full topic a publish on `topic` goes to
    pub fn topic_for<'a>(&self, topic: &'a str) -> Cow<'a, str> {
        match &self.namespace {
            Some(ns) => Cow::Owned(format!("{ns}/{}", topic.trim_start_matches('/'))),
            None => Cow::Borrowed(topic),
        }
    }

    pub fn publish(&self, topic: &str, payload: &str) -> bool {
        self.broadcaster.publish(&self.topic_for(topic), payload)
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }
}
