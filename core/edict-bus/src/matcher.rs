//! Topic matching strategies
//!
//! Every matcher boils down to `predicate(topic) -> bool`. Exact matchers are
//! kept apart by the broadcaster only so they can be looked up by key.

use crate::error::{BroadcastError, Result};
use regex::Regex;
use regex_syntax::hir::{Hir, Look};
use std::fmt;
use std::sync::Arc;

/// Caller-supplied topic predicate
pub type TopicPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Regular expression that must match the whole topic
#[derive(Clone)]
pub struct TopicPattern {
    source: String,
    anchored: Regex,
}

impl TopicPattern {
    /// Compile `pattern` for full-topic matching
    ///
    /// Anchors are added to the parsed syntax tree, not to the source text,
    /// so flags and verbose-mode comments in `pattern` cannot leak into them.
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern).map_err(|e| BroadcastError::invalid_pattern(pattern, e))?;

        let hir = regex_syntax::Parser::new()
            .parse(pattern)
            .map_err(|e| BroadcastError::invalid_pattern(pattern, regex::Error::Syntax(e.to_string())))?;
        let anchored = Hir::concat(vec![Hir::look(Look::Start), hir, Hir::look(Look::End)]);
        let anchored = Regex::new(&anchored.to_string()).map_err(|e| BroadcastError::invalid_pattern(pattern, e))?;

        Ok(Self {
            source: pattern.to_string(),
            anchored,
        })
    }

    /// True if the entire topic matches
    #[inline]
    pub fn is_full_match(&self, topic: &str) -> bool {
        self.anchored.is_match(topic)
    }

    /// Pattern source as given by the caller
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TopicPattern").field(&self.source).finish()
    }
}

/// How a subscription selects topics
#[derive(Clone)]
pub enum TopicMatcher {
    /// Literal topic equality
    Exact(String),
    /// Full regular-expression match
    Regex(TopicPattern),
    /// Arbitrary predicate over the topic
    Predicate(TopicPredicate),
}

impl TopicMatcher {
    pub fn exact(topic: impl Into<String>) -> Self {
        TopicMatcher::Exact(topic.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        TopicPattern::new(pattern).map(TopicMatcher::Regex)
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        TopicMatcher::Predicate(Arc::new(predicate))
    }

    /// Evaluate the matcher against a published topic
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicMatcher::Exact(expected) => expected == topic,
            TopicMatcher::Regex(pattern) => pattern.is_full_match(topic),
            TopicMatcher::Predicate(predicate) => predicate(topic),
        }
    }
}

impl fmt::Debug for TopicMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicMatcher::Exact(topic) => f.debug_tuple("Exact").field(topic).finish(),
            TopicMatcher::Regex(pattern) => f.debug_tuple("Regex").field(&pattern.source).finish(),
            TopicMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
