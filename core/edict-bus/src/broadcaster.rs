//! Subscription registry and synchronous dispatch

use crate::config::BroadcasterConfig;
use crate::error::Result;
use crate::matcher::{TopicMatcher, TopicPattern};
use crate::publication::Publication;
use crate::receiver::Receiver;
use crate::recorder::PublicationRecorder;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
struct PredicateSubscription {
    matcher: TopicMatcher,
    receiver: Receiver,
}

/// Per-topic counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub published: u64,
    pub delivered: u64,
    /// Bound receivers skipped because their target was dropped
    pub stale: u64,
}

#[derive(Default)]
struct Tally {
    delivered: u64,
    stale: u64,
}

/// Blackboard broadcaster
///
/// Holds two registries:
/// - exact subscriptions, keyed by topic, each topic's receivers in insertion order
/// - predicate subscriptions (regex or closure), in insertion order
///
/// `publish` first runs every matching predicate subscription, then every exact
/// subscription of the topic. Each phase works on a snapshot taken under a
/// short lock, so receivers may publish, subscribe or unsubscribe re-entrantly.
/// Share it between collaborators with `Arc<Broadcaster>`.
pub struct Broadcaster {
    exact: DashMap<String, Vec<Receiver>>,

    predicates: RwLock<Vec<PredicateSubscription>>,

    config: BroadcasterConfig,

    /// Recent publications (optional)
    recorder: Option<Arc<PublicationRecorder>>,

    stats: DashMap<String, TopicStats>,
}

impl Broadcaster {
    /// Create a broadcaster with default configuration
    pub fn new() -> Self {
        Self::with_config(BroadcasterConfig::default())
    }

    /// Create broadcaster with recording enabled
    pub fn with_recording(capacity: usize) -> Self {
        Self::with_config(BroadcasterConfig::default().with_recording(capacity))
    }

    pub fn with_config(config: BroadcasterConfig) -> Self {
        let recorder = config
            .record_capacity
            .map(|capacity| Arc::new(PublicationRecorder::new(capacity)));

        Self {
            exact: DashMap::new(),
            predicates: RwLock::new(Vec::new()),
            config,
            recorder,
            stats: DashMap::new(),
        }
    }

    /// Subscribe `receiver` to an exact topic
    ///
    /// Returns `false` (and warns) if an equal receiver is already registered
    /// for `topic`, or if `topic` is empty.
    pub fn subscribe(&self, topic: &str, receiver: Receiver) -> bool {
        if topic.is_empty() {
            warn!("Refusing subscription to empty topic");
            return false;
        }

        let mut receivers = self.exact.entry(topic.to_string()).or_default();
        if receivers.contains(&receiver) {
            drop(receivers);
            if self.config.warn_on_duplicate {
                warn!(topic, ?receiver, "Attempting to double subscribe");
            }
            return false;
        }

        receivers.push(receiver);
        debug!(topic, subscribers = receivers.len(), "Subscribed");
        true
    }

    /// Subscribe a method of `object` to an exact topic
    pub fn subscribe_method<T, M>(&self, topic: &str, object: &Arc<T>, method: M) -> bool
    where
        T: Send + Sync + 'static,
        M: Fn(&T, &str) + Copy + Send + Sync + 'static,
    {
        self.subscribe(topic, Receiver::bound(object, method))
    }

    /// Subscribe `receiver` to every topic the predicate accepts
    ///
    /// Never deduplicates; registering the same pair twice delivers twice.
    pub fn subscribe_predicate<F>(&self, predicate: F, receiver: Receiver) -> bool
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.push_predicate(TopicMatcher::predicate(predicate), receiver)
    }

    /// Subscribe `receiver` to every topic fully matching `pattern`
    ///
    /// The pattern is compiled here; a malformed pattern is an error now,
    /// never at publish time.
    pub fn subscribe_regex(&self, pattern: &str, receiver: Receiver) -> Result<bool> {
        let pattern = TopicPattern::new(pattern)?;
        Ok(self.push_predicate(TopicMatcher::Regex(pattern), receiver))
    }

    /// Subscribe with an already-built matcher
    pub fn subscribe_matcher(&self, matcher: TopicMatcher, receiver: Receiver) -> bool {
        match matcher {
            TopicMatcher::Exact(topic) => self.subscribe(&topic, receiver),
            other => self.push_predicate(other, receiver),
        }
    }

    fn push_predicate(&self, matcher: TopicMatcher, receiver: Receiver) -> bool {
        debug!(?matcher, ?receiver, "Subscribed by predicate");
        self.predicates
            .write()
            .push(PredicateSubscription { matcher, receiver });
        true
    }

    /// Remove `receiver` from an exact topic
    ///
    /// Returns whether anything was removed.
    pub fn unsubscribe(&self, topic: &str, receiver: &Receiver) -> bool {
        // Removed receivers are dropped only after the shard lock is released:
        // their captures may call back into the broadcaster when dropped.
        let removed = match self.exact.get_mut(topic) {
            Some(mut receivers) => {
                let (removed, kept) = std::mem::take(&mut *receivers)
                    .into_iter()
                    .partition::<Vec<_>, _>(|r| r == receiver);
                *receivers = kept;
                removed
            }
            None => Vec::new(),
        };

        self.exact.remove_if(topic, |_, receivers| receivers.is_empty());

        if removed.is_empty() {
            return false;
        }
        debug!(topic, ?receiver, "Unsubscribed");
        true
    }

    /// Remove every registration of `receiver` made with `pattern`
    pub fn unsubscribe_regex(&self, pattern: &str, receiver: &Receiver) -> bool {
        let removed = self.remove_predicates(|sub| {
            matches!(&sub.matcher, TopicMatcher::Regex(p) if p.as_str() == pattern) && &sub.receiver == receiver
        });
        !removed.is_empty()
    }

    /// Remove every predicate or regex registration of `receiver`
    ///
    /// Returns the number of registrations removed.
    pub fn unsubscribe_predicates(&self, receiver: &Receiver) -> usize {
        self.remove_predicates(|sub| &sub.receiver == receiver).len()
    }

    /// Detach matching predicate subscriptions; the caller drops them unlocked
    fn remove_predicates<F>(&self, mut remove: F) -> Vec<PredicateSubscription>
    where
        F: FnMut(&PredicateSubscription) -> bool,
    {
        let mut predicates = self.predicates.write();
        let (removed, kept) = std::mem::take(&mut *predicates)
            .into_iter()
            .partition(|sub| remove(sub));
        *predicates = kept;
        removed
    }

    /// Deliver `payload` to every receiver matching `topic`
    ///
    /// Predicate subscriptions run first, then exact subscriptions, each in
    /// registration order. A panicking receiver aborts the rest of the
    /// delivery and the panic reaches the caller. Always returns `true`.
    pub fn publish(&self, topic: &str, payload: &str) -> bool {
        if let Some(recorder) = &self.recorder {
            recorder.record(Publication::new(topic, payload));
        }

        let mut tally = Tally::default();

        let predicates = self.predicates.read().clone();
        for sub in &predicates {
            if sub.matcher.matches(topic) {
                Self::deliver(&sub.receiver, topic, payload, &mut tally);
            }
        }

        let exact = self
            .exact
            .get(topic)
            .map(|receivers| receivers.value().clone())
            .unwrap_or_default();
        for receiver in &exact {
            Self::deliver(receiver, topic, payload, &mut tally);
        }

        // Topics nobody listens to are not tracked, so per-entity topics
        // cannot grow the map without bound
        if self.config.track_stats && tally.delivered + tally.stale > 0 {
            let mut stats = self.stats.entry(topic.to_string()).or_default();
            stats.published += 1;
            stats.delivered += tally.delivered;
            stats.stale += tally.stale;
        }

        true
    }

    fn deliver(receiver: &Receiver, topic: &str, payload: &str, tally: &mut Tally) {
        match receiver.invoke(payload) {
            Ok(()) => tally.delivered += 1,
            Err(e) => {
                tally.stale += 1;
                warn!(topic, error = %e, "Skipping receiver");
            }
        }
    }

    /// Number of exact subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.exact.get(topic).map(|r| r.len()).unwrap_or(0)
    }

    /// Number of predicate and regex subscriptions
    pub fn predicate_count(&self) -> usize {
        self.predicates.read().len()
    }

    /// Topics with at least one exact subscription, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.exact.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.predicates.read().is_empty()
    }

    /// Drop every subscription without notifying anyone
    pub fn clear(&self) {
        let topics: Vec<String> = self.exact.iter().map(|e| e.key().clone()).collect();
        let removed: Vec<_> = topics.iter().filter_map(|topic| self.exact.remove(topic)).collect();
        let predicates = std::mem::take(&mut *self.predicates.write());

        debug!(topics = removed.len(), predicates = predicates.len(), "Cleared all subscriptions");
    }

    /// Forget all per-topic statistics
    pub fn reset_stats(&self) {
        self.stats.clear();
    }

    /// Get per-topic statistics
    pub fn stats(&self) -> Vec<(String, TopicStats)> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn topic_stats(&self, topic: &str) -> Option<TopicStats> {
        self.stats.get(topic).map(|s| s.clone())
    }

    /// Get the publication recorder, if recording is enabled
    pub fn recorder(&self) -> Option<Arc<PublicationRecorder>> {
        self.recorder.clone()
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Shared log of (receiver name, payload) pairs
    type Log = Arc<Mutex<Vec<(String, String)>>>;

    fn logger(log: &Log, name: &str) -> Receiver {
        let log = log.clone();
        let tag = name.to_string();
        Receiver::keyed(name, move |payload| {
            log.lock().push((tag.clone(), payload.to_string()));
        })
    }

    fn names(log: &Log) -> Vec<String> {
        log.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    #[test]
    fn test_exact_publish_in_registration_order() {
        let bus = Broadcaster::new();
        let log = Log::default();

        assert!(bus.subscribe("a/b", logger(&log, "first")));
        assert!(bus.subscribe("a/b", logger(&log, "second")));
        assert!(bus.subscribe("a/c", logger(&log, "other")));

        assert!(bus.publish("a/b", "hi"));

        assert_eq!(
            *log.lock(),
            vec![
                ("first".to_string(), "hi".to_string()),
                ("second".to_string(), "hi".to_string()),
            ]
        );
    }

    #[test]
    fn test_double_subscribe_is_rejected() {
        let bus = Broadcaster::new();
        let log = Log::default();

        assert!(bus.subscribe("a/b", logger(&log, "r1")));
        assert!(!bus.subscribe("a/b", logger(&log, "r1")));
        assert_eq!(bus.subscriber_count("a/b"), 1);

        bus.publish("a/b", "x");
        assert_eq!(names(&log), vec!["r1"]);
    }

    #[test]
    fn test_same_receiver_on_two_topics() {
        let bus = Broadcaster::new();
        let log = Log::default();

        assert!(bus.subscribe("one", logger(&log, "r")));
        assert!(bus.subscribe("two", logger(&log, "r")));
        assert_eq!(bus.topics(), vec!["one", "two"]);
    }

    #[test]
    fn test_empty_topic_is_rejected() {
        let bus = Broadcaster::new();
        assert!(!bus.subscribe("", Receiver::keyed("r", |_| {})));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_predicates_run_before_exact() {
        let bus = Broadcaster::new();
        let log = Log::default();

        bus.subscribe("topic", logger(&log, "exact"));
        bus.subscribe_predicate(|_| true, logger(&log, "any"));
        bus.subscribe_regex("to.*", logger(&log, "regex")).unwrap();

        bus.publish("topic", "p");
        assert_eq!(names(&log), vec!["any", "regex", "exact"]);
    }

    #[test]
    fn test_predicates_are_not_deduplicated() {
        let bus = Broadcaster::new();
        let log = Log::default();

        assert!(bus.subscribe_predicate(|_| true, logger(&log, "twice")));
        assert!(bus.subscribe_predicate(|_| true, logger(&log, "twice")));
        assert_eq!(bus.predicate_count(), 2);

        bus.publish("anything", "p");
        assert_eq!(names(&log), vec!["twice", "twice"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = Broadcaster::new();
        let log = Log::default();
        let r1 = logger(&log, "r1");

        bus.subscribe("a/b", r1.clone());
        assert!(bus.unsubscribe("a/b", &r1));
        assert!(!bus.unsubscribe("a/b", &r1));
        assert!(!bus.unsubscribe("never", &r1));
        assert!(bus.topics().is_empty());

        bus.publish("a/b", "x");
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_unsubscribe_keeps_other_receivers() {
        let bus = Broadcaster::new();
        let log = Log::default();

        bus.subscribe("t", logger(&log, "keep"));
        bus.subscribe("t", logger(&log, "drop"));
        assert!(bus.unsubscribe("t", &logger(&log, "drop")));

        bus.publish("t", "x");
        assert_eq!(names(&log), vec!["keep"]);
    }

    #[test]
    fn test_unsubscribe_regex_and_predicates() {
        let bus = Broadcaster::new();
        let log = Log::default();
        let r = logger(&log, "r");

        bus.subscribe_regex("[0-9]+", r.clone()).unwrap();
        bus.subscribe_regex("[0-9]+", r.clone()).unwrap();
        bus.subscribe_regex("[a-z]+", r.clone()).unwrap();
        bus.subscribe_predicate(|_| true, r.clone());

        assert!(bus.unsubscribe_regex("[0-9]+", &r));
        assert_eq!(bus.predicate_count(), 2);
        assert!(!bus.unsubscribe_regex("[0-9]+", &r));

        assert_eq!(bus.unsubscribe_predicates(&r), 2);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_invalid_regex_fails_at_subscribe() {
        let bus = Broadcaster::new();
        assert!(bus.subscribe_regex("(", Receiver::keyed("r", |_| {})).is_err());
        assert_eq!(bus.predicate_count(), 0);
    }

    #[test]
    fn test_subscribe_matcher_routes_exact() {
        let bus = Broadcaster::new();
        let log = Log::default();

        assert!(bus.subscribe_matcher(TopicMatcher::exact("t"), logger(&log, "r")));
        assert!(!bus.subscribe_matcher(TopicMatcher::exact("t"), logger(&log, "r")));
        assert!(bus.subscribe_matcher(TopicMatcher::regex("t+").unwrap(), logger(&log, "r")));

        assert_eq!(bus.subscriber_count("t"), 1);
        assert_eq!(bus.predicate_count(), 1);
    }

    struct Counter {
        hits: Mutex<u32>,
    }

    impl Counter {
        fn hit(&self, _payload: &str) {
            *self.hits.lock() += 1;
        }
    }

    #[test]
    fn test_stale_bound_receiver_is_skipped_and_counted() {
        let bus = Broadcaster::new();
        let log = Log::default();
        let counter = Arc::new(Counter { hits: Mutex::new(0) });

        assert!(bus.subscribe_method("t", &counter, Counter::hit));
        bus.subscribe("t", logger(&log, "after"));

        bus.publish("t", "1");
        assert_eq!(*counter.hits.lock(), 1);

        drop(counter);
        bus.publish("t", "2");

        assert_eq!(names(&log), vec!["after", "after"]);
        let stats = bus.topic_stats("t").unwrap();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.stale, 1);
    }

    #[test]
    fn test_stats_disabled() {
        let bus = Broadcaster::with_config(BroadcasterConfig::default().with_stats(false));
        bus.publish("t", "x");
        assert!(bus.stats().is_empty());
    }

    #[test]
    fn test_unmatched_topics_leave_no_stats() {
        let bus = Broadcaster::new();
        for i in 0..1_000 {
            bus.publish(&format!("order/{i}"), "x");
        }
        assert!(bus.stats().is_empty());

        bus.subscribe("order/7", Receiver::keyed("r", |_| {}));
        bus.publish("order/7", "x");
        bus.publish("order/8", "x");
        assert_eq!(bus.stats().len(), 1);
        assert_eq!(bus.topic_stats("order/7").unwrap().published, 1);

        bus.reset_stats();
        assert!(bus.stats().is_empty());
    }

    /// Unsubscribes `topic` from the broadcaster when dropped
    struct DetachOnDrop {
        bus: std::sync::Weak<Broadcaster>,
        topic: &'static str,
    }

    impl Drop for DetachOnDrop {
        fn drop(&mut self) {
            if let Some(bus) = self.bus.upgrade() {
                bus.unsubscribe(self.topic, &Receiver::keyed("neighbour", |_| {}));
                bus.unsubscribe_predicates(&Receiver::keyed("neighbour", |_| {}));
            }
        }
    }

    fn owning_receiver(bus: &Arc<Broadcaster>, topic: &'static str) -> Receiver {
        let guard = DetachOnDrop {
            bus: Arc::downgrade(bus),
            topic,
        };
        Receiver::keyed("owner", move |_| {
            let _owned = &guard;
        })
    }

    #[test]
    fn test_removed_receivers_are_dropped_outside_locks() {
        let bus = Arc::new(Broadcaster::new());

        bus.subscribe("t", owning_receiver(&bus, "t"));
        bus.subscribe("t", Receiver::keyed("neighbour", |_| {}));
        assert!(bus.unsubscribe("t", &Receiver::keyed("owner", |_| {})));
        assert!(bus.is_empty());

        bus.subscribe_predicate(|_| true, owning_receiver(&bus, "t"));
        bus.subscribe_predicate(|_| true, Receiver::keyed("neighbour", |_| {}));
        assert_eq!(bus.unsubscribe_predicates(&Receiver::keyed("owner", |_| {})), 1);
        assert!(bus.is_empty());

        bus.subscribe("t", owning_receiver(&bus, "t"));
        bus.subscribe_predicate(|_| true, owning_receiver(&bus, "t"));
        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn test_recording() {
        let bus = Broadcaster::with_recording(8);
        bus.publish("colour", "red");
        bus.publish("colour", "blue");

        let recorder = bus.recorder().unwrap();
        let payloads: Vec<String> = recorder.publications().into_iter().map(|p| p.payload).collect();
        assert_eq!(payloads, vec!["red", "blue"]);
        assert!(Broadcaster::new().recorder().is_none());
    }

    #[test]
    fn test_clear() {
        let bus = Broadcaster::new();
        bus.subscribe("t", Receiver::keyed("r", |_| {}));
        bus.subscribe_predicate(|_| true, Receiver::keyed("r", |_| {}));
        assert!(!bus.is_empty());

        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn test_broadcaster_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Broadcaster>();
    }

    #[test]
    fn test_publish_from_many_threads() {
        let bus = Arc::new(Broadcaster::new());
        let hits = Arc::new(Mutex::new(0u32));
        let h = hits.clone();
        bus.subscribe("t", Receiver::keyed("count", move |_| *h.lock() += 1));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        bus.publish("t", "x");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*hits.lock(), 100);
        assert_eq!(bus.topic_stats("t").unwrap().published, 100);
    }
}
