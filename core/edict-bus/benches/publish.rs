use criterion::{black_box, criterion_group, criterion_main, Criterion};
use edict_bus::{Broadcaster, BroadcasterConfig, Receiver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Sink {
    bytes: AtomicU64,
}

impl Sink {
    fn consume(&self, payload: &str) {
        self.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
    }
}

fn bench_publish(c: &mut Criterion) {
    let sink = Arc::new(Sink {
        bytes: AtomicU64::new(0),
    });

    let exact = Broadcaster::with_config(BroadcasterConfig::default().with_stats(false));
    for i in 0..16 {
        exact.subscribe(&format!("topic/{i}"), Receiver::bound(&sink, Sink::consume));
    }
    c.bench_function("publish_exact_16_topics", |b| {
        b.iter(|| exact.publish(black_box("topic/7"), black_box("payload")))
    });

    let patterns = Broadcaster::with_config(BroadcasterConfig::default().with_stats(false));
    for i in 0..16 {
        patterns
            .subscribe_regex(&format!("topic/{i}[0-9]*"), Receiver::bound(&sink, Sink::consume))
            .unwrap();
    }
    c.bench_function("publish_regex_16_patterns", |b| {
        b.iter(|| patterns.publish(black_box("topic/7"), black_box("payload")))
    });

    let tracked = Broadcaster::new();
    tracked.subscribe("topic", Receiver::bound(&sink, Sink::consume));
    c.bench_function("publish_with_stats", |b| {
        b.iter(|| tracked.publish(black_box("topic"), black_box("payload")))
    });
}

criterion_group!(benches, bench_publish);
criterion_main!(benches);
