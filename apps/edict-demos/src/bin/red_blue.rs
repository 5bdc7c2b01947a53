//! Two collaborators sharing one broadcaster, with re-entrant publishing
//!
//! Usage: `red-blue [config.toml]`

use anyhow::{Context, Result};
use edict_bus::{Broadcaster, BroadcasterConfig, Subscriber};
use std::sync::Arc;

struct Red {
    broadcaster: Arc<Broadcaster>,
}

impl Red {
    fn attach(broadcaster: &Arc<Broadcaster>) -> Arc<Self> {
        let red = Arc::new(Self {
            broadcaster: broadcaster.clone(),
        });
        broadcaster.subscribe_method("colour", &red, Red::print_colour);
        broadcaster.subscribe_method("rainbow", &red, Red::hello);
        red
    }

    fn hello(&self, message: &str) {
        println!("(Red) Rainbow says: {message}");
    }

    fn print_colour(&self, colour: &str) {
        if colour == "red" {
            println!("(Red) Red thinks {colour} is awesome!");
        } else {
            println!("(Red) Red thinks {colour} is not a real colour!");
            self.broadcaster.publish("redder", "");
        }
    }
}

struct Blue;

impl Blue {
    fn attach(broadcaster: &Arc<Broadcaster>) -> Arc<Self> {
        let blue = Arc::new(Self);
        broadcaster.subscribe_method("colour", &blue, Blue::print_colour);
        broadcaster.subscribe_method("rainbow", &blue, Blue::hello);
        let palindrome = |topic: &str| topic.chars().eq(topic.chars().rev());
        broadcaster.subscribe_predicate(palindrome, edict_bus::Receiver::bound(&blue, Blue::bonus));
        blue
    }

    fn hello(&self, message: &str) {
        println!("(Blue) Rainbow says: {message}");
    }

    fn print_colour(&self, colour: &str) {
        if colour == "blue" {
            println!("(Blue) Blue thinks {colour} is awesome!");
        } else {
            println!("(Blue) Blue thinks {colour} is not a real colour!");
        }
    }

    fn bonus(&self, _text: &str) {
        println!("(Blue) Palindrome topic! :)");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    edict_demos::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => BroadcasterConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => BroadcasterConfig::default().with_recording(64),
    };
    let broadcaster = Arc::new(Broadcaster::with_config(config));

    // Watches every topic from an async task, off the publisher's stack
    let watcher = Subscriber::pattern(&broadcaster, ".+")?;
    let watch = tokio::spawn(async move {
        let mut seen = 0usize;
        while let Some(payload) = watcher.recv_async().await {
            seen += 1;
            tracing::debug!(%payload, "Watcher received");
            if payload == "done" {
                break;
            }
        }
        seen
    });

    let _red = Red::attach(&broadcaster);
    let _blue = Blue::attach(&broadcaster);

    broadcaster.publish("rainbow", "rise and shine!");
    broadcaster.publish("colour", "red");
    broadcaster.publish("colour", "blue");
    broadcaster.publish("racecar", "done");

    let watched = watch.await?;
    tracing::info!(watched, "Watcher finished");

    if let Some(recorder) = broadcaster.recorder() {
        println!("--- {} recorded publications ---", recorder.len());
        for publication in recorder.publications() {
            println!("{} {:>8} {:?}", publication.timestamp_ns, publication.topic, publication.payload);
        }
    }

    Ok(())
}
