//! Free functions, regex and predicate subscriptions, and bound methods

use anyhow::Result;
use edict_bus::{Broadcaster, Receiver};
use std::sync::Arc;

fn hello_handler(message: &str) {
    println!("{message}, Handler!");
}

fn printer(message: &str) {
    println!("printer: {message}");
}

struct DirectPrinter {
    name: String,
}

impl DirectPrinter {
    fn print(&self, message: &str) {
        println!("DirectPrinter(\"{}\"): {message}", self.name);
    }
}

fn main() -> Result<()> {
    edict_demos::init_tracing();

    let broadcaster = Broadcaster::new();

    broadcaster.subscribe("/edict/hello", Receiver::free(hello_handler));
    broadcaster.subscribe("/edict/hello", Receiver::free(printer));
    broadcaster.subscribe_regex(r"(\+|-)?[[:digit:]]+", Receiver::free(hello_handler))?;
    broadcaster.subscribe_predicate(|topic| topic.len() < 6, Receiver::free(printer));

    let dot_matrix = Arc::new(DirectPrinter {
        name: "DotMatrix".to_string(),
    });
    broadcaster.subscribe_method("/edict/hello", &dot_matrix, DirectPrinter::print);

    // Subscribing through a weak handle is equivalent to the shared one
    let weak = Arc::downgrade(&dot_matrix);
    let duplicate = Receiver::bound_weak(&weak, DirectPrinter::print)?;
    if !broadcaster.subscribe("/edict/hello", duplicate) {
        tracing::info!("Weak handle resolves to the same receiver; duplicate rejected");
    }

    broadcaster.publish("/edict/hello", "Hello");
    broadcaster.publish("1234", "Bye");

    for (topic, stats) in broadcaster.stats() {
        tracing::info!(%topic, published = stats.published, delivered = stats.delivered, "Topic stats");
    }

    Ok(())
}
