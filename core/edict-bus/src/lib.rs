//! # Edict Bus
//!
//! In-process blackboard: receivers register interest in topics, publishers
//! broadcast string payloads, and every matching receiver is invoked
//! synchronously on the publisher's call stack.
//!
//! ## Features
//!
//! - **Three matchers**: exact topic, full-match regex, arbitrary predicate
//! - **Comparable receivers**: free functions, bound methods, keyed closures;
//!   equality drives duplicate rejection and removal
//! - **Re-entrant dispatch**: receivers may publish, subscribe or unsubscribe
//!   while being invoked
//! - **Weak targets**: a subscription never keeps its object alive
//! - **Recording**: optional ring buffer of recent publications, exportable as JSON
//!
//! ## Example
//!
//! ```rust
//! use edict_bus::{Broadcaster, Receiver};
//!
//! fn hello(payload: &str) {
//!     println!("{payload}, handler!");
//! }
//!
//! let broadcaster = Broadcaster::new();
//!
//! assert!(broadcaster.subscribe("/edict/hello", Receiver::free(hello)));
//! // Same receiver, same topic: rejected
//! assert!(!broadcaster.subscribe("/edict/hello", Receiver::free(hello)));
//!
//! broadcaster.subscribe_regex(r"(\+|-)?[0-9]+", Receiver::free(hello)).unwrap();
//! broadcaster.subscribe_predicate(|topic| topic.len() < 6, Receiver::free(hello));
//!
//! broadcaster.publish("/edict/hello", "Hello");
//! broadcaster.publish("1234", "Bye");
//! ```

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod matcher;
pub mod publication;
pub mod publisher;
pub mod receiver;
pub mod recorder;
pub mod subscriber;

// Re-exports
pub use broadcaster::{Broadcaster, TopicStats};
pub use config::BroadcasterConfig;
pub use error::{BroadcastError, Result};
pub use matcher::{TopicMatcher, TopicPattern, TopicPredicate};
pub use publication::Publication;
pub use publisher::Publisher;
pub use receiver::{BoundMethod, FreeFunction, KeyedHandler, Receiver, ReceiverKey};
pub use recorder::PublicationRecorder;
pub use subscriber::Subscriber;
