//! Live event broadcaster for the GridWatch dashboard
//!
//! This crate tails the classified event log and fans every new event out to
//! all connected websocket subscribers. Each subscriber gets events in the
//! order they were appended; a subscriber that disconnects or falls behind is
//! dropped without affecting anyone else.
//!
//! # Features
//!
//! - Websocket endpoint (`/ws`), one text frame per event log line
//! - Health endpoint (`/health`) with the live subscriber count
//! - Thread-safe subscriber registry with per-subscriber bounded queues
//! - Fixed-interval polling, optionally woken early by filesystem events
//! - Malformed log lines skipped, transient read errors retried
//!
//! # Components
//!
//! - [`SubscriberRegistry`] - live set with `register`/`unregister`/`broadcast`
//! - [`EventBroadcaster`] - poll → deliver → sleep loop
//! - [`LogWatcher`] - change notification on the event log
//! - [`StreamServer`] - axum server owning the websocket endpoint
//!
//! # Example Usage
//!
//! ```no_run
//! use gridwatch_broadcaster::{
//!     BroadcasterConfig, EventBroadcaster, StreamServer, SubscriberRegistry,
//! };
//! use gridwatch_log::LogTailer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SubscriberRegistry::new();
//!
//!     // Accept dashboard connections
//!     let server = StreamServer::new("0.0.0.0:8000".parse()?, registry.clone());
//!     server.start().await?;
//!
//!     // Stream the event log until Ctrl+C
//!     let tailer = LogTailer::new("/tmp/events.jsonl");
//!     let mut broadcaster =
//!         EventBroadcaster::new(tailer, registry, BroadcasterConfig::default());
//!     broadcaster
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod error;
pub mod registry;
pub mod server;
pub mod watcher;

// Re-exports
pub use broadcaster::{BroadcasterConfig, BroadcasterState, EventBroadcaster, TickReport};
pub use error::{BroadcasterError, Result};
pub use registry::{BroadcastReport, Delivery, SubscriberHandle, SubscriberId, SubscriberRegistry};
pub use server::{router, StreamServer, DEFAULT_SUBSCRIBER_BUFFER};
pub use watcher::LogWatcher;
