//! Append-only, newline-delimited JSON logs for GridWatch
//!
//! Two halves of the same file format:
//!
//! - [`EventLogWriter`] appends one serialized record per line.
//! - [`LogTailer`] keeps a byte cursor into a log and, on each
//!   [`poll`](LogTailer::poll), returns the complete lines appended since
//!   the previous call.
//!
//! The tailer never consumes a line until its terminator has been written,
//! never re-delivers a line, and treats a log that does not exist yet as
//! empty.
//!
//! # Example Usage
//!
//! ```no_run
//! use gridwatch_log::{EventLogWriter, LogTailer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut writer = EventLogWriter::open("/tmp/events.jsonl").await?;
//!     writer.append(&serde_json::json!({"electricity": 25.0})).await?;
//!
//!     let mut tailer = LogTailer::new("/tmp/events.jsonl");
//!     for record in tailer.poll().await? {
//!         println!("{}", record);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod tailer;
pub mod writer;

// Re-exports
pub use error::{LogError, Result};
pub use tailer::{LogTailer, TailStart};
pub use writer::EventLogWriter;
