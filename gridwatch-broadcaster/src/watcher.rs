//! Filesystem change notification for the event log
//!
//! Wakes the broadcast loop as soon as the log is written instead of waiting
//! out the rest of the poll interval. Polling still runs on its timer, so a
//! missed or coalesced notification only costs latency.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Notify;

use crate::error::Result;

/// Watches the directory holding the event log and signals on changes to it.
pub struct LogWatcher {
    path: PathBuf,
    wake: Arc<Notify>,
    _watcher: RecommendedWatcher,
}

impl LogWatcher {
    /// Start watching `log_path`.
    ///
    /// The parent directory is watched rather than the file so that a log
    /// created after startup is still noticed.
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let path = log_path.as_ref().to_path_buf();
        let wake = Arc::new(Notify::new());

        let signal = Arc::clone(&wake);
        let file_name = path.file_name().map(|name| name.to_os_string());

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if !(event.kind.is_modify() || event.kind.is_create()) {
                            return;
                        }
                        let ours = event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                        if ours {
                            signal.notify_one();
                        }
                    }
                    Err(e) => tracing::error!("File watch error: {}", e),
                }
            })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!("Watching {:?} for appends", path);

        Ok(Self {
            path,
            wake,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves at the next change to the log (or immediately if one
    /// happened since the last call).
    pub async fn changed(&self) {
        self.wake.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_wakes_waiter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let watcher = LogWatcher::new(&path).unwrap();

        // Give the backend a moment to install the watch
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, b"{}\n").unwrap();

        let woke = tokio::time::timeout(Duration::from_secs(5), watcher.changed()).await;
        assert!(woke.is_ok(), "watcher should signal on log creation");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("events.jsonl");
        assert!(LogWatcher::new(&path).is_err());
    }
}
