use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// Append-only writer producing one compact JSON object per line.
///
/// Each record goes out in a single `write_all` of `json + "\n"`, so a reader
/// can observe a line without its terminator but never a terminator without
/// its content.
pub struct EventLogWriter {
    path: PathBuf,
    file: File,
    written: u64,
}

impl EventLogWriter {
    /// Open (or create) the log in append mode, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::debug!(path = %path.display(), "event log opened for append");

        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    /// Serialize `record` and append it as one terminated line.
    pub async fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        self.file.write_all(&line).await?;
        self.file.flush().await?;

        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this writer.
    pub fn written(&self) -> u64 {
        self.written
    }
}
