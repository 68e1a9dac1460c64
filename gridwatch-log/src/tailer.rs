use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{LogError, Result};

/// Record terminator.
const TERMINATOR: u8 = b'\n';

/// Block size for the backwards scan that finds the last terminator.
const SCAN_CHUNK: u64 = 8 * 1024;

/// Where a new tailer places its cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailStart {
    /// Byte 0: everything already in the log is delivered on the first poll.
    #[default]
    Beginning,
    /// Current end of file: only records appended after startup.
    End,
}

/// Incremental reader over an append-only, newline-delimited log.
///
/// The cursor is a byte offset that only ever moves forward, and only past
/// terminated lines. A final line still being written is left in place and
/// picked up by a later poll once its terminator lands.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    cursor: u64,
}

impl LogTailer {
    /// Tailer with its cursor at the start of the log.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cursor: 0,
        }
    }

    /// Tailer positioned according to `start`.
    ///
    /// With [`TailStart::End`] the cursor is placed after the last complete
    /// line currently in the file, so a half-written record at startup is
    /// still delivered once finished. A missing file starts at 0.
    pub async fn open(path: impl AsRef<Path>, start: TailStart) -> Result<Self> {
        let mut tailer = Self::new(path);

        if start == TailStart::End {
            tailer.cursor = match File::open(&tailer.path).await {
                Ok(mut file) => end_of_last_line(&mut file).await?,
                Err(e) if e.kind() == ErrorKind::NotFound => 0,
                Err(e) => return Err(e.into()),
            };
        }

        tracing::debug!(
            path = %tailer.path.display(),
            cursor = tailer.cursor,
            "log tailer opened"
        );
        Ok(tailer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset just past the last record handed out.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Return every complete, non-blank record appended since the last poll,
    /// in file order.
    ///
    /// A missing log is not an error. On any failure the cursor is left
    /// untouched so the next poll re-reads the same bytes.
    pub async fn poll(&mut self) -> Result<Vec<String>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a regular file", self.path.display()),
            )
            .into());
        }

        let len = metadata.len();
        if len < self.cursor {
            return Err(LogError::Truncated {
                cursor: self.cursor,
                len,
            });
        }
        if len == self.cursor {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.cursor)).await?;
        let mut buf = Vec::with_capacity((len - self.cursor) as usize);
        file.read_to_end(&mut buf).await?;

        let consumed = complete_len(&buf);
        let records = split_records(&buf[..consumed], self.cursor);

        self.cursor += consumed as u64;
        Ok(records)
    }
}

/// Offset just past the last terminator in `file`, found by reading
/// backwards from end of file one block at a time.
async fn end_of_last_line(file: &mut File) -> Result<u64> {
    let mut pos = file.metadata().await?.len();
    let mut buf = vec![0u8; SCAN_CHUNK as usize];

    while pos > 0 {
        let start = pos.saturating_sub(SCAN_CHUNK);
        let block = &mut buf[..(pos - start) as usize];

        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(block).await?;

        if let Some(idx) = block.iter().rposition(|&b| b == TERMINATOR) {
            return Ok(start + idx as u64 + 1);
        }
        pos = start;
    }

    Ok(0)
}

/// Length of the prefix of `buf` that ends with a terminator.
fn complete_len(buf: &[u8]) -> usize {
    buf.iter()
        .rposition(|&b| b == TERMINATOR)
        .map_or(0, |idx| idx + 1)
}

/// Split a run of terminated lines into trimmed records, dropping blank
/// lines and lines that are not UTF-8.
fn split_records(complete: &[u8], base_offset: u64) -> Vec<String> {
    let mut records = Vec::new();
    let mut offset = base_offset;

    for line in complete.split_inclusive(|&b| b == TERMINATOR) {
        match std::str::from_utf8(line) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    records.push(text.to_string());
                }
            }
            Err(e) => {
                tracing::warn!(offset, "skipping log line that is not valid UTF-8: {}", e);
            }
        }
        offset += line.len() as u64;
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn append(path: &Path, data: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(data).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let mut tailer = LogTailer::new(dir.path().join("nope.jsonl"));

        assert!(tailer.poll().await.unwrap().is_empty());
        assert_eq!(tailer.cursor(), 0);
    }

    #[tokio::test]
    async fn test_second_poll_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, b"{\"n\":1}\n{\"n\":2}\n");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll().await.unwrap().len(), 2);
        assert!(tailer.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_terminator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut tailer = LogTailer::new(&path);

        append(&path, b"{\"a\":1}");
        assert!(tailer.poll().await.unwrap().is_empty());
        assert_eq!(tailer.cursor(), 0);

        append(&path, b"\n");
        assert_eq!(tailer.poll().await.unwrap(), vec!["{\"a\":1}".to_string()]);
        assert_eq!(tailer.cursor(), 8);
    }

    #[tokio::test]
    async fn test_cursor_stops_before_trailing_fragment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, b"{\"n\":1}\n{\"n\":");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll().await.unwrap(), vec!["{\"n\":1}"]);
        assert_eq!(tailer.cursor(), 8);

        append(&path, b"2}\n");
        assert_eq!(tailer.poll().await.unwrap(), vec!["{\"n\":2}"]);
    }

    #[tokio::test]
    async fn test_records_in_append_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, b"R1\nR2\nR3\n");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll().await.unwrap(), vec!["R1", "R2", "R3"]);
    }

    #[tokio::test]
    async fn test_blank_lines_and_crlf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, b"\n  \nA\r\n\r\nB\n");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll().await.unwrap(), vec!["A", "B"]);
        assert_eq!(tailer.cursor(), 11);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, b"A\n\xff\xfe\nB\n");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll().await.unwrap(), vec!["A", "B"]);
        assert_eq!(tailer.cursor(), 7);
    }

    #[tokio::test]
    async fn test_open_at_end_skips_existing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, b"old\nhalf");

        let mut tailer = LogTailer::open(&path, TailStart::End).await.unwrap();
        assert_eq!(tailer.cursor(), 4);

        append(&path, b"\nnew\n");
        assert_eq!(tailer.poll().await.unwrap(), vec!["half", "new"]);
    }

    #[tokio::test]
    async fn test_open_at_end_scans_past_long_fragment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut data = b"A\n".repeat(10_000);
        data.extend(std::iter::repeat(b'x').take(3 * SCAN_CHUNK as usize));
        append(&path, &data);

        let mut tailer = LogTailer::open(&path, TailStart::End).await.unwrap();
        assert_eq!(tailer.cursor(), 20_000);

        append(&path, b"\n");
        let records = tailer.poll().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 3 * SCAN_CHUNK as usize);
    }

    #[tokio::test]
    async fn test_open_at_end_without_any_terminator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, &vec![b'y'; SCAN_CHUNK as usize + 17]);

        let tailer = LogTailer::open(&path, TailStart::End).await.unwrap();
        assert_eq!(tailer.cursor(), 0);
    }

    #[tokio::test]
    async fn test_open_at_end_missing_file() {
        let dir = tempdir().unwrap();
        let tailer = LogTailer::open(dir.path().join("nope"), TailStart::End)
            .await
            .unwrap();
        assert_eq!(tailer.cursor(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_cursor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, b"A\n");

        let mut tailer = LogTailer::new(&path);
        tailer.poll().await.unwrap();

        // Swap the file for a directory
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(tailer.poll().await.is_err());
        assert_eq!(tailer.cursor(), 2);
    }

    #[tokio::test]
    async fn test_truncation_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        append(&path, b"AAAA\nBBBB\n");

        let mut tailer = LogTailer::new(&path);
        tailer.poll().await.unwrap();

        std::fs::write(&path, b"C\n").unwrap();
        let err = tailer.poll().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(tailer.cursor(), 10);
    }

    #[test]
    fn test_tail_start_serde() {
        let start: TailStart = serde_json::from_str("\"end\"").unwrap();
        assert_eq!(start, TailStart::End);
        assert_eq!(TailStart::default(), TailStart::Beginning);
    }
}
