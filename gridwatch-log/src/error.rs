use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The file shrank below the read cursor; the log is no longer append-only.
    #[error("Log truncated: cursor at byte {cursor} but file is {len} bytes")]
    Truncated { cursor: u64, len: u64 },
}

impl LogError {
    /// Whether retrying on the next poll can never succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LogError::Truncated { .. })
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
