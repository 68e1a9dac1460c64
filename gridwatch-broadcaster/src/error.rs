use thiserror::Error;

#[derive(Error, Debug)]
pub enum BroadcasterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event log error: {0}")]
    Log(#[from] gridwatch_log::LogError),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Event log unreadable after {attempts} consecutive attempts: {source}")]
    TailerGaveUp {
        attempts: u32,
        #[source]
        source: gridwatch_log::LogError,
    },

    #[error("Server not started")]
    NotStarted,

    #[error("Server already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, BroadcasterError>;
