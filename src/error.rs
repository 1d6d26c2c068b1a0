use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Request id {0} is already in flight")]
    DuplicateRequestId(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Client shutting down")]
    Shutdown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for connect/read/write failures not caused by cancellation.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
