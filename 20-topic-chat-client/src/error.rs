use std::io;

use thiserror::Error;

/// Failures the client reports to the operator instead of exiting.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A local argument was missing or invalid; nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// A reply or delivery frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error status.
    #[error("{0}")]
    Server(String),

    /// The connection is gone.
    #[error("connection lost: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData => Self::Protocol(err.to_string()),
            _ => Self::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}
