//! Client error types.

use std::fmt;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Google sign-in or Drive error.
    Drive(String),
    /// Local task store error.
    Store(String),
    /// Invalid task edit (unknown id, empty text).
    Task(String),
    /// IO error.
    Io(std::io::Error),
    /// The command needs a signed-in session.
    AuthRequired(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Drive(msg) => write!(f, "drive error: {}", msg),
            Self::Store(msg) => write!(f, "local store error: {}", msg),
            Self::Task(msg) => write!(f, "{}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::AuthRequired(msg) => write!(f, "authentication required: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<planner_drive::DriveError> for ClientError {
    fn from(err: planner_drive::DriveError) -> Self {
        Self::Drive(err.to_string())
    }
}

impl From<planner_core::StoreError> for ClientError {
    fn from(err: planner_core::StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<planner_core::TaskError> for ClientError {
    fn from(err: planner_core::TaskError) -> Self {
        Self::Task(err.to_string())
    }
}
