//! Error types for Google OAuth and Drive operations.

use std::fmt;
use thiserror::Error;

/// The category of a Drive error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveErrorCode {
    /// Credentials missing, denied, expired or rejected.
    AuthenticationFailed,
    /// Authenticated but not allowed to touch the file.
    AuthorizationFailed,
    /// Connection failure, timeout, DNS and the like.
    NetworkError,
    /// The API answered with a 5xx or another unexpected status.
    ServerError,
    /// The response body could not be understood.
    InvalidResponse,
    /// The file does not exist (404).
    NotFound,
    /// Missing or invalid configuration (credentials, ports, paths).
    ConfigurationError,
    /// Unexpected local state.
    InternalError,
}

impl DriveErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for DriveErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from the OAuth or Drive layer.
#[derive(Debug, Error)]
pub struct DriveError {
    code: DriveErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DriveError {
    pub fn new(code: DriveErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(DriveErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(DriveErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(DriveErrorCode::NetworkError, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(DriveErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(DriveErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(DriveErrorCode::NotFound, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(DriveErrorCode::ConfigurationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(DriveErrorCode::InternalError, message)
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> DriveErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the user has to sign in (again).
    pub fn is_auth(&self) -> bool {
        self.code == DriveErrorCode::AuthenticationFailed
    }

    /// Maps a reqwest transport error to a network error.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("{}: request timeout", context)
        } else if err.is_connect() {
            format!("{}: connection failed: {}", context, err)
        } else {
            format!("{}: {}", context, err)
        };
        Self::network(message).with_source(err)
    }
}

impl fmt::Display for DriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result type for OAuth and Drive operations.
pub type DriveResult<T> = Result<T, DriveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_names() {
        assert_eq!(
            DriveErrorCode::AuthenticationFailed.as_str(),
            "authentication_failed"
        );
        assert_eq!(DriveErrorCode::NotFound.to_string(), "not_found");
    }

    #[test]
    fn error_display_includes_code_and_message() {
        let err = DriveError::server("API error (500): boom");
        assert_eq!(err.to_string(), "server_error: API error (500): boom");
        assert_eq!(err.message(), "API error (500): boom");
        assert!(!err.is_auth());
    }

    #[test]
    fn auth_errors_are_flagged() {
        assert!(DriveError::authentication("token expired").is_auth());
        assert!(!DriveError::authorization("forbidden").is_auth());
    }

    #[test]
    fn error_keeps_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = DriveError::internal("failed to persist").with_source(io_err);
        assert!(err.source().is_some());
    }
}
