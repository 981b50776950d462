//! Error types for reprise-core

use std::fmt;

use thiserror::Error;

/// Result type alias using reprise-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in reprise-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or bookmark not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A stored record failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote blob store error
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Remote(error) => error.is_recoverable(),
            _ => false,
        }
    }
}

/// Failures reported by a remote blob adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No credentials configured; remote sync is never attempted.
    #[error("Remote sync is not configured")]
    NotConfigured,

    /// Credentials were rejected.
    #[error("Remote authentication failed: {0}")]
    Auth(String),

    /// Transport failure or unexpected server response.
    #[error("Remote network error: {0}")]
    Network(String),

    /// The remote host asked us to slow down.
    #[error("Remote rate limited: {0}")]
    RateLimited(String),

    /// The precondition token was stale; the blob changed since it was read.
    #[error("Remote blob changed since it was read")]
    Conflict,

    /// The remote document could not be parsed.
    #[error("Remote document is invalid: {0}")]
    Validation(String),
}

/// Stable classification of [`RemoteError`] used for retry and notification decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotConfigured,
    Auth,
    Network,
    RateLimited,
    Conflict,
    Validation,
}

impl RemoteError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured => ErrorKind::NotConfigured,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Network(_) => ErrorKind::Network,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Conflict => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Transient failures are retried within a cycle and again on the next tick.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

impl ErrorKind {
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::Conflict)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Auth => "auth",
            Self::Network => "network",
            Self::RateLimited => "rate_limited",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_remote_errors_are_recoverable() {
        assert!(RemoteError::Network("reset".into()).is_recoverable());
        assert!(RemoteError::RateLimited("429".into()).is_recoverable());
        assert!(RemoteError::Conflict.is_recoverable());
    }

    #[test]
    fn terminal_remote_errors_are_not_recoverable() {
        assert!(!RemoteError::NotConfigured.is_recoverable());
        assert!(!RemoteError::Auth("401".into()).is_recoverable());
        assert!(!RemoteError::Validation("bad json".into()).is_recoverable());
    }

    #[test]
    fn core_error_delegates_recoverability() {
        assert!(Error::from(RemoteError::Conflict).is_recoverable());
        assert!(!Error::InvalidInput("nope".into()).is_recoverable());
    }
}
