//! Error types for broker operations.

use mykafka_commitlog::CommitLogError;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur in the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Error raised by a partition or by file access.
    #[error(transparent)]
    CommitLog(#[from] CommitLogError),

    /// Topic or partition name is invalid, or already in use.
    #[error("topic error: {message}")]
    Topic {
        /// Description of the problem.
        message: String,
    },

    /// No partition is registered under the requested key.
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was missing.
        message: String,
    },

    /// A partition config record is malformed.
    #[error("config error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

impl BrokerError {
    /// Creates a file error for the given action and path.
    pub fn file(action: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::CommitLog(CommitLogError::file(action, path, source))
    }

    /// Creates a topic error.
    pub fn topic(message: impl Into<String>) -> Self {
        Self::Topic {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a [`BrokerError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mykafka_commitlog::ErrorKind;

    #[test]
    fn commit_log_errors_pass_through() {
        let err = BrokerError::from(CommitLogError::partition_closed());
        assert_eq!(err.to_string(), "partition error: partition is closed");

        let err = BrokerError::file("open", "/x.cfg", io::Error::from(io::ErrorKind::NotFound));
        match err {
            BrokerError::CommitLog(inner) => assert_eq!(inner.kind(), ErrorKind::File),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn broker_errors_display() {
        assert_eq!(BrokerError::topic("bad").to_string(), "topic error: bad");
        assert!(BrokerError::not_found("events-0").is_not_found());
        assert!(!BrokerError::config("short").is_not_found());
    }
}
