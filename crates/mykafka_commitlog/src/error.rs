//! Error types for commit log operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for commit log operations.
pub type CommitLogResult<T> = Result<T, CommitLogError>;

/// Coarse classification of a [`CommitLogError`].
///
/// This is the code half of the "code + message" pair reported to callers.
/// Layers above the engine (the broker, the CLI) switch on it instead of
/// matching individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// OS-level open/stat/resize/map/unlink failure.
    File,
    /// A file name could not be built or parsed.
    InvalidFilename,
    /// Index capacity, overflow or corruption.
    Index,
    /// Data file read/write/seek/recovery failure.
    Log,
    /// Routing failure or operation on a closed partition.
    Partition,
}

/// Errors that can occur in the commit log engine.
#[derive(Debug, Error)]
pub enum CommitLogError {
    /// An OS-level file operation failed.
    #[error("file error: {action} {}: {source}", path.display())]
    File {
        /// What was being attempted (`"open"`, `"resize"`, `"map"`, ...).
        action: &'static str,
        /// The file involved.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A file name is empty or malformed.
    #[error("invalid filename: {message}")]
    InvalidFilename {
        /// Description of the problem.
        message: String,
    },

    /// The index is full, out of bounds or corrupted.
    #[error("index error: {message}")]
    Index {
        /// Description of the problem.
        message: String,
    },

    /// The data file could not be read, written or recovered.
    #[error("log error: {message}")]
    Log {
        /// Description of the problem.
        message: String,
    },

    /// No segment serves the request, or the partition is closed.
    #[error("partition error: {message}")]
    Partition {
        /// Description of the problem.
        message: String,
    },
}

impl CommitLogError {
    /// Creates a file error for the given action and path.
    pub fn file(action: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::File {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates an invalid filename error.
    pub fn invalid_filename(message: impl Into<String>) -> Self {
        Self::InvalidFilename {
            message: message.into(),
        }
    }

    /// Creates an index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    /// Creates a log error.
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    /// Creates a partition error.
    pub fn partition(message: impl Into<String>) -> Self {
        Self::Partition {
            message: message.into(),
        }
    }

    /// Creates the error returned by any operation on a closed partition.
    pub fn partition_closed() -> Self {
        Self::partition("partition is closed")
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::File { .. } => ErrorKind::File,
            Self::InvalidFilename { .. } => ErrorKind::InvalidFilename,
            Self::Index { .. } => ErrorKind::Index,
            Self::Log { .. } => ErrorKind::Log,
            Self::Partition { .. } => ErrorKind::Partition,
        }
    }
}
