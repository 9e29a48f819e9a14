//! Error types for package index operations.
//!
//! Lookups through [`Client::installed`](crate::Client::installed) never
//! surface these; they exist for callers that want to know *why* an index
//! could not be read.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or querying the package index.
#[derive(Debug, Error)]
pub enum Error {
    /// The dpkg status database does not exist at the given path
    #[error("dpkg status file not found: {0}")]
    StatusFileNotFound(PathBuf),

    /// Malformed stanza in the dpkg status database
    #[error("invalid status database at line {line}: {message}")]
    Parse {
        /// Line number where the parse error occurred (1-indexed)
        line: usize,
        /// Description of the syntax error
        message: String,
    },

    /// `dpkg-query` could not be executed or exited with an error
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a parse error for the given line.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result type for package index operations.
pub type Result<T> = std::result::Result<T, Error>;
