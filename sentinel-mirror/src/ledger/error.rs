//! Ledger error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or rewriting a ledger document.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Filesystem failure.
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The document exists but is not a valid ledger.
    #[error("malformed ledger {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No entry carries the requested key.
    #[error("no ledger entry with key '{key}'")]
    NotFound { key: String },
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
