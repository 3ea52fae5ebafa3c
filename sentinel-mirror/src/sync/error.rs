//! Sync error types.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::selector::SelectorError;

/// Errors that abort a sync request.
///
/// Network failures never show up here: they are retried and then recorded
/// as a non-final status in the ledger.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The query names no supported platform.
    #[error("query '{query}' names no supported platform (platformname:Sentinel-1 or platformname:Sentinel-2)")]
    UnknownPlatform { query: String },

    /// A tile or band filter does not compile.
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// The ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
