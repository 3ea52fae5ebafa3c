//! Run-wide storage exhaustion marker.

use std::path::{Path, PathBuf};

use tracing::error;

/// Records whether local storage ran out during the current run.
///
/// One token lives for a whole batch and is passed by `&mut` into every
/// transfer. Once exhausted it stays exhausted: later transfers are skipped
/// without touching the network.
#[derive(Debug, Default)]
pub struct StorageToken {
    exhausted_at: Option<PathBuf>,
}

impl StorageToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether storage has been exhausted during this run.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted_at.is_some()
    }

    /// File whose write hit the exhaustion, if any.
    pub fn exhausted_at(&self) -> Option<&Path> {
        self.exhausted_at.as_deref()
    }

    /// Mark storage as exhausted. The first marking wins.
    pub fn mark_exhausted(&mut self, path: &Path) {
        if self.exhausted_at.is_none() {
            error!(path = %path.display(), "No space left on device, skipping remaining transfers");
            self.exhausted_at = Some(path.to_path_buf());
        }
    }
}
