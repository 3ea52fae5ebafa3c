//! Settings for the sync orchestrator.

use std::path::{Path, PathBuf};

use crate::catalog::DEFAULT_PAGE_SIZE;
use crate::retry::RetryPolicy;
use crate::transfer::ResumableTransfer;

/// Settings shared by every request of a run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Hub root, e.g. `https://scihub.copernicus.eu/dhus`.
    pub hub_url: String,

    /// Root of the local mirror. Each request gets a subdirectory.
    pub download_dir: PathBuf,

    /// Retry policy for catalog, manifest, and checksum requests.
    pub retry: RetryPolicy,

    /// Products requested per catalog page.
    pub page_size: u64,

    /// Transfer engine.
    pub transfer: ResumableTransfer,
}

impl SyncSettings {
    pub fn new(hub_url: impl Into<String>, download_dir: impl AsRef<Path>) -> Self {
        Self {
            hub_url: hub_url.into(),
            download_dir: download_dir.as_ref().to_path_buf(),
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            transfer: ResumableTransfer::default(),
        }
    }

    /// Set the retry policy for small requests.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the catalog page size.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the transfer engine.
    pub fn with_transfer(mut self, transfer: ResumableTransfer) -> Self {
        self.transfer = transfer;
        self
    }
}
