//! Helpers shared by the sync and status commands.

use std::path::{Path, PathBuf};

use sentinel_mirror::batch::{read_requests, SyncRequest};
use sentinel_mirror::config::{default_config_path, default_requests_path, ConfigFile};
use sentinel_mirror::ledger::StatusHistogram;

use crate::error::CliError;

/// Load the configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<(PathBuf, ConfigFile), CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let config = ConfigFile::load(&path)?;
    Ok((path, config))
}

/// Read the request file from `path`, or from the default location.
pub fn load_requests(path: Option<&Path>) -> Result<(PathBuf, Vec<SyncRequest>), CliError> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_requests_path);
    let requests = read_requests(&path)?;
    Ok((path, requests))
}

/// One-line rendering of a status histogram, e.g. `checksum_ok=3 corrupted_archive=1`.
pub fn format_histogram(histogram: &StatusHistogram) -> String {
    if histogram.total() == 0 {
        return "empty".to_string();
    }
    histogram
        .iter()
        .map(|(status, count)| format!("{}={}", status, count))
        .collect::<Vec<_>>()
        .join(" ")
}
