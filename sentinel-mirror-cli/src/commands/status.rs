//! Status command - show what each request's ledger holds.

use std::path::{Path, PathBuf};

use sentinel_mirror::batch::SyncRequest;
use sentinel_mirror::ledger::ProductLedger;
use sentinel_mirror::sync::RequestLayout;

use super::common::{format_histogram, load_config, load_requests};
use crate::error::CliError;

/// Arguments for the status command.
pub struct StatusArgs {
    pub config: Option<PathBuf>,
    pub requests: Option<PathBuf>,
}

/// Run the status command.
pub fn run(args: StatusArgs) -> Result<(), CliError> {
    let (_, config) = load_config(args.config.as_deref())?;
    let (_, requests) = load_requests(args.requests.as_deref())?;

    println!("Mirror: {}", config.download.directory.display());
    for line in status_lines(&config.download.directory, &requests) {
        println!("{}", line);
    }
    Ok(())
}

/// One line per request. Unreadable ledgers are reported inline.
fn status_lines(download_dir: &Path, requests: &[SyncRequest]) -> Vec<String> {
    requests
        .iter()
        .map(|request| {
            let Some(platform) = request.platform() else {
                return format!("  {}: unknown platform in query", request.id);
            };

            let layout = RequestLayout::new(download_dir, &request.id, platform);
            let ledger = ProductLedger::new(layout.ledger_path());
            if !ledger.path().exists() {
                return format!("  {} ({}): not synced yet", request.id, platform);
            }

            let summary = ledger.status_histogram().and_then(|histogram| {
                let seen = ledger.products_seen_last_run()?;
                Ok((histogram, seen))
            });
            match summary {
                Ok((histogram, seen)) => format!(
                    "  {} ({}): {} [catalog total last run: {}]",
                    request.id,
                    platform,
                    format_histogram(&histogram),
                    seen
                ),
                Err(e) => format!("  {} ({}): {}", request.id, platform, e),
            }
        })
        .collect()
}
