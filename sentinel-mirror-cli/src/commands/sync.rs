//! Sync command - authenticate, then mirror every request row.

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use sentinel_mirror::client::ReqwestArchiveClient;
use sentinel_mirror::logging;
use sentinel_mirror::sync::{BatchReport, DiscoveryOutcome, SyncOrchestrator};
use sentinel_mirror::transfer::{ProgressCallback, StorageToken};
use tracing::{error, info};

use super::common::{format_histogram, load_config, load_requests};
use crate::error::CliError;

/// Arguments for the sync command.
pub struct SyncArgs {
    pub config: Option<PathBuf>,
    pub requests: Option<PathBuf>,
    pub no_progress: bool,
}

/// Run the sync command.
///
/// Only configuration, logging, authentication, and request file problems
/// fail the command. Failures inside a request are logged and reported in
/// the summary.
pub fn run(args: SyncArgs) -> Result<(), CliError> {
    let (config_path, config) = load_config(args.config.as_deref())?;
    let _guard = logging::init(&config.logging)?;
    info!(
        version = sentinel_mirror::VERSION,
        config = %config_path.display(),
        hub = %config.hub.url,
        "Starting sync"
    );

    let client = ReqwestArchiveClient::new(config.hub.credentials.clone(), config.hub.timeout)?
        .with_stream_timeout(config.hub.stream_timeout);
    if let Err(e) = client.authenticate(&config.hub.url) {
        error!(error = %e, "Authentication failed");
        return Err(e.into());
    }
    info!(user = %config.hub.credentials.username, "Authenticated with the hub");

    let (requests_path, requests) = load_requests(args.requests.as_deref())?;
    info!(
        requests = requests.len(),
        file = %requests_path.display(),
        "Loaded request file"
    );

    let mut orchestrator = SyncOrchestrator::new(client, config.sync_settings());
    let bar = if args.no_progress {
        None
    } else {
        let bar = transfer_bar();
        orchestrator = orchestrator.with_progress(progress_callback(bar.clone()));
        Some(bar)
    };

    let mut token = StorageToken::new();
    let report = orchestrator.run_batch(&requests, &mut token);

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    info!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "Sync finished"
    );
    print_summary(&report, &token);
    Ok(())
}

fn transfer_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}

/// Feed transfer progress into `bar`. A report of zero bytes starts a new file.
fn progress_callback(bar: ProgressBar) -> ProgressCallback {
    Box::new(move |label, done, total| {
        if done == 0 {
            bar.reset();
            bar.set_length(total.unwrap_or(0));
            bar.set_message(label.to_string());
        }
        bar.set_position(done);
    })
}

fn print_summary(report: &BatchReport, token: &StorageToken) {
    println!();
    println!("Sync summary");
    println!("============");

    for request in &report.completed {
        let discovery = match &request.discovery {
            DiscoveryOutcome::Completed {
                total,
                recorded,
                dropped,
            } => format!(
                "{} in catalog, {} new, {} dropped by filters",
                total, recorded, dropped
            ),
            DiscoveryOutcome::Aborted { reason } => format!("discovery aborted: {}", reason),
        };
        println!("  {} ({})", request.request_id, request.platform);
        println!("    resumed:   {}", request.resumed);
        println!("    discovery: {}", discovery);
        println!("    ledger:    {}", format_histogram(&request.histogram));
    }

    for (id, reason) in &report.failed {
        println!("  {} failed: {}", id, reason);
    }

    if let Some(path) = token.exhausted_at() {
        println!();
        println!("Storage full while writing {}", path.display());
        if !report.skipped.is_empty() {
            println!("Not started: {}", report.skipped.join(", "));
        }
    }
}
