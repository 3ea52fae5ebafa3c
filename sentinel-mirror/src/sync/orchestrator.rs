//! Per-request synchronization.
//!
//! A request runs in two phases. The resume phase retries every ledger
//! entry that is not yet verified. The discovery phase browses the catalog,
//! processes the products the ledger has never seen, and records the
//! catalog total.
//!
//! Status transitions:
//!
//! ```text
//! missing_checksum  -> checksum_ok | corrupted_archive | missing_checksum
//! missing_manifest  -> checksum_ok | corrupted_archive | missing_manifest
//! corrupted_archive -> checksum_ok | corrupted_archive
//! corrupted_file    -> checksum_ok | corrupted_file
//! checksum_ok       (final)
//! ```

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, error, info, warn};

use super::error::{SyncError, SyncResult};
use super::layout::RequestLayout;
use super::report::{BatchReport, DiscoveryOutcome, RequestReport};
use super::settings::SyncSettings;
use crate::batch::{Platform, SyncRequest};
use crate::catalog::{self, CatalogQuery};
use crate::client::ArchiveClient;
use crate::ledger::{
    PartField, PartLedger, Product, ProductField, ProductLedger, ProductPart, Status,
};
use crate::manifest::parse_manifest;
use crate::odata;
use crate::retry::{Sleeper, ThreadSleeper};
use crate::selector::PartSelector;
use crate::transfer::{ProgressCallback, StorageToken, TransferOutcome};

/// Everything a request needs while it runs.
struct RequestContext<'a> {
    request: &'a SyncRequest,
    platform: Platform,
    layout: RequestLayout,
    ledger: ProductLedger,
    /// Present when products are retrieved file by file.
    selector: Option<PartSelector>,
}

enum PartsOutcome {
    Status(Status),
    /// The filters keep the whole product; it is not tracked.
    NotNarrowed,
}

/// Drives sync requests against one hub.
pub struct SyncOrchestrator<C, S = ThreadSleeper> {
    client: C,
    sleeper: S,
    settings: SyncSettings,
    progress: Option<ProgressCallback>,
}

impl<C: ArchiveClient> SyncOrchestrator<C, ThreadSleeper> {
    /// Creates an orchestrator that waits between retries with real sleeps.
    pub fn new(client: C, settings: SyncSettings) -> Self {
        Self {
            client,
            sleeper: ThreadSleeper,
            settings,
            progress: None,
        }
    }
}

impl<C: ArchiveClient, S: Sleeper> SyncOrchestrator<C, S> {
    /// Replace the sleeper used between retries.
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> SyncOrchestrator<C, T> {
        SyncOrchestrator {
            client: self.client,
            sleeper,
            settings: self.settings,
            progress: self.progress,
        }
    }

    /// Report transfer progress to `progress`.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run every request in order.
    ///
    /// A failing request is logged and the batch moves on. Once storage is
    /// exhausted the remaining requests are not started.
    pub fn run_batch(&self, requests: &[SyncRequest], token: &mut StorageToken) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, request) in requests.iter().enumerate() {
            if token.is_exhausted() {
                warn!(
                    remaining = requests.len() - index,
                    "Storage is full, skipping the remaining requests"
                );
                report
                    .skipped
                    .extend(requests[index..].iter().map(|r| r.id.clone()));
                break;
            }

            info!(request = %request.id, query = %request.query, "Processing request");
            match self.run_request(request, token) {
                Ok(request_report) => report.completed.push(request_report),
                Err(e) => {
                    error!(request = %request.id, error = %e, "Request failed, moving on");
                    report.failed.push((request.id.clone(), e.to_string()));
                }
            }
        }

        report
    }

    /// Run the resume and discovery phases of one request.
    pub fn run_request(
        &self,
        request: &SyncRequest,
        token: &mut StorageToken,
    ) -> SyncResult<RequestReport> {
        let platform = request.platform().ok_or_else(|| SyncError::UnknownPlatform {
            query: request.query.clone(),
        })?;
        let selector = if request.is_multi_part() {
            Some(PartSelector::new(&request.tiles, &request.bands)?)
        } else {
            None
        };

        let layout = RequestLayout::new(&self.settings.download_dir, &request.id, platform);
        let ledger = ProductLedger::new(layout.ledger_path());
        ledger.ensure_exists()?;

        let ctx = RequestContext {
            request,
            platform,
            layout,
            ledger,
            selector,
        };

        // Products known before this run. Products dropped during the resume
        // phase are not rediscovered in the same run.
        let known: HashSet<String> = ctx.ledger.uuids()?.into_iter().collect();

        let resumed = self.resume(&ctx, token)?;
        let discovery = self.discover(&ctx, &known, token)?;
        let histogram = ctx.ledger.status_histogram()?;

        info!(
            request = %request.id,
            resumed,
            products = histogram.total(),
            verified = histogram.count(Status::ChecksumOk),
            "Request finished"
        );

        Ok(RequestReport {
            request_id: request.id.clone(),
            platform,
            resumed,
            discovery,
            histogram,
        })
    }

    fn resume(&self, ctx: &RequestContext<'_>, token: &mut StorageToken) -> SyncResult<usize> {
        let pending = ctx.ledger.entries_with_status_not(Status::ChecksumOk)?;
        if pending.is_empty() {
            info!("All past products are verified");
            return Ok(0);
        }

        info!(count = pending.len(), "Retrying past products");
        for original in &pending {
            let mut product = original.clone();
            debug!(title = %product.title, status = %product.status, "Resuming product");

            if !self.process_product(ctx, &mut product, token)? {
                ctx.ledger.remove(&product.uuid)?;
                continue;
            }
            if product.checksum != original.checksum {
                ctx.ledger
                    .update(&product.uuid, ProductField::Checksum(product.checksum.clone()))?;
            }
            ctx.ledger
                .update(&product.uuid, ProductField::Status(product.status))?;
        }

        Ok(pending.len())
    }

    fn discover(
        &self,
        ctx: &RequestContext<'_>,
        known: &HashSet<String>,
        token: &mut StorageToken,
    ) -> SyncResult<DiscoveryOutcome> {
        let query = CatalogQuery::new(
            &self.settings.hub_url,
            &ctx.request.query,
            self.settings.page_size,
        );
        let retry = &self.settings.retry;

        let total = match query.fetch_total(&self.client, retry, &self.sleeper) {
            Ok(total) => total,
            Err(e) => {
                warn!(error = %e, "Could not count catalog products, the hub may be unavailable");
                return Ok(DiscoveryOutcome::Aborted {
                    reason: e.to_string(),
                });
            }
        };
        info!(
            total,
            last_run = ctx.ledger.products_seen_last_run()?,
            "Catalog products for the request"
        );

        let entries = match query.fetch_all(&self.client, retry, &self.sleeper, total) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not browse the catalog, skipping discovery");
                return Ok(DiscoveryOutcome::Aborted {
                    reason: e.to_string(),
                });
            }
        };

        let entries = catalog::cloud_filter(entries, ctx.platform, ctx.request.max_cloud);
        let fresh = catalog::new_products(entries, known);
        if fresh.is_empty() {
            info!("No new products");
        } else {
            info!(count = fresh.len(), "New products published");
        }

        let mut recorded = 0;
        let mut dropped = 0;
        for entry in fresh {
            let mut product = Product {
                title: entry.title,
                uuid: entry.uuid,
                download_uri: entry.download_uri,
                checksum: String::new(),
                status: if ctx.selector.is_some() {
                    Status::MissingManifest
                } else {
                    Status::MissingChecksum
                },
                year: entry.year,
            };

            if self.process_product(ctx, &mut product, token)? {
                ctx.ledger.upsert(product)?;
                recorded += 1;
            } else {
                dropped += 1;
            }
        }

        ctx.ledger.set_products_seen_last_run(total)?;
        Ok(DiscoveryOutcome::Completed {
            total,
            recorded,
            dropped,
        })
    }

    /// Move `product` as far along as possible. Returns `false` when the
    /// product must not be tracked.
    fn process_product(
        &self,
        ctx: &RequestContext<'_>,
        product: &mut Product,
        token: &mut StorageToken,
    ) -> SyncResult<bool> {
        match (&ctx.selector, product.status) {
            (Some(selector), Status::MissingManifest) => {
                match self.retrieve_from_manifest(ctx, selector, product, token)? {
                    PartsOutcome::NotNarrowed => return Ok(false),
                    PartsOutcome::Status(status) => product.status = status,
                }
            }
            (Some(_), Status::CorruptedArchive) => {
                product.status = self.retry_parts(ctx, product, token)?;
            }
            (None, Status::MissingChecksum | Status::CorruptedArchive | Status::CorruptedFile) => {
                self.retrieve_archive(ctx, product, token);
            }
            (_, status) => {
                warn!(
                    title = %product.title,
                    status = %status,
                    "Unexpected product status, scheduling a full retry"
                );
                product.status = Status::CorruptedArchive;
            }
        }
        Ok(true)
    }

    fn retrieve_archive(
        &self,
        ctx: &RequestContext<'_>,
        product: &mut Product,
        token: &mut StorageToken,
    ) {
        let failure = match product.status {
            Status::CorruptedFile => Status::CorruptedFile,
            _ => Status::CorruptedArchive,
        };

        if product.status == Status::MissingChecksum || product.checksum.trim().is_empty() {
            match self.fetch_checksum(&product.download_uri) {
                Some(checksum) => product.checksum = checksum,
                // Status unchanged, the checksum is fetched again next run
                None => return,
            }
        }

        let dest = ctx.layout.archive_path(product.year, &product.title);
        product.status =
            self.transfer_verified(&product.download_uri, &dest, &product.checksum, token, failure);
    }

    fn fetch_checksum(&self, download_uri: &str) -> Option<String> {
        let uri = odata::checksum_uri(download_uri);
        match self
            .settings
            .retry
            .attempt(&self.sleeper, "checksum", || self.client.fetch_text(&uri))
        {
            Ok(body) if !body.trim().is_empty() => Some(body.trim().to_string()),
            Ok(_) => {
                warn!(uri = %uri, "Hub returned an empty checksum");
                None
            }
            Err(e) => {
                warn!(uri = %uri, error = %e, "Could not retrieve the checksum");
                None
            }
        }
    }

    fn retrieve_from_manifest(
        &self,
        ctx: &RequestContext<'_>,
        selector: &PartSelector,
        product: &Product,
        token: &mut StorageToken,
    ) -> SyncResult<PartsOutcome> {
        if token.is_exhausted() {
            debug!(title = %product.title, "Storage exhausted, manifest not fetched");
            return Ok(PartsOutcome::Status(Status::MissingManifest));
        }

        let uri = odata::manifest_uri(&product.download_uri, &product.title);
        let xml = match self
            .settings
            .retry
            .attempt(&self.sleeper, "manifest", || self.client.fetch_text(&uri))
        {
            Ok(xml) => xml,
            Err(e) => {
                warn!(title = %product.title, error = %e, "Could not retrieve the manifest");
                return Ok(PartsOutcome::Status(Status::MissingManifest));
            }
        };
        let parts = match parse_manifest(&xml) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(title = %product.title, error = %e, "Unreadable manifest");
                return Ok(PartsOutcome::Status(Status::MissingManifest));
            }
        };

        let selection = selector.select(&parts);
        if !selection.narrowed {
            info!(
                title = %product.title,
                "No file matches the tile and band filters, product not tracked"
            );
            return Ok(PartsOutcome::NotNarrowed);
        }

        let part_ledger = PartLedger::new(ctx.layout.part_ledger_path(&product.title));
        part_ledger.ensure_exists()?;

        let count = selection.parts.len();
        info!(title = %product.title, files = count, of = parts.len(), "Retrieving product files");
        for (index, part) in selection.parts.into_iter().enumerate() {
            let uri = odata::part_uri(&product.download_uri, &product.title, &part.relative_path);
            let dest = ctx
                .layout
                .part_path(product.year, &product.title, &part.relative_path);
            debug!(file = index + 1, count, path = %dest.display(), "Retrieving product file");

            let status =
                self.transfer_verified(&uri, &dest, &part.checksum, token, Status::CorruptedFile);
            part_ledger.upsert(ProductPart {
                relative_path: part.relative_path,
                download_uri: uri,
                checksum: part.checksum,
                status,
            })?;
        }

        Ok(PartsOutcome::Status(part_ledger.status_histogram()?.rollup()))
    }

    fn retry_parts(
        &self,
        ctx: &RequestContext<'_>,
        product: &Product,
        token: &mut StorageToken,
    ) -> SyncResult<Status> {
        let part_ledger = PartLedger::new(ctx.layout.part_ledger_path(&product.title));
        let pending = part_ledger.entries_with_status_not(Status::ChecksumOk)?;
        debug!(title = %product.title, files = pending.len(), "Retrying product files");

        for part in pending {
            let dest = ctx
                .layout
                .part_path(product.year, &product.title, &part.relative_path);
            let status = self.transfer_verified(
                &part.download_uri,
                &dest,
                &part.checksum,
                token,
                Status::CorruptedFile,
            );
            part_ledger.update(&part.relative_path, PartField::Status(status))?;
        }

        Ok(part_ledger.status_histogram()?.rollup())
    }

    /// Transfer and verify one file, mapping the outcome to a status.
    fn transfer_verified(
        &self,
        uri: &str,
        dest: &Path,
        expected: &str,
        token: &mut StorageToken,
        failure: Status,
    ) -> Status {
        let transfer = &self.settings.transfer;
        let outcome = transfer.transfer(
            &self.client,
            &self.sleeper,
            uri,
            dest,
            expected,
            token,
            self.progress.as_ref(),
        );

        match outcome {
            TransferOutcome::Completed {
                already_present: true,
                ..
            } => Status::ChecksumOk,
            TransferOutcome::Completed { bytes, .. } => {
                if transfer.verify(dest, expected) {
                    info!(path = %dest.display(), bytes, "Transfer verified");
                    Status::ChecksumOk
                } else {
                    warn!(path = %dest.display(), bytes, "Checksum mismatch after transfer");
                    failure
                }
            }
            TransferOutcome::StorageExhausted | TransferOutcome::Skipped => failure,
            TransferOutcome::Failed { reason } => {
                warn!(path = %dest.display(), reason = %reason, "Transfer failed");
                failure
            }
        }
    }
}
