//! Sentinel Mirror - Local mirroring of a Copernicus product hub
//!
//! This library keeps a local copy of the products matching catalog queries
//! against an OpenSearch/OData hub. Transfer state is recorded per product
//! (and per file for products retrieved file by file) in JSON ledgers, so an
//! interrupted or corrupted transfer is retried on the next run instead of
//! being lost or redone from scratch.
//!
//! The entry point is [`sync::SyncOrchestrator`], driven by the
//! `sentinel-mirror` binary.

pub mod batch;
pub mod catalog;
pub mod checksum;
pub mod client;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod manifest;
pub mod odata;
pub mod retry;
pub mod selector;
pub mod sync;
pub mod transfer;

/// Version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
