//! Durable transfer ledgers.
//!
//! Each sync request owns one product ledger, plus one part ledger per
//! multi-part product. Both are JSON documents rewritten in full on every
//! change.
//!
//! ```json
//! {
//!   "numberOfProductsSeenLastRun": 2,
//!   "products": [
//!     { "title": "S2A_...", "uuid": "0282b16c-...", "downloadUri": "...",
//!       "checksum": "", "status": "missing_manifest", "year": 2016 }
//!   ]
//! }
//! ```

mod error;
mod status;
mod store;

pub use error::{LedgerError, LedgerResult};
pub use status::{Status, StatusHistogram};
pub use store::{LedgerDocument, LedgerEntry, LedgerStore};

use serde::{Deserialize, Serialize};

/// A catalog product tracked by a sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub title: String,
    pub uuid: String,
    pub download_uri: String,
    /// Hex digest of the archive, empty until fetched.
    #[serde(default)]
    pub checksum: String,
    pub status: Status,
    pub year: i32,
}

/// Field update for a [`Product`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProductField {
    Status(Status),
    Checksum(String),
}

impl LedgerEntry for Product {
    type Field = ProductField;

    fn key(&self) -> &str {
        &self.uuid
    }

    fn status(&self) -> Status {
        self.status
    }

    fn apply(&mut self, field: ProductField) {
        match field {
            ProductField::Status(status) => self.status = status,
            ProductField::Checksum(checksum) => self.checksum = checksum,
        }
    }
}

/// One file of a multi-part product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPart {
    pub relative_path: String,
    pub download_uri: String,
    pub checksum: String,
    pub status: Status,
}

/// Field update for a [`ProductPart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartField {
    Status(Status),
}

impl LedgerEntry for ProductPart {
    type Field = PartField;

    fn key(&self) -> &str {
        &self.relative_path
    }

    fn status(&self) -> Status {
        self.status
    }

    fn apply(&mut self, field: PartField) {
        match field {
            PartField::Status(status) => self.status = status,
        }
    }
}

/// Product ledger document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDocument {
    #[serde(default)]
    pub number_of_products_seen_last_run: u64,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl LedgerDocument for ProductDocument {
    type Entry = Product;

    fn entries(&self) -> &[Product] {
        &self.products
    }

    fn entries_mut(&mut self) -> &mut Vec<Product> {
        &mut self.products
    }
}

/// Part ledger document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDocument {
    #[serde(default)]
    pub parts: Vec<ProductPart>,
}

impl LedgerDocument for PartDocument {
    type Entry = ProductPart;

    fn entries(&self) -> &[ProductPart] {
        &self.parts
    }

    fn entries_mut(&mut self) -> &mut Vec<ProductPart> {
        &mut self.parts
    }
}

/// Ledger of the products of one sync request, keyed by uuid.
pub type ProductLedger = LedgerStore<ProductDocument>;

/// Ledger of the parts of one multi-part product, keyed by relative path.
pub type PartLedger = LedgerStore<PartDocument>;

impl LedgerStore<ProductDocument> {
    /// Catalog total recorded at the end of the previous run.
    pub fn products_seen_last_run(&self) -> LedgerResult<u64> {
        Ok(self.load()?.number_of_products_seen_last_run)
    }

    /// Record the catalog total of this run.
    pub fn set_products_seen_last_run(&self, count: u64) -> LedgerResult<()> {
        let mut document = self.load()?;
        document.number_of_products_seen_last_run = count;
        self.save(&document)
    }

    /// Uuids of every recorded product.
    pub fn uuids(&self) -> LedgerResult<Vec<String>> {
        Ok(self
            .load()?
            .products
            .into_iter()
            .map(|product| product.uuid)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn product(uuid: &str, status: Status) -> Product {
        Product {
            title: format!("S2A_{}", uuid),
            uuid: uuid.to_string(),
            download_uri: format!("https://hub/odata/v1/Products('{}')/$value", uuid),
            checksum: String::new(),
            status,
            year: 2016,
        }
    }

    fn part(path: &str, status: Status) -> ProductPart {
        ProductPart {
            relative_path: path.to_string(),
            download_uri: format!("https://hub/{}", path),
            checksum: "abc".to_string(),
            status,
        }
    }

    fn ledger(temp: &TempDir) -> ProductLedger {
        ProductLedger::new(temp.path().join("req").join("ledger_S2.json"))
    }

    #[test]
    fn test_ensure_exists_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);

        ledger.ensure_exists().unwrap();
        ledger.upsert(product("a", Status::ChecksumOk)).unwrap();
        ledger.ensure_exists().unwrap();

        assert!(ledger.path().exists());
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_document_reads_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);

        assert!(ledger.entries().unwrap().is_empty());
        assert_eq!(ledger.products_seen_last_run().unwrap(), 0);
    }

    #[test]
    fn test_upsert_replaces_and_appends() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);

        ledger.upsert(product("a", Status::MissingChecksum)).unwrap();
        ledger.upsert(product("b", Status::MissingChecksum)).unwrap();
        ledger.upsert(product("a", Status::ChecksumOk)).unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(
            entries.iter().map(|p| p.uuid.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
        assert_eq!(entries[1].status, Status::ChecksumOk);
    }

    #[test]
    fn test_update_fields() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        ledger.upsert(product("a", Status::MissingChecksum)).unwrap();

        ledger
            .update("a", ProductField::Checksum("ABCDEF".to_string()))
            .unwrap();
        ledger
            .update("a", ProductField::Status(Status::CorruptedArchive))
            .unwrap();

        let entry = &ledger.entries().unwrap()[0];
        assert_eq!(entry.checksum, "ABCDEF");
        assert_eq!(entry.status, Status::CorruptedArchive);
    }

    #[test]
    fn test_update_unknown_key() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        ledger.ensure_exists().unwrap();

        let err = ledger
            .update("nope", ProductField::Status(Status::ChecksumOk))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { ref key } if key == "nope"));
    }

    #[test]
    fn test_queries() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        ledger.upsert(product("a", Status::ChecksumOk)).unwrap();
        ledger.upsert(product("b", Status::CorruptedArchive)).unwrap();
        ledger.upsert(product("c", Status::MissingManifest)).unwrap();

        let pending = ledger.entries_with_status_not(Status::ChecksumOk).unwrap();
        assert_eq!(
            pending.iter().map(|p| p.uuid.as_str()).collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert!(ledger.exists("b").unwrap());
        assert!(!ledger.exists("z").unwrap());

        let histogram = ledger.status_histogram().unwrap();
        assert_eq!(histogram.total(), 3);
        assert_eq!(histogram.count(Status::ChecksumOk), 1);

        assert!(ledger.remove("b").unwrap());
        assert!(!ledger.remove("b").unwrap());
        assert_eq!(ledger.uuids().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_counter_survives_entry_changes() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);

        ledger.set_products_seen_last_run(42).unwrap();
        ledger.upsert(product("a", Status::ChecksumOk)).unwrap();

        assert_eq!(ledger.products_seen_last_run().unwrap(), 42);
    }

    #[test]
    fn test_document_field_names() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        ledger.upsert(product("a", Status::MissingManifest)).unwrap();
        ledger.set_products_seen_last_run(1).unwrap();

        let raw = std::fs::read_to_string(ledger.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["numberOfProductsSeenLastRun"], 1);
        assert_eq!(value["products"][0]["downloadUri"], product("a", Status::MissingManifest).download_uri);
        assert_eq!(value["products"][0]["status"], "missing_manifest");
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        ledger.upsert(product("a", Status::ChecksumOk)).unwrap();

        let names: Vec<String> = std::fs::read_dir(ledger.path().parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ledger_S2.json"]);
    }

    #[test]
    fn test_malformed_document() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp);
        std::fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
        std::fs::write(ledger.path(), "<xml/>").unwrap();

        assert!(matches!(
            ledger.entries().unwrap_err(),
            LedgerError::Malformed { .. }
        ));
    }

    #[test]
    fn test_part_ledger_rollup() {
        let temp = TempDir::new().unwrap();
        let parts = PartLedger::new(temp.path().join("parts_S2A.json"));

        parts.upsert(part("./a.xml", Status::ChecksumOk)).unwrap();
        parts.upsert(part("./b.jp2", Status::CorruptedFile)).unwrap();
        assert_eq!(parts.status_histogram().unwrap().rollup(), Status::CorruptedArchive);

        parts
            .update("./b.jp2", PartField::Status(Status::ChecksumOk))
            .unwrap();
        assert_eq!(parts.status_histogram().unwrap().rollup(), Status::ChecksumOk);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_upsert_keeps_keys_unique(keys in proptest::collection::vec("[a-d]", 1..12)) {
            let temp = TempDir::new().unwrap();
            let parts = PartLedger::new(temp.path().join("parts.json"));

            for key in &keys {
                parts.upsert(part(key, Status::MissingTransferTarget)).unwrap();
            }

            let entries = parts.entries().unwrap();
            let mut seen: Vec<&str> = entries.iter().map(|p| p.relative_path.as_str()).collect();
            let count = seen.len();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), count);

            let mut distinct = keys.clone();
            distinct.sort_unstable();
            distinct.dedup();
            prop_assert_eq!(count, distinct.len());
        }
    }
}
