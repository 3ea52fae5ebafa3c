//! Manifest parsing for multi-part products.
//!
//! A product manifest lists every file of the product as a `dataObject`
//! holding a `fileLocation` (relative path) and a `checksum`.

use thiserror::Error;
use tracing::debug;

/// Errors that can occur while reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest is not well-formed XML.
    #[error("invalid manifest XML: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// One file declared by a product manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPart {
    /// Location relative to the product root, e.g. `./GRANULE/.../B02.jp2`.
    pub relative_path: String,
    /// Expected digest of the file.
    pub checksum: String,
}

impl ManifestPart {
    pub fn new(relative_path: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            checksum: checksum.into(),
        }
    }
}

/// Parse the parts declared in a manifest document, in document order.
///
/// `dataObject` elements without a location are skipped.
pub fn parse_manifest(xml: &str) -> Result<Vec<ManifestPart>, ManifestError> {
    let document = roxmltree::Document::parse(xml)?;

    let parts: Vec<ManifestPart> = document
        .descendants()
        .filter(|node| node.has_tag_name("dataObject"))
        .filter_map(|object| {
            let href = object
                .descendants()
                .find(|n| n.has_tag_name("fileLocation"))
                .and_then(|n| n.attribute("href"))?;
            let checksum = object
                .descendants()
                .find(|n| n.has_tag_name("checksum"))
                .and_then(|n| n.text())
                .unwrap_or_default();
            Some(ManifestPart::new(href, checksum.trim()))
        })
        .collect();

    debug!(parts = parts.len(), "Parsed product manifest");
    Ok(parts)
}
