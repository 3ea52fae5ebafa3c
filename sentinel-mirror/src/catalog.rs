//! OpenSearch catalog queries.
//!
//! The hub answers `<hub>/search?q=<query>&rows=<n>&start=<k>` with an Atom
//! feed. The feed carries the total number of matching products
//! (`totalResults`) and one `entry` per product on the requested page.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batch::Platform;
use crate::client::{ArchiveClient, ClientError};
use crate::retry::{Exhausted, RetryPolicy, Sleeper};

/// Default number of products requested per catalog page.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Errors that can occur while browsing the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog URL: {0}")]
    InvalidUrl(String),

    #[error("catalog request failed: {0}")]
    Request(#[from] Exhausted<ClientError>),

    #[error("invalid catalog response: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("catalog response has no {0}")]
    MissingField(&'static str),

    #[error("catalog field {field} has invalid value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    /// The total count changed while the catalog was paged.
    #[error("catalog total changed from {expected} to {actual} while paging")]
    CountDrift { expected: u64, actual: u64 },
}

/// One product listed by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub title: String,
    pub uuid: String,
    pub download_uri: String,
    /// Acquisition year, from the sensing start.
    pub year: i32,
    /// Cloud cover percentage, published for optical products only.
    pub cloud_cover: Option<f64>,
}

/// One parsed catalog page.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPage {
    pub total: u64,
    pub entries: Vec<CatalogEntry>,
}

/// Build the URL of one catalog page.
pub fn query_url(hub_url: &str, query: &str, rows: u64, start: u64) -> Result<Url, CatalogError> {
    let base = format!("{}/search", hub_url.trim_end_matches('/'));
    Url::parse_with_params(
        &base,
        &[
            ("q", query.to_string()),
            ("rows", rows.to_string()),
            ("start", start.to_string()),
        ],
    )
    .map_err(|e| CatalogError::InvalidUrl(format!("{}: {}", base, e)))
}

/// Parse a catalog feed.
pub fn parse_page(xml: &str) -> Result<CatalogPage, CatalogError> {
    let document = roxmltree::Document::parse(xml)?;
    let root = document.root_element();

    let total_text = root
        .children()
        .find(|n| n.has_tag_name("totalResults"))
        .and_then(|n| n.text())
        .ok_or(CatalogError::MissingField("totalResults"))?;
    let total = total_text
        .trim()
        .parse::<u64>()
        .map_err(|_| CatalogError::InvalidValue {
            field: "totalResults",
            value: total_text.to_string(),
        })?;

    let entries = root
        .children()
        .filter(|n| n.has_tag_name("entry"))
        .map(parse_entry)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CatalogPage { total, entries })
}

fn parse_entry(entry: roxmltree::Node<'_, '_>) -> Result<CatalogEntry, CatalogError> {
    let child_text = |tag: &'static str| {
        entry
            .children()
            .find(|n| n.has_tag_name(tag))
            .and_then(|n| n.text())
            .map(str::trim)
            .ok_or(CatalogError::MissingField(tag))
    };
    let named = |tag: &str, name: &str| {
        entry
            .children()
            .find(|n| n.has_tag_name(tag) && n.attribute("name") == Some(name))
            .and_then(|n| n.text())
            .map(str::trim)
    };

    let download_uri = entry
        .children()
        .find(|n| n.has_tag_name("link"))
        .and_then(|n| n.attribute("href"))
        .ok_or(CatalogError::MissingField("link"))?;

    let begin = named("date", "beginposition").ok_or(CatalogError::MissingField("beginposition"))?;
    let year = parse_year(begin).ok_or_else(|| CatalogError::InvalidValue {
        field: "beginposition",
        value: begin.to_string(),
    })?;

    let cloud_cover = match named("double", "cloudcoverpercentage") {
        Some(raw) => Some(raw.parse::<f64>().map_err(|_| CatalogError::InvalidValue {
            field: "cloudcoverpercentage",
            value: raw.to_string(),
        })?),
        None => None,
    };

    Ok(CatalogEntry {
        title: child_text("title")?.to_string(),
        uuid: child_text("id")?.to_string(),
        download_uri: download_uri.to_string(),
        year,
        cloud_cover,
    })
}

fn parse_year(raw: &str) -> Option<i32> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.year());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(datetime.year());
    }
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d")
        .ok()
        .map(|date| date.year())
}

/// A catalog query against one hub.
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    hub_url: String,
    query: String,
    page_size: u64,
}

impl CatalogQuery {
    pub fn new(hub_url: impl Into<String>, query: impl Into<String>, page_size: u64) -> Self {
        Self {
            hub_url: hub_url.into(),
            query: query.into(),
            page_size: page_size.max(1),
        }
    }

    fn fetch_page<C, S>(
        &self,
        client: &C,
        retry: &RetryPolicy,
        sleeper: &S,
        rows: u64,
        start: u64,
    ) -> Result<CatalogPage, CatalogError>
    where
        C: ArchiveClient + ?Sized,
        S: Sleeper + ?Sized,
    {
        let url = query_url(&self.hub_url, &self.query, rows, start)?;
        debug!(url = %url, "Fetching catalog page");
        let body = retry.attempt(sleeper, "catalog page", || client.fetch_text(url.as_str()))?;
        parse_page(&body)
    }

    /// Current number of products matching the query.
    pub fn fetch_total<C, S>(&self, client: &C, retry: &RetryPolicy, sleeper: &S) -> Result<u64, CatalogError>
    where
        C: ArchiveClient + ?Sized,
        S: Sleeper + ?Sized,
    {
        Ok(self.fetch_page(client, retry, sleeper, 1, 0)?.total)
    }

    /// Retrieve all `total` products, `page_size` at a time.
    ///
    /// The last page asks for the remainder only. The whole listing is
    /// rejected when the total reported by the last page differs from
    /// `total`, or when any page fails.
    pub fn fetch_all<C, S>(
        &self,
        client: &C,
        retry: &RetryPolicy,
        sleeper: &S,
        total: u64,
    ) -> Result<Vec<CatalogEntry>, CatalogError>
    where
        C: ArchiveClient + ?Sized,
        S: Sleeper + ?Sized,
    {
        let pages = total.div_ceil(self.page_size);
        // The announced total is not trusted for allocation
        let mut entries = Vec::new();
        let mut last_total = total;

        for page in 0..pages {
            let start = page * self.page_size;
            let rows = self.page_size.min(total - start);
            debug!(page = page + 1, pages, rows, start, "Browsing catalog");

            let listing = self.fetch_page(client, retry, sleeper, rows, start)?;
            last_total = listing.total;
            entries.extend(listing.entries);
        }

        if last_total != total {
            warn!(
                expected = total,
                actual = last_total,
                "The number of products changed while browsing the catalog"
            );
            return Err(CatalogError::CountDrift {
                expected: total,
                actual: last_total,
            });
        }

        info!(products = entries.len(), "Catalog browsed");
        Ok(entries)
    }
}

/// Drop entries above `max_cloud` percent cloud cover.
///
/// Radar products carry no cloud cover and are never filtered. Entries
/// without a published value are kept.
pub fn cloud_filter(entries: Vec<CatalogEntry>, platform: Platform, max_cloud: Option<f64>) -> Vec<CatalogEntry> {
    let max_cloud = match (platform, max_cloud) {
        (Platform::Sentinel1, _) | (_, None) => return entries,
        (_, Some(max)) => max,
    };

    entries
        .into_iter()
        .filter(|entry| entry.cloud_cover.map_or(true, |cover| cover <= max_cloud))
        .collect()
}

/// Entries whose uuid is not yet known, in catalog order.
pub fn new_products(entries: Vec<CatalogEntry>, known: &HashSet<String>) -> Vec<CatalogEntry> {
    entries
        .into_iter()
        .filter(|entry| !known.contains(&entry.uuid))
        .collect()
}
