//! Batch request file.
//!
//! A batch is a `;`-separated text file with one header row followed by one
//! sync request per row:
//!
//! ```text
//! id;query;max_cloud;tiles;bands
//! toulouse;platformname:Sentinel-2 AND footprint:"Intersects(43.6, 1.44)";30;T31TCJ;B02,B03
//! ```
//!
//! `max_cloud` is ignored unless it is a number. `tiles` and `bands` are
//! comma lists; empty means no filter.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::selector::parse_filter_list;

/// Column separator of the request file.
pub const DELIMITER: char = ';';

/// Errors that can occur while reading a request file.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read request file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request file line {line}: {reason}")]
    InvalidRow { line: usize, reason: String },
}

/// Satellite platform a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Sentinel1,
    Sentinel2,
}

impl Platform {
    /// Query fragment that selects the platform.
    pub fn query_marker(&self) -> &'static str {
        match self {
            Platform::Sentinel1 => "platformname:Sentinel-1",
            Platform::Sentinel2 => "platformname:Sentinel-2",
        }
    }

    /// Short code used in local paths and ledger names.
    pub fn code(&self) -> &'static str {
        match self {
            Platform::Sentinel1 => "S1",
            Platform::Sentinel2 => "S2",
        }
    }

    /// Detect the platform named by a catalog query.
    pub fn detect(query: &str) -> Option<Self> {
        [Platform::Sentinel1, Platform::Sentinel2]
            .into_iter()
            .find(|platform| query.contains(platform.query_marker()))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One row of the request file.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    /// Identifier, also the name of the request's download directory.
    pub id: String,
    /// Catalog query.
    pub query: String,
    /// Maximum cloud cover percentage, when given.
    pub max_cloud: Option<f64>,
    pub tiles: Vec<String>,
    pub bands: Vec<String>,
}

impl SyncRequest {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            max_cloud: None,
            tiles: Vec::new(),
            bands: Vec::new(),
        }
    }

    pub fn with_max_cloud(mut self, max_cloud: f64) -> Self {
        self.max_cloud = Some(max_cloud);
        self
    }

    pub fn with_tiles(mut self, tiles: Vec<String>) -> Self {
        self.tiles = tiles;
        self
    }

    pub fn with_bands(mut self, bands: Vec<String>) -> Self {
        self.bands = bands;
        self
    }

    /// Platform named by the query.
    pub fn platform(&self) -> Option<Platform> {
        Platform::detect(&self.query)
    }

    /// Whether products of this request are retrieved file by file.
    ///
    /// Only optical products are split, and only when a tile or band filter
    /// is given.
    pub fn is_multi_part(&self) -> bool {
        self.platform() == Some(Platform::Sentinel2)
            && (!self.tiles.is_empty() || !self.bands.is_empty())
    }
}

/// Parse the contents of a request file.
pub fn parse_requests(content: &str) -> Result<Vec<SyncRequest>, BatchError> {
    let mut requests = Vec::new();

    for (index, line) in content.lines().enumerate().skip(1) {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
        let column = |i: usize| columns.get(i).copied().unwrap_or_default();

        let id = column(0);
        let query = column(1);
        if id.is_empty() || query.is_empty() {
            return Err(BatchError::InvalidRow {
                line: line_number,
                reason: "id and query are required".to_string(),
            });
        }

        let mut request = SyncRequest::new(id, query)
            .with_tiles(parse_filter_list(column(3)))
            .with_bands(parse_filter_list(column(4)));
        if let Ok(max_cloud) = column(2).parse::<f64>() {
            request = request.with_max_cloud(max_cloud);
        }
        requests.push(request);
    }

    debug!(requests = requests.len(), "Parsed request file");
    Ok(requests)
}

/// Read and parse a request file.
pub fn read_requests(path: &Path) -> Result<Vec<SyncRequest>, BatchError> {
    let content = fs::read_to_string(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_requests(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FILE: &str = "id;query;max_cloud;tiles;bands
radar;platformname:Sentinel-1 AND producttype:GRD;;;
optical;platformname:Sentinel-2;30;T31TCJ, T31TDJ;B02,B03

clouds;platformname:Sentinel-2;n/a;;
";

    #[test]
    fn test_parse_requests() {
        let requests = parse_requests(FILE).unwrap();

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], SyncRequest::new("radar", "platformname:Sentinel-1 AND producttype:GRD"));
        assert_eq!(requests[1].max_cloud, Some(30.0));
        assert_eq!(requests[1].tiles, vec!["T31TCJ", "T31TDJ"]);
        assert_eq!(requests[1].bands, vec!["B02", "B03"]);
        assert_eq!(requests[2].max_cloud, None);
    }

    #[test]
    fn test_missing_trailing_columns() {
        let requests = parse_requests("header\nshort;platformname:Sentinel-2\n").unwrap();
        assert!(requests[0].tiles.is_empty());
        assert!(requests[0].bands.is_empty());
    }

    #[test]
    fn test_row_without_query_is_rejected() {
        let err = parse_requests("header\nlonely;;;;\n").unwrap_err();
        assert!(matches!(err, BatchError::InvalidRow { line: 2, .. }));
    }

    #[test]
    fn test_platform_detection() {
        assert_eq!(Platform::detect("platformname:Sentinel-1"), Some(Platform::Sentinel1));
        assert_eq!(Platform::detect("a AND platformname:Sentinel-2"), Some(Platform::Sentinel2));
        assert_eq!(Platform::detect("platformname:Landsat-8"), None);
        assert_eq!(Platform::Sentinel2.to_string(), "S2");
    }

    #[test]
    fn test_multi_part_requires_optical_and_filter() {
        let optical = SyncRequest::new("a", "platformname:Sentinel-2");
        assert!(!optical.is_multi_part());
        assert!(optical.clone().with_bands(vec!["B02".into()]).is_multi_part());

        let radar = SyncRequest::new("b", "platformname:Sentinel-1").with_tiles(vec!["T31TCJ".into()]);
        assert!(!radar.is_multi_part());
    }

    #[test]
    fn test_read_requests_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FILE.as_bytes()).unwrap();

        assert_eq!(read_requests(file.path()).unwrap().len(), 3);
        assert!(matches!(
            read_requests(Path::new("/nonexistent/requests.csv")),
            Err(BatchError::Read { .. })
        ));
    }
}
