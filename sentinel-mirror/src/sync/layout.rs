//! Local layout of a sync request.
//!
//! ```text
//! <download_dir>/<request_id>/
//!     ledger_S2.json
//!     parts_<title>.json
//!     S2/<year>/<title>.zip                  single-file products
//!     S2/<year>/<title>/GRANULE/.../B02.jp2  multi-part products
//! ```

use std::path::{Component, Path, PathBuf};

use crate::batch::Platform;

/// Paths of one sync request.
#[derive(Debug, Clone)]
pub struct RequestLayout {
    root: PathBuf,
    platform: Platform,
}

impl RequestLayout {
    pub fn new(download_dir: &Path, request_id: &str, platform: Platform) -> Self {
        Self {
            root: download_dir.join(request_id),
            platform,
        }
    }

    /// Product ledger of the request.
    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(format!("ledger_{}.json", self.platform.code()))
    }

    /// Part ledger of a multi-part product.
    pub fn part_ledger_path(&self, title: &str) -> PathBuf {
        self.root.join(format!("parts_{}.json", title))
    }

    fn year_dir(&self, year: i32) -> PathBuf {
        self.root.join(self.platform.code()).join(year.to_string())
    }

    /// Archive of a single-file product.
    pub fn archive_path(&self, year: i32, title: &str) -> PathBuf {
        self.year_dir(year).join(format!("{}.zip", title))
    }

    /// Directory holding the parts of a multi-part product.
    pub fn product_dir(&self, year: i32, title: &str) -> PathBuf {
        self.year_dir(year).join(title)
    }

    /// Local file of one part. Only plain path segments of the manifest
    /// location are kept, so a part can never land outside its product.
    pub fn part_path(&self, year: i32, title: &str, relative_path: &str) -> PathBuf {
        let mut path = self.product_dir(year, title);
        for component in Path::new(relative_path).components() {
            if let Component::Normal(segment) = component {
                path.push(segment);
            }
        }
        path
    }
}
