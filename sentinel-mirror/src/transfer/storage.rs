//! Where transferred bytes are written.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Opens destination files for writing.
pub trait Storage: fmt::Debug + Send + Sync {
    /// Create (or truncate) the file at `path`.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>>;
}

/// Plain files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl Storage for LocalStorage {
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>> {
        Ok(Box::new(File::create(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_storage_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"old contents").unwrap();

        let mut writer = LocalStorage.create(&path).unwrap();
        writer.write_all(b"new").unwrap();
        drop(writer);

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }
}
