//! File-backed ledger store.
//!
//! Every mutation is a full read-modify-rewrite of the JSON document. The
//! rewrite goes to a sibling `.tmp` file which is then renamed over the
//! document, so an interrupted write leaves the previous version intact.

use std::fs;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use super::error::{LedgerError, LedgerResult};
use super::status::{Status, StatusHistogram};

/// A keyed ledger entry.
pub trait LedgerEntry: Clone {
    /// Field updates accepted by [`LedgerStore::update`].
    type Field;

    /// Unique key of the entry within its document.
    fn key(&self) -> &str;

    /// Current status.
    fn status(&self) -> Status;

    /// Apply a field update in place.
    fn apply(&mut self, field: Self::Field);
}

/// A serializable document holding an ordered list of entries.
pub trait LedgerDocument: Serialize + DeserializeOwned + Default {
    type Entry: LedgerEntry;

    fn entries(&self) -> &[Self::Entry];

    fn entries_mut(&mut self) -> &mut Vec<Self::Entry>;
}

/// Durable store for one ledger document.
#[derive(Debug, Clone)]
pub struct LedgerStore<D> {
    path: PathBuf,
    _document: PhantomData<fn() -> D>,
}

impl<D: LedgerDocument> LedgerStore<D> {
    /// Store backed by the document at `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _document: PhantomData,
        }
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty document if none exists yet.
    pub fn ensure_exists(&self) -> LedgerResult<()> {
        if self.path.exists() {
            return Ok(());
        }
        self.save(&D::default())
    }

    /// Read the whole document. A missing document reads as empty.
    pub fn load(&self) -> LedgerResult<D> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(D::default()),
            Err(e) => return Err(LedgerError::io(&self.path, e)),
        };
        serde_json::from_str(&raw).map_err(|source| LedgerError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Rewrite the whole document atomically.
    pub fn save(&self, document: &D) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }

        let temp_path = temp_path_for(&self.path);
        let file = fs::File::create(&temp_path).map_err(|e| LedgerError::io(&temp_path, e))?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, document).map_err(|source| {
            LedgerError::Malformed {
                path: temp_path.clone(),
                source,
            }
        })?;
        writer
            .flush()
            .map_err(|e| LedgerError::io(&temp_path, e))?;
        drop(writer);

        fs::rename(&temp_path, &self.path).map_err(|e| LedgerError::io(&self.path, e))?;
        trace!(path = %self.path.display(), "Rewrote ledger");
        Ok(())
    }

    fn modify<R>(&self, change: impl FnOnce(&mut D) -> LedgerResult<R>) -> LedgerResult<R> {
        let mut document = self.load()?;
        let result = change(&mut document)?;
        self.save(&document)?;
        Ok(result)
    }

    /// Insert `entry`, replacing any entry with the same key. The entry is
    /// appended at the end of the document.
    pub fn upsert(&self, entry: D::Entry) -> LedgerResult<()> {
        self.modify(|document| {
            let entries = document.entries_mut();
            entries.retain(|existing| existing.key() != entry.key());
            entries.push(entry);
            Ok(())
        })
    }

    /// Apply a field update to the entry with `key`.
    pub fn update(&self, key: &str, field: <D::Entry as LedgerEntry>::Field) -> LedgerResult<()> {
        self.modify(|document| {
            let entry = document
                .entries_mut()
                .iter_mut()
                .find(|entry| entry.key() == key)
                .ok_or_else(|| LedgerError::NotFound {
                    key: key.to_string(),
                })?;
            entry.apply(field);
            Ok(())
        })
    }

    /// Remove the entry with `key`. Returns whether an entry was removed.
    pub fn remove(&self, key: &str) -> LedgerResult<bool> {
        self.modify(|document| {
            let entries = document.entries_mut();
            let before = entries.len();
            entries.retain(|entry| entry.key() != key);
            Ok(entries.len() != before)
        })
    }

    /// All entries, in document order.
    pub fn entries(&self) -> LedgerResult<Vec<D::Entry>> {
        Ok(self.load()?.entries().to_vec())
    }

    /// Entries whose status differs from `status`, in document order.
    pub fn entries_with_status_not(&self, status: Status) -> LedgerResult<Vec<D::Entry>> {
        Ok(self
            .load()?
            .entries()
            .iter()
            .filter(|entry| entry.status() != status)
            .cloned()
            .collect())
    }

    /// Whether an entry with `key` exists.
    pub fn exists(&self, key: &str) -> LedgerResult<bool> {
        Ok(self.load()?.entries().iter().any(|entry| entry.key() == key))
    }

    /// Count of entries per status.
    pub fn status_histogram(&self) -> LedgerResult<StatusHistogram> {
        Ok(StatusHistogram::from_statuses(
            self.load()?.entries().iter().map(LedgerEntry::status),
        ))
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
