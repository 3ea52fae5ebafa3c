//! Transfer status vocabulary shared by products and product parts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Transfer status of a product or product part.
///
/// [`Status::ChecksumOk`] is the only terminal status; every other status is
/// retried on the next run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The archive checksum could not be fetched.
    MissingChecksum,
    /// The product manifest could not be fetched (multi-part products only).
    MissingManifest,
    /// Nothing has been transferred yet.
    #[default]
    MissingTransferTarget,
    /// A single file failed verification or could not be transferred.
    CorruptedFile,
    /// A product archive (or at least one of its parts) failed verification.
    CorruptedArchive,
    /// Transferred and verified.
    ChecksumOk,
}

impl Status {
    /// All statuses, in declaration order.
    pub const ALL: [Status; 6] = [
        Status::MissingChecksum,
        Status::MissingManifest,
        Status::MissingTransferTarget,
        Status::CorruptedFile,
        Status::CorruptedArchive,
        Status::ChecksumOk,
    ];

    /// Returns `true` for the terminal success status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::ChecksumOk)
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::MissingChecksum => "missing_checksum",
            Status::MissingManifest => "missing_manifest",
            Status::MissingTransferTarget => "missing_transfer_target",
            Status::CorruptedFile => "corrupted_file",
            Status::CorruptedArchive => "corrupted_archive",
            Status::ChecksumOk => "checksum_ok",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count of entries per status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusHistogram {
    counts: BTreeMap<Status, usize>,
}

impl StatusHistogram {
    /// Count statuses from an iterator.
    pub fn from_statuses(statuses: impl IntoIterator<Item = Status>) -> Self {
        let mut histogram = Self::default();
        for status in statuses {
            *histogram.counts.entry(status).or_insert(0) += 1;
        }
        histogram
    }

    /// Number of entries with `status`.
    pub fn count(&self, status: Status) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Total number of entries.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Iterate `(status, count)` pairs for statuses that occur.
    pub fn iter(&self) -> impl Iterator<Item = (Status, usize)> + '_ {
        self.counts.iter().map(|(status, count)| (*status, *count))
    }

    /// Roll a part-level histogram up into a product status.
    ///
    /// Every part verified gives [`Status::ChecksumOk`]; anything else,
    /// including an empty histogram, gives [`Status::CorruptedArchive`].
    pub fn rollup(&self) -> Status {
        let total = self.total();
        if total > 0 && self.count(Status::ChecksumOk) == total {
            Status::ChecksumOk
        } else {
            Status::CorruptedArchive
        }
    }
}
