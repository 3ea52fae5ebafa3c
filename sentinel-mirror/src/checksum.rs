//! Block-wise file digests for transfer verification.
//!
//! The archive publishes an MD5 digest per product and per manifest part.
//! Digests are used twice: to confirm a just-completed transfer, and to
//! detect an already-correct local copy before transferring again.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Default block size for digest computation (1 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Digest algorithm used to compare local files with archive checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    /// MD5, as published by the archive.
    #[default]
    Md5,
    /// SHA-256.
    Sha256,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!("unknown checksum algorithm '{}'", other)),
        }
    }
}

/// Calculate the digest of a file, reading it `block_size` bytes at a time.
///
/// Returns the lowercase hexadecimal digest, or `None` when the file does
/// not exist or cannot be read. Callers treat `None` as "needs transfer".
pub fn file_digest(path: &Path, algorithm: ChecksumAlgorithm, block_size: usize) -> Option<String> {
    match algorithm {
        ChecksumAlgorithm::Md5 => digest_with::<Md5>(path, block_size),
        ChecksumAlgorithm::Sha256 => digest_with::<Sha256>(path, block_size),
    }
}

fn digest_with<D: Digest>(path: &Path, block_size: usize) -> Option<String> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot open file for digest");
            return None;
        }
    };

    let mut hasher = D::new();
    let mut buffer = vec![0u8; block_size.max(1)];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(n) => n,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Read failed during digest");
                return None;
            }
        };

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Some(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compare two hex digests, ignoring case and surrounding whitespace.
///
/// An empty expected digest never matches.
pub fn digests_match(actual: &str, expected: &str) -> bool {
    let expected = expected.trim();
    !expected.is_empty() && actual.trim().eq_ignore_ascii_case(expected)
}

/// Check whether the file at `path` already has the expected digest.
pub fn file_matches(
    path: &Path,
    expected: &str,
    algorithm: ChecksumAlgorithm,
    block_size: usize,
) -> bool {
    if expected.trim().is_empty() {
        return false;
    }
    file_digest(path, algorithm, block_size)
        .map(|actual| digests_match(&actual, expected))
        .unwrap_or(false)
}
