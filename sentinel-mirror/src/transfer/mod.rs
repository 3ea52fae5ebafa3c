//! Verified, chunked transfers of remote files to local storage.
//!
//! A transfer always restarts from byte zero; there is no range
//! continuation. An existing local file is only kept when its digest already
//! matches the expected checksum. Whether a finished transfer is intact is
//! decided by the caller comparing digests afterwards.

mod storage;
mod stream;
mod token;

pub use storage::{LocalStorage, Storage};
pub use stream::{NextChunk, WatchedStream};
pub use token::StorageToken;

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::checksum::{self, ChecksumAlgorithm, DEFAULT_BLOCK_SIZE};
use crate::client::ArchiveClient;
use crate::retry::{RetryPolicy, Sleeper};

/// Default chunk size for stream reads (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Default per-chunk read timeout (5 minutes).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Progress callback: `(label, bytes_written, total_bytes)`.
///
/// Called once when a transfer starts and after every chunk written.
pub type ProgressCallback = Box<dyn Fn(&str, u64, Option<u64>) + Send + Sync>;

/// How a transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The stream ended (normally or by stall). `bytes` is zero and
    /// `already_present` is set when the local copy was already correct.
    Completed { bytes: u64, already_present: bool },
    /// Local storage ran out; the partial file was deleted and the storage
    /// token marked.
    StorageExhausted,
    /// The stream could not be opened, read, or written.
    Failed { reason: String },
    /// Not attempted because storage was already exhausted.
    Skipped,
}

/// Chunked, watchdog-guarded transfer engine.
#[derive(Debug, Clone)]
pub struct ResumableTransfer {
    retry: RetryPolicy,
    chunk_size: usize,
    read_timeout: Duration,
    algorithm: ChecksumAlgorithm,
    block_size: usize,
    storage: Arc<dyn Storage>,
}

impl Default for ResumableTransfer {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ResumableTransfer {
    /// Creates a transfer engine opening streams under `retry`.
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            algorithm: ChecksumAlgorithm::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            storage: Arc::new(LocalStorage),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Write transferred files through `storage` instead of plain files.
    pub fn with_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Whether the file at `path` matches `expected`.
    pub fn verify(&self, path: &Path, expected: &str) -> bool {
        checksum::file_matches(path, expected, self.algorithm, self.block_size)
    }

    /// Transfer `uri` into `dest`.
    ///
    /// Nothing is fetched when `token` is exhausted or when `dest` already
    /// matches `expected_checksum`.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer<C, S>(
        &self,
        client: &C,
        sleeper: &S,
        uri: &str,
        dest: &Path,
        expected_checksum: &str,
        token: &mut StorageToken,
        progress: Option<&ProgressCallback>,
    ) -> TransferOutcome
    where
        C: ArchiveClient + ?Sized,
        S: Sleeper + ?Sized,
    {
        if token.is_exhausted() {
            debug!(path = %dest.display(), "Storage exhausted, transfer skipped");
            return TransferOutcome::Skipped;
        }

        if dest.exists() && self.verify(dest, expected_checksum) {
            info!(path = %dest.display(), "Local copy already verified, transfer skipped");
            return TransferOutcome::Completed {
                bytes: 0,
                already_present: true,
            };
        }

        let remote = match self
            .retry
            .attempt(sleeper, "stream open", || client.open_stream(uri))
        {
            Ok(remote) => remote,
            Err(e) => {
                warn!(uri, error = %e, "Could not open remote stream");
                return TransferOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return self.write_failure(dest, e, token);
            }
        }

        let file = match self.storage.create(dest) {
            Ok(file) => file,
            Err(e) => return self.write_failure(dest, e, token),
        };

        let stream = match WatchedStream::spawn(remote.reader, self.chunk_size, self.read_timeout) {
            Ok(stream) => stream,
            Err(e) => {
                return TransferOutcome::Failed {
                    reason: format!("failed to start reader: {}", e),
                }
            }
        };

        let label = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let total = remote.content_length;
        if let Some(cb) = progress {
            cb(&label, 0, total);
        }

        let mut writer = BufWriter::new(file);
        let mut written: u64 = 0;

        loop {
            match stream.next_chunk() {
                NextChunk::Data(chunk) => {
                    if let Err(e) = writer.write_all(&chunk) {
                        drop(writer);
                        return self.write_failure(dest, e, token);
                    }
                    written += chunk.len() as u64;
                    if let Some(cb) = progress {
                        cb(&label, written, total);
                    }
                }
                NextChunk::End | NextChunk::Stalled => break,
                NextChunk::Failed(e) => {
                    warn!(uri, error = %e, "Stream read failed");
                    if let Err(e) = writer.flush() {
                        drop(writer);
                        return self.write_failure(dest, e, token);
                    }
                    return TransferOutcome::Failed {
                        reason: format!("read error: {}", e),
                    };
                }
            }
        }

        if let Err(e) = writer.flush() {
            drop(writer);
            return self.write_failure(dest, e, token);
        }

        debug!(path = %dest.display(), bytes = written, "Transfer finished");
        TransferOutcome::Completed {
            bytes: written,
            already_present: false,
        }
    }

    fn write_failure(&self, dest: &Path, error: io::Error, token: &mut StorageToken) -> TransferOutcome {
        if is_storage_full(&error) {
            if let Err(e) = fs::remove_file(dest) {
                debug!(path = %dest.display(), error = %e, "Could not delete partial file");
            }
            token.mark_exhausted(dest);
            return TransferOutcome::StorageExhausted;
        }

        warn!(path = %dest.display(), error = %error, "Write failed");
        TransferOutcome::Failed {
            reason: format!("write to {} failed: {}", dest.display(), error),
        }
    }
}

/// Whether an I/O error means the storage device is full.
pub fn is_storage_full(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::ENOSPC) || error.kind() == io::ErrorKind::StorageFull
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, RemoteStream};
    use crate::retry::NoopSleeper;
    use std::cell::Cell;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    struct StaticClient {
        body: Vec<u8>,
        failures_before_success: u32,
        opens: Cell<u32>,
    }

    impl StaticClient {
        fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                failures_before_success: 0,
                opens: Cell::new(0),
            }
        }
    }

    impl ArchiveClient for StaticClient {
        fn fetch_text(&self, url: &str) -> Result<String, ClientError> {
            Err(ClientError::Status {
                url: url.to_string(),
                status: 404,
            })
        }

        fn open_stream(&self, url: &str) -> Result<RemoteStream, ClientError> {
            self.opens.set(self.opens.get() + 1);
            if self.opens.get() <= self.failures_before_success {
                return Err(ClientError::Transport {
                    url: url.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(RemoteStream {
                content_length: Some(self.body.len() as u64),
                reader: Box::new(Cursor::new(self.body.clone())),
            })
        }
    }

    fn engine() -> ResumableTransfer {
        ResumableTransfer::new(RetryPolicy::fixed(2, Duration::ZERO)).with_chunk_size(4)
    }

    #[test]
    fn test_transfer_writes_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("S2").join("2016").join("product.zip");
        let client = StaticClient::new(b"hello world");
        let mut token = StorageToken::new();

        let outcome = engine().transfer(&client, &NoopSleeper, "uri", &dest, HELLO_MD5, &mut token, None);

        assert_eq!(
            outcome,
            TransferOutcome::Completed {
                bytes: 11,
                already_present: false
            }
        );
        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
        assert!(engine().verify(&dest, HELLO_MD5));
    }

    #[test]
    fn test_correct_local_copy_skips_network() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("product.zip");
        fs::write(&dest, b"hello world").unwrap();
        let client = StaticClient::new(b"other");
        let mut token = StorageToken::new();

        let outcome = engine().transfer(&client, &NoopSleeper, "uri", &dest, HELLO_MD5, &mut token, None);

        assert_eq!(
            outcome,
            TransferOutcome::Completed {
                bytes: 0,
                already_present: true
            }
        );
        assert_eq!(client.opens.get(), 0);
    }

    #[test]
    fn test_wrong_local_copy_is_replaced_from_zero() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("product.zip");
        fs::write(&dest, b"hello wo").unwrap();
        let client = StaticClient::new(b"hello world");
        let mut token = StorageToken::new();

        engine().transfer(&client, &NoopSleeper, "uri", &dest, HELLO_MD5, &mut token, None);

        assert_eq!(client.opens.get(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
    }

    #[test]
    fn test_exhausted_token_skips() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("product.zip");
        let client = StaticClient::new(b"hello world");
        let mut token = StorageToken::new();
        token.mark_exhausted(Path::new("/elsewhere"));

        let outcome = engine().transfer(&client, &NoopSleeper, "uri", &dest, HELLO_MD5, &mut token, None);

        assert_eq!(outcome, TransferOutcome::Skipped);
        assert_eq!(client.opens.get(), 0);
        assert!(!dest.exists());
    }

    #[test]
    fn test_open_is_retried() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("product.zip");
        let mut client = StaticClient::new(b"hello world");
        client.failures_before_success = 2;
        let mut token = StorageToken::new();

        let outcome = engine().transfer(&client, &NoopSleeper, "uri", &dest, HELLO_MD5, &mut token, None);

        assert!(matches!(outcome, TransferOutcome::Completed { bytes: 11, .. }));
        assert_eq!(client.opens.get(), 3);
    }

    #[test]
    fn test_open_failure_after_retries() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("product.zip");
        let mut client = StaticClient::new(b"hello world");
        client.failures_before_success = 10;
        let mut token = StorageToken::new();

        let outcome = engine().transfer(&client, &NoopSleeper, "uri", &dest, HELLO_MD5, &mut token, None);

        assert!(matches!(outcome, TransferOutcome::Failed { .. }));
        assert_eq!(client.opens.get(), 3);
        assert!(!token.is_exhausted());
    }

    #[test]
    fn test_progress_reports_each_chunk() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("product.zip");
        let client = StaticClient::new(b"hello world");
        let mut token = StorageToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressCallback = Box::new(move |label, done, total| {
            sink.lock().unwrap().push((label.to_string(), done, total));
        });

        engine().transfer(&client, &NoopSleeper, "uri", &dest, HELLO_MD5, &mut token, Some(&progress));

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.iter().map(|(_, done, _)| *done).collect::<Vec<_>>(),
            vec![0, 4, 8, 11]
        );
        assert!(seen.iter().all(|(label, _, total)| label == "product.zip" && *total == Some(11)));
    }

    /// Local files that refuse writes beyond a byte quota with `ENOSPC`.
    #[derive(Debug, Clone)]
    struct QuotaStorage {
        remaining: Arc<Mutex<usize>>,
    }

    impl QuotaStorage {
        fn new(quota: usize) -> Self {
            Self {
                remaining: Arc::new(Mutex::new(quota)),
            }
        }
    }

    struct QuotaWriter {
        file: fs::File,
        remaining: Arc<Mutex<usize>>,
    }

    impl Storage for QuotaStorage {
        fn create(&self, path: &Path) -> io::Result<Box<dyn Write>> {
            Ok(Box::new(QuotaWriter {
                file: fs::File::create(path)?,
                remaining: Arc::clone(&self.remaining),
            }))
        }
    }

    impl Write for QuotaWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                return Err(io::Error::from_raw_os_error(libc::ENOSPC));
            }
            let allowed = buf.len().min(*remaining);
            let written = self.file.write(&buf[..allowed])?;
            *remaining -= written;
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    #[test]
    fn test_write_failure_on_full_storage_deletes_partial_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("product.zip");
        fs::write(&dest, b"hello").unwrap();
        let mut token = StorageToken::new();

        let outcome =
            engine().write_failure(&dest, io::Error::from_raw_os_error(libc::ENOSPC), &mut token);

        assert_eq!(outcome, TransferOutcome::StorageExhausted);
        assert!(!dest.exists());
        assert_eq!(token.exhausted_at(), Some(dest.as_path()));
    }

    #[test]
    fn test_other_write_failure_keeps_token() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("product.zip");
        fs::write(&dest, b"hello").unwrap();
        let mut token = StorageToken::new();

        let outcome = engine().write_failure(
            &dest,
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            &mut token,
        );

        assert!(matches!(outcome, TransferOutcome::Failed { .. }));
        assert!(!token.is_exhausted());
    }

    #[test]
    fn test_full_storage_mid_transfer_exhausts_token() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first.zip");
        let second = temp.path().join("second.zip");
        let client = StaticClient::new(b"hello world");
        let transfer = engine().with_storage(QuotaStorage::new(6));
        let mut token = StorageToken::new();

        let outcome =
            transfer.transfer(&client, &NoopSleeper, "uri", &first, HELLO_MD5, &mut token, None);

        assert_eq!(outcome, TransferOutcome::StorageExhausted);
        assert!(!first.exists());
        assert_eq!(token.exhausted_at(), Some(first.as_path()));

        let outcome =
            transfer.transfer(&client, &NoopSleeper, "uri", &second, HELLO_MD5, &mut token, None);

        assert_eq!(outcome, TransferOutcome::Skipped);
        assert_eq!(client.opens.get(), 1);
        assert!(!second.exists());
    }

    #[test]
    fn test_storage_full_detection() {
        assert!(is_storage_full(&io::Error::from_raw_os_error(libc::ENOSPC)));
        assert!(!is_storage_full(&io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
    }
}
