//! Chunked reads guarded by a per-chunk watchdog.
//!
//! Blocking readers cannot be interrupted, so the body is read on a helper
//! thread that hands chunks over a bounded channel. The consumer waits at
//! most `read_timeout` for each chunk. When the wait expires the consumer
//! gives up on the stream and drops the channel. The helper thread stays
//! blocked in `read` until the reader itself fails or yields data, so
//! readers handed to [`WatchedStream::spawn`] must be bounded (the hub
//! client sets keepalive and a stream timeout), after which the thread
//! notices the closed channel and exits.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::warn;

/// Result of waiting for the next chunk.
#[derive(Debug)]
pub enum NextChunk {
    /// Bytes read from the stream.
    Data(Vec<u8>),
    /// The stream ended normally.
    End,
    /// No chunk arrived within the read timeout.
    Stalled,
    /// The underlying read failed.
    Failed(io::Error),
}

/// A remote body read chunk by chunk under a watchdog.
pub struct WatchedStream {
    chunks: Receiver<io::Result<Vec<u8>>>,
    read_timeout: Duration,
}

impl WatchedStream {
    /// Start reading `reader` on a helper thread.
    pub fn spawn(
        mut reader: Box<dyn Read + Send>,
        chunk_size: usize,
        read_timeout: Duration,
    ) -> io::Result<Self> {
        let (tx, chunks) = mpsc::sync_channel(1);
        let chunk_size = chunk_size.max(1);

        thread::Builder::new()
            .name("transfer-reader".to_string())
            .spawn(move || {
                let mut buffer = vec![0u8; chunk_size];
                loop {
                    match reader.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(Ok(buffer[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            chunks,
            read_timeout,
        })
    }

    /// Wait for the next chunk.
    pub fn next_chunk(&self) -> NextChunk {
        match self.chunks.recv_timeout(self.read_timeout) {
            Ok(Ok(data)) => NextChunk::Data(data),
            Ok(Err(e)) => NextChunk::Failed(e),
            Err(RecvTimeoutError::Disconnected) => NextChunk::End,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_secs = self.read_timeout.as_secs(),
                    "No data received within the read timeout, closing stream"
                );
                NextChunk::Stalled
            }
        }
    }
}
