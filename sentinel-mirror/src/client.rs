//! HTTP client abstraction for the archive hub.
//!
//! The orchestrator only talks to the hub through [`ArchiveClient`], which
//! allows tests to substitute an in-memory archive.

use std::io::Read;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, error};

/// Default timeout for establishing connections (30 seconds).
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Interval of TCP keepalive probes, so a vanished peer fails the read.
const TCP_KEEPALIVE_SECS: u64 = 60;

/// Default upper bound for a whole product stream (4 hours).
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 4 * 60 * 60;

/// Errors raised by archive requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The hub rejected the credentials (HTTP 401).
    #[error("unauthorized: check the hub username and password")]
    Unauthorized,

    /// The hub answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The request could not be sent or the response could not be read.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// Failed to build the HTTP client.
    #[error("failed to create HTTP client: {0}")]
    Build(String),
}

/// A readable remote byte stream.
pub struct RemoteStream {
    /// Announced length of the stream, when the hub sends one.
    pub content_length: Option<u64>,
    /// The body reader.
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Operations the sync engine needs from the archive hub.
pub trait ArchiveClient {
    /// Fetch a small text resource (catalog page, manifest, checksum).
    fn fetch_text(&self, url: &str) -> Result<String, ClientError>;

    /// Open a byte stream for a product or product part.
    fn open_stream(&self, url: &str) -> Result<RemoteStream, ClientError>;
}

impl<C: ArchiveClient + ?Sized> ArchiveClient for &C {
    fn fetch_text(&self, url: &str) -> Result<String, ClientError> {
        (**self).fetch_text(url)
    }

    fn open_stream(&self, url: &str) -> Result<RemoteStream, ClientError> {
        (**self).open_stream(url)
    }
}

/// Hub credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Real archive client using blocking reqwest with HTTP basic auth.
pub struct ReqwestArchiveClient {
    client: reqwest::blocking::Client,
    credentials: Credentials,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl ReqwestArchiveClient {
    /// Creates a client that authenticates every request with `credentials`.
    ///
    /// `timeout` bounds whole small requests. Streams are bounded by the
    /// much longer stream timeout (see [`Self::with_stream_timeout`]) so that
    /// a body read blocked on a silent peer eventually fails and releases
    /// its connection; stalls are detected earlier by the transfer's
    /// per-chunk watchdog.
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, ClientError> {
        Self::from_builder(reqwest::blocking::Client::builder(), credentials, timeout)
    }

    fn from_builder(
        builder: reqwest::blocking::ClientBuilder,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = builder
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(TCP_KEEPALIVE_SECS))
            .timeout(None)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
            request_timeout: timeout,
            stream_timeout: Duration::from_secs(DEFAULT_STREAM_TIMEOUT_SECS),
        })
    }

    /// Upper bound for reading one whole product or part stream.
    pub fn with_stream_timeout(mut self, stream_timeout: Duration) -> Self {
        self.stream_timeout = stream_timeout;
        self
    }

    fn get(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::blocking::Response, ClientError> {
        let mut request = self
            .client
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .map_err(|e| ClientError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            status => Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    /// Probe the hub with the configured credentials.
    ///
    /// Sends `<hub>/search?q=*`; an HTTP 401 is reported as
    /// [`ClientError::Unauthorized`].
    pub fn authenticate(&self, hub_url: &str) -> Result<(), ClientError> {
        let url = format!("{}/search?q=*", hub_url.trim_end_matches('/'));
        debug!(url = %url, "Probing hub credentials");
        match self.get(&url, Some(self.request_timeout)) {
            Ok(_) => Ok(()),
            Err(ClientError::Unauthorized) => {
                error!(
                    "Unauthorized or basic authentication failed. Check the username and \
                     password, or make sure the account is allowed to use the API"
                );
                Err(ClientError::Unauthorized)
            }
            Err(e) => Err(e),
        }
    }
}

impl ArchiveClient for ReqwestArchiveClient {
    fn fetch_text(&self, url: &str) -> Result<String, ClientError> {
        self.get(url, Some(self.request_timeout))?
            .text()
            .map_err(|e| ClientError::Transport {
                url: url.to_string(),
                reason: format!("failed to read response: {}", e),
            })
    }

    fn open_stream(&self, url: &str) -> Result<RemoteStream, ClientError> {
        let response = self.get(url, Some(self.stream_timeout))?;
        Ok(RemoteStream {
            content_length: response.content_length(),
            reader: Box::new(response),
        })
    }
}
